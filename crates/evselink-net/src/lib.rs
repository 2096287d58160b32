//! Network transports for the evselink EVSE gateway
//!
//! Three of the four transport variants live here: the active TCP client,
//! the passive single-peer TCP server, and the broadcast-enabled UDP
//! listener. All three implement the `evselink_core::Transport` contract;
//! BLE lives in its own crate.

pub mod tcp_client;
pub mod tcp_server;
pub mod udp;

pub use tcp_client::TcpClientTransport;
pub use tcp_server::TcpServerTransport;
pub use udp::UdpBroadcastTransport;
