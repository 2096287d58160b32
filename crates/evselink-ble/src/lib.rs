//! Bluetooth Low Energy transport for the evselink EVSE gateway
//!
//! Connects to the wallbox's GATT service over `btleplug`, maps its
//! notification stream to the inbound read path and characteristic writes
//! to the outbound consumer, and implements the same
//! `evselink_core::Transport` contract as the network transports.

pub mod config;
pub mod protocol;
pub mod transport;

pub use config::BleConfig;
pub use transport::BleTransport;
