//! Core abstractions for the evselink EVSE gateway
//!
//! This crate defines the multi-transport connection model shared by the
//! rest of the workspace: the [`Transport`] trait implemented by the BLE,
//! TCP and UDP transports, the bounded [`OutboundQueue`], the liveness
//! [`Watchdog`], the shared [`DeviceState`], and the boundary traits the
//! orchestrator uses to talk to the protocol decoder and the MQTT bridge.
//!
//! The crate deliberately knows nothing about the wallbox wire protocol or
//! MQTT payload shapes; it only moves opaque byte frames between a peer and
//! a [`NotificationSink`].

pub mod config;
pub mod device;
pub mod errors;
pub mod lifecycle;
pub mod queue;
pub mod sink;
pub mod status;
pub mod transport;
pub mod watchdog;

pub use config::LinkConfig;
pub use device::{DeviceInfo, DeviceState, SharedDeviceState};
pub use errors::{BridgeError, TransportError};
pub use lifecycle::{LifecycleHandle, LifecycleReceiver, LifecycleRequest};
pub use queue::{outbound_queue, OutboundQueue, OutboundReceiver};
pub use sink::{
    Availability, CommandHandler, DiscoveryPayload, MqttBridge, NotificationSink,
};
pub use status::{ConnectionState, LinkStatus};
pub use transport::{Transport, TransportKind};
pub use watchdog::Watchdog;
