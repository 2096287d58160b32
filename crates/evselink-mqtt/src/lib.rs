//! MQTT bridge for the evselink gateway
//!
//! Implements the core crate's [`evselink_core::MqttBridge`] hook on top
//! of `rumqttc`. The bridge owns the broker connection, announces device
//! availability with a retained last will, publishes retained discovery
//! messages, and routes inbound command messages to a registered handler.

pub mod bridge;
pub mod settings;
pub mod topics;

pub use bridge::RumqttBridge;
pub use settings::MqttSettings;
