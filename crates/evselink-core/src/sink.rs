//! Boundary traits toward the protocol decoder and the MQTT bridge
//!
//! The connection core never interprets payload bytes; inbound frames go
//! to a [`NotificationSink`] and bridge activation happens through the
//! [`MqttBridge`] hook. Both sides are implemented outside this crate.

use std::sync::Arc;

use async_trait::async_trait;

use crate::device::DeviceInfo;
use crate::errors::BridgeError;

// ----------------------------------------------------------------------------
// Notification Sink
// ----------------------------------------------------------------------------

/// Consumer of raw inbound frames, implemented by the protocol decoder
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Invoked once per non-empty inbound read, tagged with a
    /// transport-specific peer label. Must not block the read loop for
    /// long; heavy processing belongs in the decoder's own task.
    async fn notify(&self, peer_label: &str, frame: &[u8]);
}

// ----------------------------------------------------------------------------
// Command Dispatch
// ----------------------------------------------------------------------------

/// Receiver of remote commands arriving on the device's command topic
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn dispatch(&self, topic: &str, payload: &[u8]);
}

// ----------------------------------------------------------------------------
// MQTT Bridge Hook
// ----------------------------------------------------------------------------

/// Availability announced on the device's availability topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Online,
    Offline,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Online => "online",
            Availability::Offline => "offline",
        }
    }
}

/// A single retained discovery message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryPayload {
    pub topic: String,
    pub payload: String,
}

/// Activation hook invoked by the orchestrator once per connection cycle
#[async_trait]
pub trait MqttBridge: Send + Sync {
    /// Whether the bridge has already been activated for this cycle
    fn is_connected(&self) -> bool;

    /// Build the discovery messages describing the device
    fn build_discovery_payloads(&self, info: &DeviceInfo) -> Vec<DiscoveryPayload>;

    /// Publish previously built discovery messages
    async fn publish_discovery(
        &self,
        payloads: Vec<DiscoveryPayload>,
    ) -> Result<(), BridgeError>;

    /// Command topic for the given device serial
    fn command_topic(&self, serial: &str) -> String;

    /// Subscribe to the device's command topic
    async fn subscribe(&self, topic: &str) -> Result<(), BridgeError>;

    /// Register the dispatcher for inbound command messages
    fn set_command_handler(&self, handler: Arc<dyn CommandHandler>);

    /// Announce device availability
    async fn publish_availability(
        &self,
        serial: &str,
        availability: Availability,
    ) -> Result<(), BridgeError>;

    /// Disconnect the underlying client; part of process termination
    async fn disconnect(&self);
}
