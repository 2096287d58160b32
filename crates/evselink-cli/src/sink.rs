//! Default frame and command consumers
//!
//! The gateway ships without a wire-protocol decoder; these consumers log
//! traffic so the connection layer can run stand-alone. A decoder crate
//! replaces them by implementing the same traits.

use async_trait::async_trait;
use tracing::{debug, warn};

use evselink_core::{CommandHandler, NotificationSink};

/// Logs every inbound frame at debug level
pub struct LoggingSink;

#[async_trait]
impl NotificationSink for LoggingSink {
    async fn notify(&self, peer_label: &str, frame: &[u8]) {
        debug!(peer = %peer_label, len = frame.len(), "inbound frame");
    }
}

/// Logs commands arriving on the command topic
pub struct LoggingCommandHandler;

#[async_trait]
impl CommandHandler for LoggingCommandHandler {
    async fn dispatch(&self, topic: &str, payload: &[u8]) {
        warn!(
            topic = %topic,
            len = payload.len(),
            "command received but no protocol decoder is attached"
        );
    }
}
