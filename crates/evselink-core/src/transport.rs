//! Transport abstraction for the wallbox link
//!
//! One interface over four connection variants — BLE client, TCP client,
//! passive TCP server and UDP broadcast listener — so the orchestrator can
//! use them interchangeably. Each implementation owns one outbound queue,
//! one shared [`LinkStatus`], and pumps inbound frames to the notification
//! sink.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::status::LinkStatus;

// ----------------------------------------------------------------------------
// Transport Kind
// ----------------------------------------------------------------------------

/// Transport variant identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Bluetooth Low Energy client
    Ble,
    /// Active TCP dial to the wallbox
    TcpClient,
    /// Passive TCP listener the wallbox connects to
    TcpServer,
    /// Bound, broadcast-enabled UDP listener
    Udp,
}

impl TransportKind {
    /// Passive kinds await a peer instead of dialing one, and never
    /// exhaust a retry budget
    pub fn is_passive(&self) -> bool {
        matches!(self, TransportKind::TcpServer | TransportKind::Udp)
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Ble => write!(f, "ble"),
            TransportKind::TcpClient => write!(f, "tcp-client"),
            TransportKind::TcpServer => write!(f, "tcp-server"),
            TransportKind::Udp => write!(f, "udp"),
        }
    }
}

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Unified connection contract implemented by every transport variant
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which variant this is
    fn kind(&self) -> TransportKind;

    /// Shared status read by the consumer loop and the watchdog
    fn status(&self) -> Arc<LinkStatus>;

    /// Establish (client kinds) or await (passive kinds) the peer, then
    /// pump inbound frames to the notification sink until aborted.
    /// Transient read errors downgrade the state and re-enter the
    /// connect/await path; only connect-retry exhaustion returns an
    /// error, which the orchestrator treats as fatal.
    async fn run(&self) -> Result<(), TransportError>;

    /// Drain the outbound queue to the peer until aborted. Idles without
    /// dequeuing while the link is down; a failed write downgrades the
    /// state and retains the frame.
    async fn drain_outbound(&self) -> Result<(), TransportError>;

    /// Queue a frame for transmission, suspending while the queue is full
    async fn enqueue_outbound(&self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Close sockets and release the peer handle. Idempotent, callable
    /// from any state.
    async fn teardown(&self);
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
