//! Shared link status for a single transport instance

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Connection state of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => ConnectionState::Connected,
            1 => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

// ----------------------------------------------------------------------------
// Link Status
// ----------------------------------------------------------------------------

/// Connection status shared between a transport's read loop, consumer loop
/// and watchdog. The state field is the single source of truth the three
/// loops act on; it is updated atomically. The last-inbound timestamp
/// doubles as the watchdog reset.
#[derive(Debug)]
pub struct LinkStatus {
    state: AtomicU8,
    last_inbound: Mutex<Instant>,
    peer: Mutex<Option<String>>,
}

impl LinkStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            last_inbound: Mutex::new(Instant::now()),
            peer: Mutex::new(None),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Update the connection state
    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Record an inbound chunk. Resets the watchdog deadline.
    pub fn mark_inbound(&self) {
        let mut last = self.last_inbound.lock().unwrap_or_else(|e| e.into_inner());
        *last = Instant::now();
    }

    /// Time elapsed since the last inbound chunk
    pub fn since_last_inbound(&self) -> Duration {
        let last = self.last_inbound.lock().unwrap_or_else(|e| e.into_inner());
        last.elapsed()
    }

    /// Record the active peer. Only one peer is tracked at a time.
    pub fn set_peer(&self, label: impl Into<String>) {
        let mut peer = self.peer.lock().unwrap_or_else(|e| e.into_inner());
        *peer = Some(label.into());
    }

    /// Forget the active peer
    pub fn clear_peer(&self) {
        let mut peer = self.peer.lock().unwrap_or_else(|e| e.into_inner());
        *peer = None;
    }

    /// Label of the active peer, if any
    pub fn peer(&self) -> Option<String> {
        self.peer.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
