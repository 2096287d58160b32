//! Error types shared across the evselink workspace

use thiserror::Error;

/// Errors raised by transport implementations
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection to {endpoint} failed after {attempts} attempts: {reason}")]
    RetriesExhausted {
        endpoint: String,
        attempts: u32,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport is not connected")]
    NotConnected,

    #[error("outbound queue closed")]
    QueueClosed,

    #[error("BLE adapter error: {0}")]
    Adapter(String),

    #[error("invalid transport configuration: {0}")]
    InvalidConfiguration(String),
}

/// Errors raised by the MQTT bridge boundary
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("MQTT client error: {0}")]
    Client(String),

    #[error("bridge is not connected")]
    NotConnected,

    #[error("payload serialization error: {0}")]
    Serialization(String),
}
