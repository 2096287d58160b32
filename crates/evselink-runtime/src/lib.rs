//! Lifecycle orchestration for the evselink gateway
//!
//! The [`Orchestrator`] owns the connection cycle of the single managed
//! wallbox: it provisions the transport, spawns the read, drain and
//! watchdog tasks, walks the handshake toward bridge activation, and
//! serializes restart, fatal-exit and shutdown requests into one place.

pub mod orchestrator;

pub use orchestrator::{
    BridgeFactory, ExitOutcome, Orchestrator, Phase, TransportFactory,
};
