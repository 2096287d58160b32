//! Command-line entry point wiring for the evselink gateway

pub mod cli;
pub mod config;
pub mod error;
pub mod sink;

pub use cli::{Cli, TransportArg};
pub use config::AppConfig;
pub use error::{CliError, Result};
