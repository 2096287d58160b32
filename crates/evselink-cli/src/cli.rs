//! Command-line interface definitions and parsing

use clap::{Parser, ValueEnum};

use evselink_core::TransportKind;

use crate::error::{CliError, Result};

#[derive(Parser)]
#[command(author, version, about = "MQTT gateway for EVSE wallboxes", long_about = None)]
pub struct Cli {
    /// Transport used to reach the wallbox
    #[arg(short, long, value_enum, default_value_t = TransportArg::Ble)]
    pub transport: TransportArg,

    /// BLE MAC address of the wallbox (required for the ble transport)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Wallbox hostname or IP (required for the tcp-client transport)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to dial (tcp-client) or listen on (tcp-server, udp)
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// MQTT broker hostname
    #[arg(long, default_value = "localhost")]
    pub broker: String,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    pub broker_port: u16,

    /// MQTT username
    #[arg(long)]
    pub mqtt_user: Option<String>,

    /// MQTT password
    #[arg(long)]
    pub mqtt_password: Option<String>,

    /// Run without an MQTT bridge (connection management only)
    #[arg(long)]
    pub no_mqtt: bool,

    /// Unit used when reporting consumed energy
    #[arg(short, long, value_enum, default_value_t = EnergyUnit::W)]
    pub unit: EnergyUnit,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

/// Transport selector mapped onto the core transport kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Ble,
    TcpClient,
    TcpServer,
    Udp,
}

impl TransportArg {
    pub fn kind(self) -> TransportKind {
        match self {
            TransportArg::Ble => TransportKind::Ble,
            TransportArg::TcpClient => TransportKind::TcpClient,
            TransportArg::TcpServer => TransportKind::TcpServer,
            TransportArg::Udp => TransportKind::Udp,
        }
    }
}

impl std::fmt::Display for TransportArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Reported energy unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EnergyUnit {
    W,
    Kw,
}

impl EnergyUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            EnergyUnit::W => "W",
            EnergyUnit::Kw => "kW",
        }
    }
}

impl std::fmt::Display for EnergyUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EnergyUnit::W => "w",
            EnergyUnit::Kw => "kw",
        };
        write!(f, "{name}")
    }
}

impl Cli {
    /// The dial target for the selected client transport
    pub fn endpoint(&self) -> Result<String> {
        match self.transport {
            TransportArg::Ble => self
                .address
                .clone()
                .ok_or_else(|| CliError::Config("--address is required for the ble transport".to_string())),
            TransportArg::TcpClient => {
                let host = self.host.as_deref().ok_or_else(|| {
                    CliError::Config("--host is required for the tcp-client transport".to_string())
                })?;
                Ok(format!("{host}:{}", self.port))
            }
            TransportArg::TcpServer | TransportArg::Udp => Ok(format!("0.0.0.0:{}", self.port)),
        }
    }
}
