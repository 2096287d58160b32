//! Application configuration
//!
//! Layered as CLI args over a TOML file over defaults. The file carries
//! the timing contract and broker settings; the CLI overrides the broker
//! location and credentials.

use serde::{Deserialize, Serialize};

use evselink_ble::BleConfig;
use evselink_core::LinkConfig;
use evselink_mqtt::MqttSettings;

use crate::cli::Cli;
use crate::error::{CliError, Result};

/// Complete configuration for the gateway process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Connection timing and sizing
    pub link: LinkConfig,
    /// MQTT broker settings
    pub mqtt: MqttSettings,
    /// BLE transport settings
    pub ble: BleConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        self.mqtt.host = cli.broker.clone();
        self.mqtt.port = cli.broker_port;
        if let (Some(user), Some(pass)) = (&cli.mqtt_user, &cli.mqtt_password) {
            self.mqtt = self.mqtt.with_auth(user, pass);
        }
        self
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        self.link.validate().map_err(CliError::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.link.watchdog_timeout, Duration::from_secs(35));
        assert_eq!(config.mqtt.port, 1883);
    }

    #[test]
    fn test_cli_overrides_broker() {
        let cli = Cli::parse_from([
            "evselink",
            "--broker",
            "broker.local",
            "--broker-port",
            "8883",
            "--mqtt-user",
            "evse",
            "--mqtt-password",
            "secret",
        ]);
        let config = AppConfig::default().apply_cli(&cli);
        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.username.as_deref(), Some("evse"));
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [mqtt]
            host = "10.0.0.2"
            port = 1884
            keep_alive_secs = 30
            "#,
        )
        .expect("valid TOML");
        assert_eq!(config.mqtt.host, "10.0.0.2");
        assert_eq!(config.link.connect_attempts, 5);
    }
}
