//! BLE transport configuration

use std::time::Duration;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// BLE-specific settings layered on top of the shared `LinkConfig`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BleConfig {
    /// How long a discovery scan runs before the adapter's peripheral
    /// list is inspected
    pub scan_timeout: Duration,
    /// Maximum bytes per characteristic write (BLE MTU limitation)
    pub max_write_size: usize,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(10),
            max_write_size: 244,
        }
    }
}

impl BleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the discovery scan window
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }
}
