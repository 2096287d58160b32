//! Discovered device identity and handshake progress
//!
//! The device state is mutated by the external protocol decoder as it
//! observes handshake messages in the inbound byte stream, and read (or
//! reset on restart) by the orchestrator. All access goes through a shared
//! `RwLock` so the two never write concurrently.

use std::sync::Arc;

use tokio::sync::RwLock;

/// Device state shared between the protocol decoder and the orchestrator
pub type SharedDeviceState = Arc<RwLock<DeviceState>>;

// ----------------------------------------------------------------------------
// Device Info
// ----------------------------------------------------------------------------

/// Identity fields populated during the handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial: Option<String>,
    pub hardware_version: Option<String>,
    pub software_version: Option<String>,
}

// ----------------------------------------------------------------------------
// Device State
// ----------------------------------------------------------------------------

/// Handshake progress and identity of the single managed wallbox
#[derive(Debug)]
pub struct DeviceState {
    /// Set by the decoder once the device's handshake message is seen
    pub initialized: bool,
    /// Set by the decoder after a successful login exchange
    pub logged_in: bool,
    /// Device lacks a firmware-version query; synthesize the software
    /// version from the hardware version instead of waiting for it
    pub fallback: bool,
    pub info: DeviceInfo,
    /// Unit used when reporting consumed energy ("W" or "kW")
    pub energy_unit: String,
}

impl DeviceState {
    pub fn new() -> Self {
        Self {
            initialized: false,
            logged_in: false,
            fallback: false,
            info: DeviceInfo::default(),
            energy_unit: "W".to_string(),
        }
    }

    /// Create the process-wide shared instance
    pub fn shared() -> SharedDeviceState {
        Arc::new(RwLock::new(Self::new()))
    }

    /// True once both identity fields needed for bridge activation are
    /// known
    pub fn identity_complete(&self) -> bool {
        self.info.serial.is_some() && self.info.software_version.is_some()
    }

    /// Populate the software version from the hardware version for
    /// devices without a firmware-version query
    pub fn apply_fallback_version(&mut self) {
        self.info.software_version = self.info.hardware_version.clone();
    }

    /// Reset handshake state so a restarted connection cycle re-runs the
    /// discovery sequence deterministically. Serial and hardware version
    /// survive; they identify the physical device, not the session.
    pub fn reset_for_restart(&mut self) {
        self.initialized = false;
        self.logged_in = false;
        self.info.software_version = None;
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
