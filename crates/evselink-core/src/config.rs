//! Timing and sizing configuration shared by all transports

use std::time::Duration;

use crate::queue::DEFAULT_OUTBOUND_CAPACITY;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Connection-management configuration applied uniformly to every
/// transport kind. The watchdog timeout is identical across kinds to keep
/// device-idle tolerance predictable.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LinkConfig {
    /// Maximum number of active connect attempts before a fatal failure
    pub connect_attempts: u32,
    /// Upper bound on a single connect attempt
    pub connect_timeout: Duration,
    /// Pause between connect attempts
    pub retry_backoff: Duration,
    /// Silence window after which the watchdog requests a restart
    pub watchdog_timeout: Duration,
    /// Interval for lifecycle polling loops
    pub poll_interval: Duration,
    /// Consumer idle interval while the link is down
    pub idle_poll: Duration,
    /// Pause before a client transport re-dials after a dropped link
    pub reconnect_pause: Duration,
    /// Inbound read buffer size
    pub read_buffer_size: usize,
    /// Outbound queue capacity
    pub outbound_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_attempts: 5,
            connect_timeout: Duration::from_secs(15),
            retry_backoff: Duration::from_secs(2),
            watchdog_timeout: Duration::from_secs(35),
            poll_interval: Duration::from_secs(1),
            idle_poll: Duration::from_secs(1),
            reconnect_pause: Duration::from_secs(1),
            read_buffer_size: 4096,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl LinkConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect retry budget
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    /// Set the per-attempt connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the watchdog silence window
    pub fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.connect_attempts == 0 {
            return Err("connect_attempts must be greater than 0".to_string());
        }
        if self.outbound_capacity == 0 {
            return Err("outbound_capacity must be greater than 0".to_string());
        }
        // Polling intervals must neither busy-spin nor starve.
        for (name, interval) in [
            ("poll_interval", self.poll_interval),
            ("idle_poll", self.idle_poll),
            ("reconnect_pause", self.reconnect_pause),
        ] {
            if interval.is_zero() {
                return Err(format!("{name} must not be zero"));
            }
            if interval > Duration::from_secs(60) {
                return Err(format!("{name} must stay below one minute"));
            }
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing_contract() {
        let config = LinkConfig::default();
        assert_eq!(config.connect_attempts, 5);
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.retry_backoff, Duration::from_secs(2));
        assert_eq!(config.watchdog_timeout, Duration::from_secs(35));
        assert_eq!(config.outbound_capacity, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let mut config = LinkConfig::default();
        config.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = LinkConfig::default();
        config.connect_attempts = 0;
        assert!(config.validate().is_err());
    }
}
