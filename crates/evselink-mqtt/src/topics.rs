//! Topic layout for a single wallbox
//!
//! All topics hang off `evselink/{serial}`; the serial is the stable
//! device identity reported during the handshake.

/// Retained availability announcements ("online" / "offline")
pub fn availability_topic(serial: &str) -> String {
    format!("evselink/{serial}/availability")
}

/// Inbound remote commands for the wallbox
pub fn command_topic(serial: &str) -> String {
    format!("evselink/{serial}/command")
}

/// Decoded wallbox state published by the protocol decoder
pub fn state_topic(serial: &str) -> String {
    format!("evselink/{serial}/state")
}

/// Retained device description announced once per connection cycle
pub fn discovery_topic(serial: &str) -> String {
    format!("evselink/{serial}/config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics_share_device_prefix() {
        assert_eq!(availability_topic("SN123"), "evselink/SN123/availability");
        assert_eq!(command_topic("SN123"), "evselink/SN123/command");
        assert_eq!(state_topic("SN123"), "evselink/SN123/state");
        assert_eq!(discovery_topic("SN123"), "evselink/SN123/config");
    }
}
