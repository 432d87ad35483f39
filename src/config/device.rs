//! Code-supplied device constants.

use std::net::Ipv4Addr;
use std::time::Duration;

/// Network name advertised in access-point role.
pub const DEFAULT_AP_SSID: &str = "ESP32_SETUP";

/// Fixed local address in access-point role.
pub const DEFAULT_AP_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

/// Reset button line (GPIO0, the boot button on most ESP32 boards).
pub const DEFAULT_RESET_PIN: u8 = 0;

/// Settings fixed at build time rather than stored on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Hostname used when none is stored.
    pub default_hostname: String,
    /// Network name advertised in access-point role.
    pub ap_ssid: String,
    /// Local address in access-point role.
    pub ap_address: Ipv4Addr,
    /// Active-low reset button line; also the fixed GPIO wake source.
    pub reset_pin: u8,
    /// Interval between connection health checks.
    pub health_check_interval: Duration,
    /// Status polls per station attempt.
    pub connect_polls: u32,
    /// Delay between status polls.
    pub connect_poll_interval: Duration,
    /// Delay before a restart-as-retry.
    pub restart_grace: Duration,
    /// Delay before a requested reboot.
    pub reboot_delay: Duration,
    /// Minimum hold for the network-only reset tier.
    pub network_reset_hold: Duration,
    /// Minimum hold for the factory reset tier.
    pub factory_reset_hold: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            default_hostname: String::new(),
            ap_ssid: DEFAULT_AP_SSID.to_string(),
            ap_address: DEFAULT_AP_ADDRESS,
            reset_pin: DEFAULT_RESET_PIN,
            health_check_interval: Duration::from_secs(30),
            connect_polls: 10,
            connect_poll_interval: Duration::from_millis(500),
            restart_grace: Duration::from_secs(1),
            reboot_delay: Duration::from_millis(500),
            network_reset_hold: Duration::from_millis(3000),
            factory_reset_hold: Duration::from_millis(10_000),
        }
    }
}

impl DeviceConfig {
    /// Default config with a code-supplied hostname.
    pub fn with_hostname(hostname: impl Into<String>) -> Self {
        Self {
            default_hostname: hostname.into(),
            ..Default::default()
        }
    }

    /// Upper bound on how long one station attempt blocks.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_poll_interval * self.connect_polls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_timeout_is_five_seconds() {
        assert_eq!(DeviceConfig::default().connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_with_hostname() {
        let config = DeviceConfig::with_hostname("sensor-7");
        assert_eq!(config.default_hostname, "sensor-7");
        assert_eq!(config.ap_ssid, DEFAULT_AP_SSID);
    }
}
