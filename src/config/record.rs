//! Persisted provisioning record.
//!
//! This module contains platform-independent types for the single
//! provisioning record a device keeps in its key-value store. Everything here
//! is host-testable.
//!
//! # Example
//!
//! ```
//! use wifiweb_esp32::config::{NetworkIdentity, ProvisioningRecord};
//!
//! let mut record = ProvisioningRecord::default();
//! record.network = NetworkIdentity::new("Home", "secret-pass").unwrap();
//! assert!(record.network.has_credentials());
//! assert_eq!(record.effective_hostname("esp32-node"), "esp32-node");
//! ```

use super::address::{parse_address, AddressField, StaticIpv4};
use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Maximum password length for WPA2.
pub const MAX_PASSWORD_LEN: usize = 64;

/// Maximum hostname length accepted by the station interface.
pub const MAX_HOSTNAME_LEN: usize = 32;

/// Bound on consecutive failed boot-time connection attempts.
pub const MAX_ATTEMPTS: u8 = 3;

/// Time server used when none is stored.
pub const DEFAULT_NTP_SERVER: &str = "pool.ntp.org";

/// Wake timer interval used when none is stored (60 seconds).
pub const DEFAULT_WAKE_INTERVAL_US: u64 = 60_000_000;

/// Network secret, zeroed when dropped.
///
/// `Debug` never prints the contents.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the clear-text value (for handing to the radio or the store).
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if no secret is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "Secret(<empty>)")
        } else {
            write!(f, "Secret(****)")
        }
    }
}

/// Credentials of the network to join in station role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkIdentity {
    /// Network name (1-32 bytes when set).
    pub ssid: String,
    /// Network secret (empty for open networks).
    pub password: Secret,
}

impl NetworkIdentity {
    /// Create validated credentials.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Result<Self, ConfigError> {
        let identity = Self {
            ssid: ssid.into(),
            password: Secret::new(password),
        };
        identity.validate()?;
        Ok(identity)
    }

    /// Validate the credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(ConfigError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }
        if self.password.len() > MAX_PASSWORD_LEN {
            return Err(ConfigError::PasswordTooLong {
                len: self.password.len(),
                max: MAX_PASSWORD_LEN,
            });
        }
        Ok(())
    }

    /// Both a network name and a secret are stored.
    ///
    /// This is what the boot-time entry decision requires before spending an
    /// attempt from the budget.
    pub fn has_credentials(&self) -> bool {
        !self.ssid.is_empty() && !self.password.is_empty()
    }

    /// A network name is stored (enough for the periodic health check).
    pub fn has_network_name(&self) -> bool {
        !self.ssid.is_empty()
    }

    /// Forget name and secret.
    pub fn clear(&mut self) {
        self.ssid.clear();
        self.password = Secret::default();
    }
}

/// Static IPv4 override for station role.
///
/// The four strings are kept exactly as entered; they are only parsed when a
/// connection attempt applies them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticAddress {
    /// Use the override instead of automatic addressing.
    pub enabled: bool,
    /// Interface address.
    pub ip: String,
    /// Default gateway.
    pub gateway: String,
    /// Subnet mask in dotted form.
    pub subnet: String,
    /// DNS server.
    pub dns: String,
}

impl StaticAddress {
    /// Parse all four fields with strict `a.b.c.d` validation.
    ///
    /// Fails on the first field that does not parse.
    pub fn parse(&self) -> Result<StaticIpv4, ConfigError> {
        let ip = parse_address(AddressField::Ip, &self.ip)?;
        let gateway = parse_address(AddressField::Gateway, &self.gateway)?;
        let subnet = parse_address(AddressField::Subnet, &self.subnet)?;
        let dns = parse_address(AddressField::Dns, &self.dns)?;
        StaticIpv4::new(ip, gateway, subnet, dns)
    }
}

/// Network time synchronisation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSyncSettings {
    /// Start time sync after boot and on change.
    pub enabled: bool,
    /// Time server hostname.
    pub server: String,
}

impl Default for TimeSyncSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            server: DEFAULT_NTP_SERVER.to_string(),
        }
    }
}

impl TimeSyncSettings {
    /// Server to use, falling back to [`DEFAULT_NTP_SERVER`] when blank.
    pub fn effective_server(&self) -> &str {
        let server = self.server.trim();
        if server.is_empty() {
            DEFAULT_NTP_SERVER
        } else {
            server
        }
    }
}

/// Low-power settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerSettings {
    /// Suspend into light sleep at the end of each tick.
    pub sleep_enabled: bool,
    /// Timer wake source interval in microseconds.
    pub wake_interval_us: u64,
    /// Count wake causes in [`WakeupStats`](crate::power::WakeupStats).
    pub wake_logging: bool,
}

impl Default for PowerSettings {
    fn default() -> Self {
        Self {
            sleep_enabled: false,
            wake_interval_us: DEFAULT_WAKE_INTERVAL_US,
            wake_logging: false,
        }
    }
}

/// The device's single persisted configuration record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningRecord {
    /// Station credentials.
    pub network: NetworkIdentity,
    /// Stored hostname; empty means "use the code default".
    pub hostname: String,
    /// Static address override.
    pub static_address: StaticAddress,
    /// Time sync settings.
    pub time_sync: TimeSyncSettings,
    /// Consecutive failed boot attempts, always in `[0, MAX_ATTEMPTS]`.
    pub boot_attempts: u8,
    /// Sleep and wake settings.
    pub power: PowerSettings,
}

impl ProvisioningRecord {
    /// Stored hostname, or `default` when none is stored.
    pub fn effective_hostname<'a>(&'a self, default: &'a str) -> &'a str {
        if self.hostname.is_empty() {
            default
        } else {
            &self.hostname
        }
    }

    /// Clear name, secret and boot counter; leave every other group intact.
    pub fn clear_network_identity(&mut self) {
        self.network.clear();
        self.boot_attempts = 0;
    }
}
