//! Device configuration types.
//!
//! This module provides the persisted provisioning record, the portal's
//! reconfiguration subset, and the code-supplied device constants. All of it
//! is platform-independent and host-testable.
//!
//! # Components
//!
//! - [`record`] - the persisted [`ProvisioningRecord`] and its groups
//! - [`address`] - strict `a.b.c.d` parsing for the static override
//! - [`update`] - [`ConfigUpdate`] accepted from the portal
//! - [`device`] - [`DeviceConfig`], constants fixed at build time

mod address;
mod device;
mod record;
mod update;

pub use address::{parse_address, AddressField, StaticIpv4};
pub use device::{DeviceConfig, DEFAULT_AP_ADDRESS, DEFAULT_AP_SSID, DEFAULT_RESET_PIN};
pub use record::{
    NetworkIdentity, PowerSettings, ProvisioningRecord, Secret, StaticAddress, TimeSyncSettings,
    DEFAULT_NTP_SERVER, DEFAULT_WAKE_INTERVAL_US, MAX_ATTEMPTS, MAX_HOSTNAME_LEN,
    MAX_PASSWORD_LEN, MAX_SSID_LEN,
};
pub use update::{AddressingUpdate, ConfigUpdate, NetworkUpdate};

use std::fmt;

/// Errors that can occur while validating configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
    /// Password exceeds maximum length.
    PasswordTooLong { len: usize, max: usize },
    /// Hostname exceeds maximum length.
    HostnameTooLong { len: usize, max: usize },
    /// A static-address field is not a strict dotted quad.
    InvalidAddress { field: AddressField, value: String },
    /// Sleep enabled with a zero wake interval.
    ZeroWakeInterval,
    /// Reconfiguration request carried no groups.
    EmptyUpdate,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
            Self::PasswordTooLong { len, max } => {
                write!(f, "password too long: {} bytes (max {})", len, max)
            }
            Self::HostnameTooLong { len, max } => {
                write!(f, "hostname too long: {} bytes (max {})", len, max)
            }
            Self::InvalidAddress { field, value } => {
                write!(f, "invalid {} address: {:?}", field, value)
            }
            Self::ZeroWakeInterval => write!(f, "wake interval must be greater than zero"),
            Self::EmptyUpdate => write!(f, "update contains no settings"),
        }
    }
}

impl std::error::Error for ConfigError {}
