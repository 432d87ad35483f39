//! Persistent configuration storage.
//!
//! [`ConfigStore`] is a typed accessor over a namespaced key-value store. It
//! maps the [`ProvisioningRecord`] onto keys and writes each logical group as
//! one short-lived session per call; no session is held across ticks.
//!
//! # Backends
//!
//! - [`MemoryStore`] - in-memory map (tests, simulation)
//! - [`FileStore`] - JSON file under the user's home (host builds)
//! - `NvsStore` - ESP32 Non-Volatile Storage (`esp32` feature)
//!
//! # Layout
//!
//! | Namespace | Keys |
//! |---|---|
//! | `netcfg` | `ssid`, `pwd`, `hostname`, `useStaticIP`, `ip`, `gateway`, `subnet`, `dns`, `ntpEnable`, `ntpServer`, `bootAttempts` |
//! | `powercfg` | `sleepEnable`, `wakeInterval`, `wakeLog` |
//! | `customdata` | `custom_<key>` |

mod custom;
mod file;
mod memory;
#[cfg(feature = "esp32")]
mod nvs;

pub use custom::{MAX_CUSTOM_KEY_LEN, RESERVED_KEYS};
pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "esp32")]
pub use nvs::NvsStore;

use crate::config::{
    NetworkIdentity, PowerSettings, ProvisioningRecord, Secret, StaticAddress, TimeSyncSettings,
    DEFAULT_NTP_SERVER, DEFAULT_WAKE_INTERVAL_US, MAX_ATTEMPTS,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace for network identity, addressing, time sync and the boot counter.
pub const NETWORK_NAMESPACE: &str = "netcfg";

/// Namespace for power settings.
pub const POWER_NAMESPACE: &str = "powercfg";

/// Namespace for user data.
pub const CUSTOM_NAMESPACE: &str = "customdata";

pub(crate) const KEY_SSID: &str = "ssid";
pub(crate) const KEY_PASSWORD: &str = "pwd";
pub(crate) const KEY_HOSTNAME: &str = "hostname";
pub(crate) const KEY_USE_STATIC_IP: &str = "useStaticIP";
pub(crate) const KEY_IP: &str = "ip";
pub(crate) const KEY_GATEWAY: &str = "gateway";
pub(crate) const KEY_SUBNET: &str = "subnet";
pub(crate) const KEY_DNS: &str = "dns";
pub(crate) const KEY_NTP_ENABLE: &str = "ntpEnable";
pub(crate) const KEY_NTP_SERVER: &str = "ntpServer";
pub(crate) const KEY_BOOT_ATTEMPTS: &str = "bootAttempts";
pub(crate) const KEY_SLEEP_ENABLE: &str = "sleepEnable";
pub(crate) const KEY_WAKE_INTERVAL: &str = "wakeInterval";
pub(crate) const KEY_WAKE_LOG: &str = "wakeLog";

/// A value as held by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredValue {
    Str(String),
    Bool(bool),
    I32(i32),
    U64(u64),
    F32(f32),
}

impl StoredValue {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Str(_) => ValueKind::Str,
            Self::Bool(_) => ValueKind::Bool,
            Self::I32(_) => ValueKind::I32,
            Self::U64(_) => ValueKind::U64,
            Self::F32(_) => ValueKind::F32,
        }
    }
}

/// Expected type of a stored value; typed backends need it to pick a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Bool,
    I32,
    U64,
    F32,
}

/// Namespaced key-value persistence.
///
/// Every call is synchronous and durable on return.
pub trait KeyValueStore {
    /// Read a value, or `None` if the key is absent.
    fn get(&self, namespace: &str, key: &str, kind: ValueKind)
        -> Result<Option<StoredValue>, StoreError>;

    /// Write a value.
    fn set(&mut self, namespace: &str, key: &str, value: &StoredValue) -> Result<(), StoreError>;

    /// Remove a key; absent keys are not an error.
    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StoreError>;

    /// Remove every key in a namespace.
    fn clear_namespace(&mut self, namespace: &str) -> Result<(), StoreError>;

    /// Check whether a key exists.
    fn contains(&self, namespace: &str, key: &str) -> Result<bool, StoreError>;
}

/// Errors that can occur during persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend rejected the operation.
    Backend(String),
    /// A key holds a value of a different type.
    TypeMismatch { namespace: String, key: String },
    /// Stored data could not be decoded.
    Corrupt(String),
    /// Read-back after a write did not match.
    VerificationFailed { namespace: String, key: String },
    /// The key is used by the provisioning record.
    ReservedKey(String),
    /// The key exceeds what the backend can hold.
    KeyTooLong { key: String, max: usize },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(msg) => write!(f, "store backend error: {}", msg),
            Self::TypeMismatch { namespace, key } => {
                write!(f, "type mismatch for {}/{}", namespace, key)
            }
            Self::Corrupt(msg) => write!(f, "corrupt store data: {}", msg),
            Self::VerificationFailed { namespace, key } => {
                write!(f, "read-back verification failed for {}/{}", namespace, key)
            }
            Self::ReservedKey(key) => write!(f, "key '{}' is reserved", key),
            Self::KeyTooLong { key, max } => {
                write!(f, "key '{}' too long (max {} bytes)", key, max)
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Corrupt(e.to_string())
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for StoreError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Backend(format!("{:?}", e))
    }
}

/// Typed accessor over a [`KeyValueStore`].
pub struct ConfigStore<S> {
    backend: S,
}

impl<S: KeyValueStore> ConfigStore<S> {
    /// Wrap a backend.
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    /// Borrow the backend.
    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Mutably borrow the backend.
    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }

    /// Unwrap the backend.
    pub fn into_inner(self) -> S {
        self.backend
    }

    /// Load the whole record, using defaults for absent keys.
    ///
    /// A stored boot counter outside `[0, MAX_ATTEMPTS]` is clamped.
    pub fn load(&self) -> Result<ProvisioningRecord, StoreError> {
        let ns = NETWORK_NAMESPACE;
        let stored_attempts = self.get_i32(ns, KEY_BOOT_ATTEMPTS, 0)?;
        let record = ProvisioningRecord {
            network: NetworkIdentity {
                ssid: self.get_str(ns, KEY_SSID, "")?,
                password: Secret::new(self.get_str(ns, KEY_PASSWORD, "")?),
            },
            hostname: self.get_str(ns, KEY_HOSTNAME, "")?,
            static_address: StaticAddress {
                enabled: self.get_bool(ns, KEY_USE_STATIC_IP, false)?,
                ip: self.get_str(ns, KEY_IP, "")?,
                gateway: self.get_str(ns, KEY_GATEWAY, "")?,
                subnet: self.get_str(ns, KEY_SUBNET, "")?,
                dns: self.get_str(ns, KEY_DNS, "")?,
            },
            time_sync: TimeSyncSettings {
                enabled: self.get_bool(ns, KEY_NTP_ENABLE, false)?,
                server: self.get_str(ns, KEY_NTP_SERVER, DEFAULT_NTP_SERVER)?,
            },
            boot_attempts: stored_attempts.clamp(0, MAX_ATTEMPTS as i32) as u8,
            power: self.load_power()?,
        };

        debug!(
            "Configuration loaded (ssid: {:?}, boot attempts: {})",
            record.network.ssid, record.boot_attempts
        );
        Ok(record)
    }

    /// Save every group of the record.
    pub fn save(&mut self, record: &ProvisioningRecord) -> Result<(), StoreError> {
        self.save_network(record)?;
        self.save_addressing(record)?;
        self.save_time_sync(&record.time_sync)?;
        self.save_power(&record.power)?;
        info!("Configuration saved");
        Ok(())
    }

    /// Save credentials together with the boot counter.
    pub fn save_network(&mut self, record: &ProvisioningRecord) -> Result<(), StoreError> {
        let ns = NETWORK_NAMESPACE;
        self.set_str(ns, KEY_SSID, &record.network.ssid)?;
        self.set_str(ns, KEY_PASSWORD, record.network.password.expose())?;
        self.save_boot_attempts(record.boot_attempts)
    }

    /// Save hostname and static-address override.
    pub fn save_addressing(&mut self, record: &ProvisioningRecord) -> Result<(), StoreError> {
        let ns = NETWORK_NAMESPACE;
        let address = &record.static_address;
        self.set_str(ns, KEY_HOSTNAME, &record.hostname)?;
        self.backend
            .set(ns, KEY_USE_STATIC_IP, &StoredValue::Bool(address.enabled))?;
        self.set_str(ns, KEY_IP, &address.ip)?;
        self.set_str(ns, KEY_GATEWAY, &address.gateway)?;
        self.set_str(ns, KEY_SUBNET, &address.subnet)?;
        self.set_str(ns, KEY_DNS, &address.dns)
    }

    /// Save time sync settings.
    pub fn save_time_sync(&mut self, settings: &TimeSyncSettings) -> Result<(), StoreError> {
        let ns = NETWORK_NAMESPACE;
        self.backend
            .set(ns, KEY_NTP_ENABLE, &StoredValue::Bool(settings.enabled))?;
        self.set_str(ns, KEY_NTP_SERVER, &settings.server)
    }

    /// Save power settings.
    pub fn save_power(&mut self, settings: &PowerSettings) -> Result<(), StoreError> {
        let ns = POWER_NAMESPACE;
        self.backend
            .set(ns, KEY_SLEEP_ENABLE, &StoredValue::Bool(settings.sleep_enabled))?;
        self.backend
            .set(ns, KEY_WAKE_INTERVAL, &StoredValue::U64(settings.wake_interval_us))?;
        self.backend
            .set(ns, KEY_WAKE_LOG, &StoredValue::Bool(settings.wake_logging))
    }

    /// Persist the boot counter on its own.
    pub fn save_boot_attempts(&mut self, attempts: u8) -> Result<(), StoreError> {
        self.backend.set(
            NETWORK_NAMESPACE,
            KEY_BOOT_ATTEMPTS,
            &StoredValue::I32(attempts as i32),
        )
    }

    /// Remove name, secret and boot counter; everything else stays.
    pub fn clear_network_identity(&mut self) -> Result<(), StoreError> {
        let ns = NETWORK_NAMESPACE;
        self.backend.remove(ns, KEY_SSID)?;
        self.backend.remove(ns, KEY_PASSWORD)?;
        self.backend.remove(ns, KEY_BOOT_ATTEMPTS)?;
        info!("Network identity cleared");
        Ok(())
    }

    /// Remove the whole record and all custom data.
    pub fn clear_all(&mut self) -> Result<(), StoreError> {
        self.backend.clear_namespace(NETWORK_NAMESPACE)?;
        self.backend.clear_namespace(POWER_NAMESPACE)?;
        self.backend.clear_namespace(CUSTOM_NAMESPACE)?;
        info!("All settings cleared");
        Ok(())
    }

    fn load_power(&self) -> Result<PowerSettings, StoreError> {
        let ns = POWER_NAMESPACE;
        Ok(PowerSettings {
            sleep_enabled: self.get_bool(ns, KEY_SLEEP_ENABLE, false)?,
            wake_interval_us: self.get_u64(ns, KEY_WAKE_INTERVAL, DEFAULT_WAKE_INTERVAL_US)?,
            wake_logging: self.get_bool(ns, KEY_WAKE_LOG, false)?,
        })
    }

    fn set_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.backend
            .set(namespace, key, &StoredValue::Str(value.to_string()))
    }

    pub(crate) fn get_str(
        &self,
        namespace: &str,
        key: &str,
        default: &str,
    ) -> Result<String, StoreError> {
        match self.backend.get(namespace, key, ValueKind::Str)? {
            Some(StoredValue::Str(value)) => Ok(value),
            Some(_) => Err(mismatch(namespace, key)),
            None => Ok(default.to_string()),
        }
    }

    pub(crate) fn get_bool(
        &self,
        namespace: &str,
        key: &str,
        default: bool,
    ) -> Result<bool, StoreError> {
        match self.backend.get(namespace, key, ValueKind::Bool)? {
            Some(StoredValue::Bool(value)) => Ok(value),
            Some(_) => Err(mismatch(namespace, key)),
            None => Ok(default),
        }
    }

    pub(crate) fn get_i32(&self, namespace: &str, key: &str, default: i32) -> Result<i32, StoreError> {
        match self.backend.get(namespace, key, ValueKind::I32)? {
            Some(StoredValue::I32(value)) => Ok(value),
            Some(_) => Err(mismatch(namespace, key)),
            None => Ok(default),
        }
    }

    pub(crate) fn get_u64(&self, namespace: &str, key: &str, default: u64) -> Result<u64, StoreError> {
        match self.backend.get(namespace, key, ValueKind::U64)? {
            Some(StoredValue::U64(value)) => Ok(value),
            Some(_) => Err(mismatch(namespace, key)),
            None => Ok(default),
        }
    }

    pub(crate) fn get_f32(&self, namespace: &str, key: &str, default: f32) -> Result<f32, StoreError> {
        match self.backend.get(namespace, key, ValueKind::F32)? {
            Some(StoredValue::F32(value)) => Ok(value),
            Some(_) => Err(mismatch(namespace, key)),
            None => Ok(default),
        }
    }
}

fn mismatch(namespace: &str, key: &str) -> StoreError {
    StoreError::TypeMismatch {
        namespace: namespace.to_string(),
        key: key.to_string(),
    }
}
