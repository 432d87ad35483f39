//! User data kept next to the provisioning record.
//!
//! Keys are stored as `custom_<key>` in the `customdata` namespace and are
//! erased only by a factory reset.

use super::{
    ConfigStore, KeyValueStore, StoreError, StoredValue, CUSTOM_NAMESPACE, KEY_BOOT_ATTEMPTS,
    KEY_DNS, KEY_GATEWAY, KEY_HOSTNAME, KEY_IP, KEY_NTP_ENABLE, KEY_NTP_SERVER, KEY_PASSWORD,
    KEY_SLEEP_ENABLE, KEY_SSID, KEY_SUBNET, KEY_USE_STATIC_IP, KEY_WAKE_INTERVAL, KEY_WAKE_LOG,
};
use log::warn;

const CUSTOM_PREFIX: &str = "custom_";

/// NVS keys are limited to 15 bytes; the prefix takes 7.
pub const MAX_CUSTOM_KEY_LEN: usize = 15 - CUSTOM_PREFIX.len();

/// Keys owned by the provisioning record.
pub const RESERVED_KEYS: [&str; 14] = [
    KEY_SSID,
    KEY_PASSWORD,
    KEY_HOSTNAME,
    KEY_USE_STATIC_IP,
    KEY_IP,
    KEY_GATEWAY,
    KEY_SUBNET,
    KEY_DNS,
    KEY_NTP_ENABLE,
    KEY_NTP_SERVER,
    KEY_BOOT_ATTEMPTS,
    KEY_SLEEP_ENABLE,
    KEY_WAKE_INTERVAL,
    KEY_WAKE_LOG,
];

fn storage_key(key: &str) -> Result<String, StoreError> {
    if key.len() > MAX_CUSTOM_KEY_LEN {
        return Err(StoreError::KeyTooLong {
            key: key.to_string(),
            max: MAX_CUSTOM_KEY_LEN,
        });
    }
    Ok(format!("{}{}", CUSTOM_PREFIX, key))
}

impl<S: KeyValueStore> ConfigStore<S> {
    /// Store a user value. Reserved and over-long keys are refused.
    pub fn save_custom(&mut self, key: &str, value: StoredValue) -> Result<(), StoreError> {
        if RESERVED_KEYS.contains(&key) {
            warn!("Refusing to store custom data under reserved key '{}'", key);
            return Err(StoreError::ReservedKey(key.to_string()));
        }
        let storage_key = storage_key(key)?;
        self.backend_mut().set(CUSTOM_NAMESPACE, &storage_key, &value)
    }

    /// Load a string value.
    pub fn load_custom_str(&self, key: &str, default: &str) -> Result<String, StoreError> {
        self.get_str(CUSTOM_NAMESPACE, &storage_key(key)?, default)
    }

    /// Load an integer value.
    pub fn load_custom_i32(&self, key: &str, default: i32) -> Result<i32, StoreError> {
        self.get_i32(CUSTOM_NAMESPACE, &storage_key(key)?, default)
    }

    /// Load a boolean value.
    pub fn load_custom_bool(&self, key: &str, default: bool) -> Result<bool, StoreError> {
        self.get_bool(CUSTOM_NAMESPACE, &storage_key(key)?, default)
    }

    /// Load a float value.
    pub fn load_custom_f32(&self, key: &str, default: f32) -> Result<f32, StoreError> {
        self.get_f32(CUSTOM_NAMESPACE, &storage_key(key)?, default)
    }

    /// Check whether a user value exists.
    pub fn has_custom(&self, key: &str) -> Result<bool, StoreError> {
        self.backend().contains(CUSTOM_NAMESPACE, &storage_key(key)?)
    }

    /// Remove a user value.
    pub fn remove_custom(&mut self, key: &str) -> Result<(), StoreError> {
        let storage_key = storage_key(key)?;
        self.backend_mut().remove(CUSTOM_NAMESPACE, &storage_key)
    }
}

#[cfg(test)]
mod tests {
    use super::super::MemoryStore;
    use super::*;

    #[test]
    fn test_typed_values() {
        let mut store = ConfigStore::new(MemoryStore::new());
        store.save_custom("label", StoredValue::Str("porch".into())).unwrap();
        store.save_custom("count", StoredValue::I32(-4)).unwrap();
        store.save_custom("armed", StoredValue::Bool(true)).unwrap();
        store.save_custom("gain", StoredValue::F32(1.5)).unwrap();

        assert_eq!(store.load_custom_str("label", "").unwrap(), "porch");
        assert_eq!(store.load_custom_i32("count", 0).unwrap(), -4);
        assert!(store.load_custom_bool("armed", false).unwrap());
        assert_eq!(store.load_custom_f32("gain", 0.0).unwrap(), 1.5);
    }

    #[test]
    fn test_defaults_when_absent() {
        let store = ConfigStore::new(MemoryStore::new());
        assert_eq!(store.load_custom_str("label", "none").unwrap(), "none");
        assert_eq!(store.load_custom_i32("count", 9).unwrap(), 9);
        assert!(!store.has_custom("label").unwrap());
    }

    #[test]
    fn test_reserved_key_refused() {
        let mut store = ConfigStore::new(MemoryStore::new());
        let result = store.save_custom("ssid", StoredValue::Str("evil".into()));
        assert_eq!(result, Err(StoreError::ReservedKey("ssid".to_string())));
    }

    #[test]
    fn test_key_too_long() {
        let mut store = ConfigStore::new(MemoryStore::new());
        let result = store.save_custom("ninechars", StoredValue::Bool(true));
        assert!(matches!(result, Err(StoreError::KeyTooLong { max: 8, .. })));
        assert!(store.save_custom("eightchr", StoredValue::Bool(true)).is_ok());
    }

    #[test]
    fn test_remove() {
        let mut store = ConfigStore::new(MemoryStore::new());
        store.save_custom("label", StoredValue::Str("porch".into())).unwrap();
        store.remove_custom("label").unwrap();
        assert!(!store.has_custom("label").unwrap());
        // Removing again is not an error
        store.remove_custom("label").unwrap();
    }
}
