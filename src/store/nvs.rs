//! ESP32 Non-Volatile Storage backend.
//!
//! Each call opens its namespace, does one operation and closes it again, so
//! no handle outlives the call that needed it. Every write is read back before
//! the call returns.

use super::{KeyValueStore, StoreError, StoredValue, ValueKind};
use esp_idf_svc::nvs::{EspNvs, EspNvsPartition, NvsDefault};
use esp_idf_sys::{esp, EspError};
use log::{debug, error};
use std::ffi::CString;

/// NVS limit on key and namespace names.
const MAX_NVS_KEY_LEN: usize = 15;

/// Largest string the record stores (a 64-byte secret) plus terminator.
const MAX_STR_BUFFER: usize = 128;

/// [`KeyValueStore`] over the default NVS partition.
pub struct NvsStore {
    partition: EspNvsPartition<NvsDefault>,
}

impl NvsStore {
    /// Take the default NVS partition.
    ///
    /// May only be called once per boot.
    pub fn take() -> Result<Self, StoreError> {
        Ok(Self::new(EspNvsPartition::<NvsDefault>::take()?))
    }

    /// Use an already-taken partition handle.
    pub fn new(partition: EspNvsPartition<NvsDefault>) -> Self {
        Self { partition }
    }

    /// Partition handle, shared with the WiFi driver for its calibration data.
    pub fn partition(&self) -> EspNvsPartition<NvsDefault> {
        self.partition.clone()
    }

    fn session(&self, namespace: &str) -> Result<EspNvs<NvsDefault>, StoreError> {
        check_name(namespace)?;
        Ok(EspNvs::new(self.partition.clone(), namespace, true)?)
    }

    /// Read-only session, or `None` if the namespace was never written.
    fn read_session(&self, namespace: &str) -> Result<Option<EspNvs<NvsDefault>>, StoreError> {
        check_name(namespace)?;
        match EspNvs::new(self.partition.clone(), namespace, false) {
            Ok(nvs) => Ok(Some(nvs)),
            Err(e) if e.code() == esp_idf_sys::ESP_ERR_NVS_NOT_FOUND as i32 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn read(
        nvs: &EspNvs<NvsDefault>,
        namespace: &str,
        key: &str,
        kind: ValueKind,
    ) -> Result<Option<StoredValue>, StoreError> {
        let value = match kind {
            ValueKind::Str => {
                let mut buf = [0u8; MAX_STR_BUFFER];
                nvs.get_str(key, &mut buf)
                    .map_err(|e| map_read_error(e, namespace, key))?
                    .map(|s| StoredValue::Str(s.to_string()))
            }
            ValueKind::Bool => nvs
                .get_u8(key)
                .map_err(|e| map_read_error(e, namespace, key))?
                .map(|v| StoredValue::Bool(v != 0)),
            ValueKind::I32 => nvs
                .get_i32(key)
                .map_err(|e| map_read_error(e, namespace, key))?
                .map(StoredValue::I32),
            ValueKind::U64 => nvs
                .get_u64(key)
                .map_err(|e| map_read_error(e, namespace, key))?
                .map(StoredValue::U64),
            ValueKind::F32 => nvs
                .get_u32(key)
                .map_err(|e| map_read_error(e, namespace, key))?
                .map(|bits| StoredValue::F32(f32::from_bits(bits))),
        };
        Ok(value)
    }
}

impl KeyValueStore for NvsStore {
    fn get(
        &self,
        namespace: &str,
        key: &str,
        kind: ValueKind,
    ) -> Result<Option<StoredValue>, StoreError> {
        check_name(key)?;
        match self.read_session(namespace)? {
            Some(nvs) => Self::read(&nvs, namespace, key, kind),
            None => Ok(None),
        }
    }

    fn set(&mut self, namespace: &str, key: &str, value: &StoredValue) -> Result<(), StoreError> {
        check_name(key)?;
        let mut nvs = self.session(namespace)?;
        match value {
            StoredValue::Str(s) => nvs.set_str(key, s)?,
            StoredValue::Bool(b) => nvs.set_u8(key, u8::from(*b))?,
            StoredValue::I32(v) => nvs.set_i32(key, *v)?,
            StoredValue::U64(v) => nvs.set_u64(key, *v)?,
            StoredValue::F32(v) => nvs.set_u32(key, v.to_bits())?,
        }

        // Read back to catch silent flash write failures
        let read_back = Self::read(&nvs, namespace, key, value.kind())?;
        if read_back.as_ref() != Some(value) {
            error!("NVS verification failed for {}/{}", namespace, key);
            return Err(StoreError::VerificationFailed {
                namespace: namespace.to_string(),
                key: key.to_string(),
            });
        }
        debug!("Stored {}/{}", namespace, key);
        Ok(())
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StoreError> {
        check_name(key)?;
        let mut nvs = self.session(namespace)?;
        nvs.remove(key)?;
        Ok(())
    }

    fn clear_namespace(&mut self, namespace: &str) -> Result<(), StoreError> {
        check_name(namespace)?;
        let name = CString::new(namespace)
            .map_err(|_| StoreError::Backend(format!("invalid namespace {:?}", namespace)))?;

        let mut handle: esp_idf_sys::nvs_handle_t = 0;
        // SAFETY: `name` outlives the call and `handle` is a valid out-pointer.
        unsafe {
            esp!(esp_idf_sys::nvs_open(
                name.as_ptr(),
                esp_idf_sys::nvs_open_mode_t_NVS_READWRITE,
                &mut handle,
            ))?;
        }
        // SAFETY: `handle` was opened above and is closed exactly once.
        let result = unsafe {
            esp!(esp_idf_sys::nvs_erase_all(handle))
                .and_then(|_| esp!(esp_idf_sys::nvs_commit(handle)))
        };
        unsafe { esp_idf_sys::nvs_close(handle) };
        result?;

        debug!("Erased NVS namespace {}", namespace);
        Ok(())
    }

    fn contains(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
        check_name(key)?;
        match self.read_session(namespace)? {
            Some(nvs) => Ok(nvs.contains(key)?),
            None => Ok(false),
        }
    }
}

fn check_name(name: &str) -> Result<(), StoreError> {
    if name.len() > MAX_NVS_KEY_LEN {
        return Err(StoreError::KeyTooLong {
            key: name.to_string(),
            max: MAX_NVS_KEY_LEN,
        });
    }
    Ok(())
}

fn map_read_error(e: EspError, namespace: &str, key: &str) -> StoreError {
    if e.code() == esp_idf_sys::ESP_ERR_NVS_TYPE_MISMATCH as i32 {
        StoreError::TypeMismatch {
            namespace: namespace.to_string(),
            key: key.to_string(),
        }
    } else {
        e.into()
    }
}
