//! File-backed key-value store for host (development) builds.
//!
//! Keeps every namespace in a single JSON file so provisioning state, including
//! the boot counter, survives restarts of the host simulator.
//! Uses `~/.wifiweb-esp32/store.json` by default.

use super::{KeyValueStore, MemoryStore, StoreError, StoredValue, ValueKind};
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

type Namespaces = BTreeMap<String, BTreeMap<String, StoredValue>>;

/// JSON-file store; every mutation rewrites and re-reads the file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    cache: MemoryStore,
}

impl FileStore {
    /// Get the default store file path.
    ///
    /// Returns `~/.wifiweb-esp32/store.json`
    pub fn default_path() -> io::Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
        Ok(PathBuf::from(home).join(".wifiweb-esp32").join("store.json"))
    }

    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let namespaces = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str::<Namespaces>(&contents)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No store file at {:?}, starting empty", path);
                Namespaces::new()
            }
            Err(e) => return Err(e.into()),
        };
        info!("Opened store {:?}", path);
        Ok(Self {
            path,
            cache: MemoryStore::from_namespaces(namespaces),
        })
    }

    /// Open the store at the default path.
    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(Self::default_path()?)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the cache to disk and verify it by reading it back.
    fn flush(&self, namespace: &str, key: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self.cache.namespaces())?;
        fs::write(&self.path, &contents)?;

        let read_back = fs::read_to_string(&self.path)?;
        if read_back != contents {
            return Err(StoreError::VerificationFailed {
                namespace: namespace.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(
        &self,
        namespace: &str,
        key: &str,
        kind: ValueKind,
    ) -> Result<Option<StoredValue>, StoreError> {
        self.cache.get(namespace, key, kind)
    }

    fn set(&mut self, namespace: &str, key: &str, value: &StoredValue) -> Result<(), StoreError> {
        self.cache.set(namespace, key, value)?;
        self.flush(namespace, key)
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StoreError> {
        self.cache.remove(namespace, key)?;
        self.flush(namespace, key)
    }

    fn clear_namespace(&mut self, namespace: &str) -> Result<(), StoreError> {
        self.cache.clear_namespace(namespace)?;
        self.flush(namespace, "*")
    }

    fn contains(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
        self.cache.contains(namespace, key)
    }
}
