//! In-memory key-value store.

use super::{KeyValueStore, StoreError, StoredValue, ValueKind};
use std::collections::BTreeMap;

/// Namespace map held in memory; contents are lost on drop.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    namespaces: BTreeMap<String, BTreeMap<String, StoredValue>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from existing namespace contents.
    pub fn from_namespaces(namespaces: BTreeMap<String, BTreeMap<String, StoredValue>>) -> Self {
        Self { namespaces }
    }

    /// Borrow all namespaces.
    pub fn namespaces(&self) -> &BTreeMap<String, BTreeMap<String, StoredValue>> {
        &self.namespaces
    }

    /// Number of keys in a namespace.
    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces.get(namespace).map_or(0, BTreeMap::len)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(
        &self,
        namespace: &str,
        key: &str,
        kind: ValueKind,
    ) -> Result<Option<StoredValue>, StoreError> {
        match self.namespaces.get(namespace).and_then(|ns| ns.get(key)) {
            Some(value) if value.kind() == kind => Ok(Some(value.clone())),
            Some(_) => Err(StoreError::TypeMismatch {
                namespace: namespace.to_string(),
                key: key.to_string(),
            }),
            None => Ok(None),
        }
    }

    fn set(&mut self, namespace: &str, key: &str, value: &StoredValue) -> Result<(), StoreError> {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<(), StoreError> {
        if let Some(ns) = self.namespaces.get_mut(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    fn clear_namespace(&mut self, namespace: &str) -> Result<(), StoreError> {
        self.namespaces.remove(namespace);
        Ok(())
    }

    fn contains(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .namespaces
            .get(namespace)
            .is_some_and(|ns| ns.contains_key(key)))
    }
}
