//! Persisted bound on consecutive failed boot-time connection attempts.
//!
//! The counter is the one piece of state written outside an explicit save:
//! every change goes straight to the store before the call returns, so the
//! count survives restarts, crashes and power loss.
//!
//! # Example
//!
//! ```
//! use wifiweb_esp32::store::{ConfigStore, MemoryStore};
//! use wifiweb_esp32::tracker::BootAttemptTracker;
//!
//! let mut store = ConfigStore::new(MemoryStore::new());
//! let mut tracker = BootAttemptTracker::new(0);
//! tracker.increment(&mut store).unwrap();
//! assert_eq!(tracker.current_value(), 1);
//! assert_eq!(store.load().unwrap().boot_attempts, 1);
//! ```

use crate::config::MAX_ATTEMPTS;
use crate::store::{ConfigStore, KeyValueStore, StoreError};
use log::debug;

/// In-memory mirror of the persisted boot counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootAttemptTracker {
    value: u8,
}

impl BootAttemptTracker {
    /// Start from a loaded value, clamped to `[0, MAX_ATTEMPTS]`.
    pub fn new(value: u8) -> Self {
        Self {
            value: value.min(MAX_ATTEMPTS),
        }
    }

    /// Current count.
    pub fn current_value(&self) -> u8 {
        self.value
    }

    /// The budget is spent.
    pub fn is_exhausted(&self) -> bool {
        self.value >= MAX_ATTEMPTS
    }

    /// Count one attempt, saturating at [`MAX_ATTEMPTS`], and persist it.
    ///
    /// On a store error the in-memory value is left unchanged.
    pub fn increment<S: KeyValueStore>(
        &mut self,
        store: &mut ConfigStore<S>,
    ) -> Result<u8, StoreError> {
        let next = self.value.saturating_add(1).min(MAX_ATTEMPTS);
        store.save_boot_attempts(next)?;
        self.value = next;
        debug!("Boot attempt {}/{}", self.value, MAX_ATTEMPTS);
        Ok(self.value)
    }

    /// Zero the counter and persist it.
    ///
    /// The in-memory value is zeroed even if the write fails.
    pub fn reset<S: KeyValueStore>(&mut self, store: &mut ConfigStore<S>) -> Result<(), StoreError> {
        self.value = 0;
        store.save_boot_attempts(0)
    }

    /// Zero the in-memory value only, for when the store was cleared underneath.
    pub fn forget(&mut self) {
        self.value = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::FlakyStore;
    use crate::store::MemoryStore;

    #[test]
    fn test_increment_persists() {
        let mut store = ConfigStore::new(MemoryStore::new());
        let mut tracker = BootAttemptTracker::new(0);

        assert_eq!(tracker.increment(&mut store).unwrap(), 1);
        assert_eq!(tracker.increment(&mut store).unwrap(), 2);
        assert_eq!(store.load().unwrap().boot_attempts, 2);
    }

    #[test]
    fn test_increment_saturates() {
        let mut store = ConfigStore::new(MemoryStore::new());
        let mut tracker = BootAttemptTracker::new(MAX_ATTEMPTS);

        assert_eq!(tracker.increment(&mut store).unwrap(), MAX_ATTEMPTS);
        assert!(tracker.is_exhausted());
        assert_eq!(store.load().unwrap().boot_attempts, MAX_ATTEMPTS);
    }

    #[test]
    fn test_new_clamps() {
        assert_eq!(BootAttemptTracker::new(200).current_value(), MAX_ATTEMPTS);
    }

    #[test]
    fn test_reset_persists() {
        let mut store = ConfigStore::new(MemoryStore::new());
        let mut tracker = BootAttemptTracker::new(0);
        tracker.increment(&mut store).unwrap();

        tracker.reset(&mut store).unwrap();

        assert_eq!(tracker.current_value(), 0);
        assert_eq!(store.load().unwrap().boot_attempts, 0);
    }

    #[test]
    fn test_failed_increment_keeps_value() {
        let mut store = ConfigStore::new(FlakyStore {
            fail_writes: true,
            ..Default::default()
        });
        let mut tracker = BootAttemptTracker::new(1);

        assert!(tracker.increment(&mut store).is_err());
        assert_eq!(tracker.current_value(), 1);
    }

    #[test]
    fn test_failed_reset_still_zeroes_mirror() {
        let mut store = ConfigStore::new(FlakyStore {
            fail_writes: true,
            ..Default::default()
        });
        let mut tracker = BootAttemptTracker::new(2);

        assert!(tracker.reset(&mut store).is_err());
        assert_eq!(tracker.current_value(), 0);
    }
}
