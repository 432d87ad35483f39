//! WiFi provisioning and power firmware library for ESP32.
//!
//! Joins a stored network with a bounded number of boot attempts, falls back
//! to hosting a setup network, recovers dropped links, clears settings on a
//! long button press, and manages light sleep with timer and GPIO wake
//! sources.
//!
//! Everything except `platform::esp32` is platform-independent and can be
//! tested on the host machine.
//!
//! # Modules
//!
//! - [`config`] - provisioning record, portal updates, device constants
//! - [`store`] - namespaced key-value persistence (NVS, JSON file, memory)
//! - [`tracker`] - persisted boot-attempt counter
//! - [`controller`] - station/access-point state machine
//! - [`gesture`] - reset button hold recognizer
//! - [`power`] - light sleep and wake classification
//! - [`portal`] - control interface and HTTP status endpoint
//! - [`platform`] - hardware traits and board implementations
//! - [`device`] - the scheduler tying it together

pub mod config;
pub mod controller;
pub mod device;
pub mod gesture;
pub mod platform;
pub mod portal;
pub mod power;
pub mod store;
pub mod tracker;

// Re-export commonly used items
pub use config::{ConfigError, ConfigUpdate, DeviceConfig, ProvisioningRecord};
pub use controller::{ApReason, ConnectOutcome, ConnectionController, ConnectionState};
pub use device::Device;
pub use gesture::{ResetGestureRecognizer, ResetTier};
pub use platform::{Board, ConnectionRole, Peripherals, PlatformError, WakeTrigger};
pub use portal::{ControlError, DeviceStatus, PortalControl, StatusServer, DEFAULT_STATUS_PORT};
pub use power::{PowerManager, WakeCause, WakeupStats};
pub use store::{ConfigStore, KeyValueStore, StoreError};
pub use tracker::BootAttemptTracker;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name and version, as reported in the status snapshot.
pub fn version_string() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), VERSION)
}
