//! Configuration portal capability interface.
//!
//! The web portal never touches the controller directly. It sees the device
//! through [`PortalControl`] (reconfigure, reset, read status, scan) or, from
//! another thread, through a [`PortalHandle`] that queues requests for the
//! scheduler to act on at its next tick.
//!
//! # Components
//!
//! - [`PortalControl`] - synchronous capability trait implemented by the device
//! - [`channel`] - request queue and shared status between server and scheduler
//! - [`server`] - JSON status/control endpoint over `tiny_http`

pub mod server;

pub use server::{StatusServer, DEFAULT_STATUS_PORT};

use crate::config::{ConfigError, ConfigUpdate};
use crate::controller::{ApReason, ConnectionState};
use crate::gesture::ResetTier;
use crate::platform::{ConnectionRole, PlatformError};
use crate::power::{WakeCause, WakeupStats};
use crate::store::StoreError;
use serde::Serialize;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};

/// Errors returned to the portal.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    /// The request failed validation.
    Config(ConfigError),
    /// Persisting the change failed; nothing was scheduled.
    Store(StoreError),
    /// The hardware rejected the change.
    Platform(PlatformError),
    /// The scheduler is gone.
    Disconnected,
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid configuration: {}", e),
            Self::Store(e) => write!(f, "store error: {}", e),
            Self::Platform(e) => write!(f, "platform error: {}", e),
            Self::Disconnected => write!(f, "device loop not running"),
        }
    }
}

impl std::error::Error for ControlError {}

impl From<ConfigError> for ControlError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<StoreError> for ControlError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<PlatformError> for ControlError {
    fn from(e: PlatformError) -> Self {
        Self::Platform(e)
    }
}

/// A visible network as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedNetwork {
    pub ssid: String,
    /// Signal in dBm.
    pub signal: i8,
    /// This is the stored network.
    pub stored: bool,
}

/// Read-only snapshot for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub version: String,
    pub role: Option<ConnectionRole>,
    pub state: ConnectionState,
    pub ap_reason: Option<ApReason>,
    pub boot_attempts: u8,
    pub max_attempts: u8,
    pub hostname: String,
    pub ssid: String,
    pub address: Option<String>,
    pub static_address: bool,
    pub time_sync: bool,
    pub sleep_enabled: bool,
    pub wake_interval_us: u64,
    pub wake_logging: bool,
    pub last_wake: WakeCause,
    pub wake_stats: WakeupStats,
    pub reboot_pending: bool,
    pub debug_mode: bool,
}

/// Capabilities the device exposes to the configuration portal.
pub trait PortalControl {
    /// Validate, persist and apply an update.
    ///
    /// Network and addressing changes schedule a restart; time sync and
    /// power changes apply immediately. On error nothing is scheduled.
    fn reconfigure(&mut self, update: ConfigUpdate) -> Result<(), ControlError>;

    /// Clear the given tier and schedule a restart.
    fn reset(&mut self, tier: ResetTier) -> Result<(), ControlError>;

    /// Current status snapshot.
    fn status(&self) -> DeviceStatus;

    /// Scan for networks, strongest first, with the stored one flagged.
    fn scan_networks(&mut self) -> Result<Vec<ScannedNetwork>, ControlError>;
}

/// A request queued for the scheduler.
#[derive(Debug, Clone)]
pub enum PortalRequest {
    Reconfigure(ConfigUpdate),
    Reset(ResetTier),
    Scan,
}

/// State published by the scheduler for the server thread.
#[derive(Debug, Default)]
pub struct PortalShared {
    status: Mutex<Option<DeviceStatus>>,
    networks: Mutex<Vec<ScannedNetwork>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PortalShared {
    pub fn status(&self) -> Option<DeviceStatus> {
        lock(&self.status).clone()
    }

    pub fn networks(&self) -> Vec<ScannedNetwork> {
        lock(&self.networks).clone()
    }

    pub(crate) fn publish_status(&self, status: DeviceStatus) {
        *lock(&self.status) = Some(status);
    }

    pub(crate) fn publish_networks(&self, networks: Vec<ScannedNetwork>) {
        *lock(&self.networks) = networks;
    }
}

/// Portal-side end: queue requests, read published state.
#[derive(Debug, Clone)]
pub struct PortalHandle {
    requests: Sender<PortalRequest>,
    shared: Arc<PortalShared>,
}

impl PortalHandle {
    /// Queue a request for the next tick.
    pub fn submit(&self, request: PortalRequest) -> Result<(), ControlError> {
        self.requests
            .send(request)
            .map_err(|_| ControlError::Disconnected)
    }

    pub fn shared(&self) -> &PortalShared {
        &self.shared
    }
}

/// Scheduler-side end.
#[derive(Debug)]
pub struct PortalLink {
    requests: Receiver<PortalRequest>,
    shared: Arc<PortalShared>,
}

impl PortalLink {
    /// Next queued request, if any.
    pub fn next_request(&self) -> Option<PortalRequest> {
        match self.requests.try_recv() {
            Ok(request) => Some(request),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn shared(&self) -> &PortalShared {
        &self.shared
    }
}

/// Create a connected handle/link pair.
pub fn channel() -> (PortalHandle, PortalLink) {
    let (sender, receiver) = mpsc::channel();
    let shared = Arc::new(PortalShared::default());
    (
        PortalHandle {
            requests: sender,
            shared: shared.clone(),
        },
        PortalLink {
            requests: receiver,
            shared,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_are_queued_in_order() {
        let (handle, link) = channel();
        handle.submit(PortalRequest::Reset(ResetTier::NetworkOnly)).unwrap();
        handle.submit(PortalRequest::Scan).unwrap();

        assert!(matches!(
            link.next_request(),
            Some(PortalRequest::Reset(ResetTier::NetworkOnly))
        ));
        assert!(matches!(link.next_request(), Some(PortalRequest::Scan)));
        assert!(link.next_request().is_none());
    }

    #[test]
    fn test_submit_after_link_dropped() {
        let (handle, link) = channel();
        drop(link);
        assert_eq!(
            handle.submit(PortalRequest::Scan),
            Err(ControlError::Disconnected)
        );
    }

    #[test]
    fn test_published_networks_visible_to_handle() {
        let (handle, link) = channel();
        link.shared().publish_networks(vec![ScannedNetwork {
            ssid: "Home".to_string(),
            signal: -40,
            stored: true,
        }]);
        assert_eq!(handle.shared().networks().len(), 1);
        assert!(handle.shared().status().is_none());
    }
}
