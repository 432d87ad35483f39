//! Station/access-point connection controller.
//!
//! The controller decides at boot whether to spend one attempt from the
//! persisted budget on joining the stored network, and keeps the link healthy
//! afterwards with a periodic check.
//!
//! # Restart as retry
//!
//! A failed boot attempt under the budget is not retried in-process. The
//! controller reports [`ConnectOutcome::Retry`] with `requires_restart` set and
//! the scheduler restarts the device. Each boot is one attempt, so the count
//! survives crashes and power loss.
//!
//! ```text
//!            begin()
//!               |
//!   counter >= MAX ----------------------------> AccessPointMode(AttemptsExhausted)
//!   no network name ---------------------------> AccessPointMode(NoCredentials)
//!   name but no secret ------------------------> AccessPointMode(NoSecret)
//!   increment, attempt
//!      success -------------------------------> ConnectedStation (counter = 0)
//!      failure, counter < MAX ----------------> Retry { requires_restart: true }
//!      failure, counter == MAX ---------------> AccessPointMode(AttemptsExhausted)
//! ```

use crate::config::{DeviceConfig, ProvisioningRecord, MAX_ATTEMPTS};
use crate::platform::{Clock, ConnectionRole, LinkStatus, NetworkPlatform};
use crate::store::{ConfigStore, KeyValueStore};
use crate::tracker::BootAttemptTracker;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::time::Duration;

/// Why the device is hosting the setup network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApReason {
    /// No network name is stored.
    NoCredentials,
    /// A name is stored without a secret. Boot does not join it, but the
    /// health check still tries it.
    NoSecret,
    /// The boot-attempt budget is spent.
    AttemptsExhausted,
    /// The boot counter could not be persisted, so a restart would not count.
    PersistenceFailure,
}

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    /// Before `begin()`.
    Idle,
    /// An attempt failed and a restart is due, or the link dropped.
    AttemptingStation,
    ConnectedStation,
    AccessPointMode(ApReason),
}

impl ConnectionState {
    /// Radio role implied by the state; `None` before `begin()`.
    pub fn role(&self) -> Option<ConnectionRole> {
        match self {
            Self::Idle => None,
            Self::AttemptingStation | Self::ConnectedStation => Some(ConnectionRole::Station),
            Self::AccessPointMode(_) => Some(ConnectionRole::AccessPoint),
        }
    }
}

/// Result of a connection decision, acted on by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Success,
    /// Try again; on a boot attempt this means restarting the device.
    Retry { requires_restart: bool },
    /// Now hosting the setup network.
    Terminal(ApReason),
}

/// Drives the radio between station and access-point roles.
#[derive(Debug)]
pub struct ConnectionController {
    config: DeviceConfig,
    state: ConnectionState,
    tracker: BootAttemptTracker,
    last_health_check: Duration,
}

impl ConnectionController {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Idle,
            tracker: BootAttemptTracker::new(0),
            last_health_check: Duration::ZERO,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> Option<ConnectionRole> {
        self.state.role()
    }

    /// Current boot-attempt count.
    pub fn boot_attempts(&self) -> u8 {
        self.tracker.current_value()
    }

    /// Boot-time entry decision. Runs once.
    pub fn begin<S, N, C>(
        &mut self,
        record: &ProvisioningRecord,
        store: &mut ConfigStore<S>,
        network: &mut N,
        clock: &mut C,
    ) -> ConnectOutcome
    where
        S: KeyValueStore,
        N: NetworkPlatform,
        C: Clock,
    {
        self.tracker = BootAttemptTracker::new(record.boot_attempts);
        self.last_health_check = clock.now();

        if self.tracker.is_exhausted() {
            warn!(
                "{} failed boot attempts, staying in access point mode",
                MAX_ATTEMPTS
            );
            return self.enter_access_point(ApReason::AttemptsExhausted, network);
        }
        if !record.network.has_network_name() {
            info!("No stored credentials");
            return self.enter_access_point(ApReason::NoCredentials, network);
        }
        if !record.network.has_credentials() {
            info!("No secret stored for {:?}", record.network.ssid);
            return self.enter_access_point(ApReason::NoSecret, network);
        }

        let counted = match self.tracker.increment(store) {
            Ok(attempt) => {
                info!("Boot attempt {}/{}", attempt, MAX_ATTEMPTS);
                true
            }
            Err(e) => {
                error!("Failed to persist boot attempt: {}", e);
                false
            }
        };

        if self.attempt_station(record, network, clock) {
            self.mark_connected(store);
            return ConnectOutcome::Success;
        }

        if !counted {
            return self.enter_access_point(ApReason::PersistenceFailure, network);
        }
        if self.tracker.is_exhausted() {
            warn!("Boot-attempt budget spent");
            return self.enter_access_point(ApReason::AttemptsExhausted, network);
        }
        self.state = ConnectionState::AttemptingStation;
        ConnectOutcome::Retry {
            requires_restart: true,
        }
    }

    /// Periodic health check; `None` when the interval has not elapsed or
    /// nothing needed doing.
    pub fn tick<S, N, C>(
        &mut self,
        record: &ProvisioningRecord,
        store: &mut ConfigStore<S>,
        network: &mut N,
        clock: &mut C,
    ) -> Option<ConnectOutcome>
    where
        S: KeyValueStore,
        N: NetworkPlatform,
        C: Clock,
    {
        let now = clock.now();
        if now.saturating_sub(self.last_health_check) < self.config.health_check_interval {
            return None;
        }
        self.last_health_check = now;

        match self.state {
            ConnectionState::ConnectedStation | ConnectionState::AttemptingStation => {
                if network.status() == LinkStatus::Connected {
                    return None;
                }
                if !record.network.has_network_name() {
                    debug!("Link down and no stored network");
                    return None;
                }
                warn!("Station link lost, reconnecting");
                if self.attempt_station(record, network, clock) {
                    info!("Reconnected");
                    self.state = ConnectionState::ConnectedStation;
                    Some(ConnectOutcome::Success)
                } else {
                    self.state = ConnectionState::AttemptingStation;
                    Some(ConnectOutcome::Retry {
                        requires_restart: false,
                    })
                }
            }
            ConnectionState::AccessPointMode(reason) if record.network.has_network_name() => {
                info!("Checking whether {:?} is reachable", record.network.ssid);
                if self.attempt_station(record, network, clock) {
                    info!("Stored network reachable, leaving access point mode");
                    self.mark_connected(store);
                    Some(ConnectOutcome::Success)
                } else {
                    Some(self.enter_access_point(reason, network))
                }
            }
            _ => None,
        }
    }

    /// Join the stored network, blocking for at most the connect timeout.
    ///
    /// An unparsable static address falls back to automatic addressing for
    /// this attempt only. On failure the radio is disconnected.
    pub fn attempt_station<N, C>(
        &mut self,
        record: &ProvisioningRecord,
        network: &mut N,
        clock: &mut C,
    ) -> bool
    where
        N: NetworkPlatform,
        C: Clock,
    {
        if let Err(e) = network.set_role(ConnectionRole::Station) {
            error!("Failed to switch to station role: {}", e);
            return false;
        }

        let address = if record.static_address.enabled {
            match record.static_address.parse() {
                Ok(address) => Some(address),
                Err(e) => {
                    warn!("Ignoring static address ({}), using automatic addressing", e);
                    None
                }
            }
        } else {
            None
        };
        if let Err(e) = network.configure_addressing(address.as_ref()) {
            warn!("Failed to configure addressing: {}", e);
        }

        // Addressing may replace the station interface, so name it afterwards.
        let hostname = record.effective_hostname(&self.config.default_hostname);
        if !hostname.is_empty() {
            if let Err(e) = network.set_hostname(hostname) {
                warn!("Failed to set hostname {:?}: {}", hostname, e);
            }
        }

        info!("Connecting to {:?}", record.network.ssid);
        if let Err(e) = network.connect(&record.network.ssid, &record.network.password) {
            error!("Connect request failed: {}", e);
            self.release(network);
            return false;
        }

        for poll in 0..self.config.connect_polls {
            if network.status() == LinkStatus::Connected {
                break;
            }
            debug!("Waiting for link ({}/{})", poll + 1, self.config.connect_polls);
            clock.delay(self.config.connect_poll_interval);
        }

        if network.status() == LinkStatus::Connected {
            match network.local_address() {
                Some(ip) => info!("Connected to {:?}, address {}", record.network.ssid, ip),
                None => info!("Connected to {:?}", record.network.ssid),
            }
            true
        } else {
            warn!("Connection to {:?} failed", record.network.ssid);
            self.release(network);
            false
        }
    }

    /// Forget the in-memory count after the store was cleared or rewritten.
    pub fn forget_attempts(&mut self) {
        self.tracker.forget();
    }

    /// Return to the state before `begin()`.
    pub fn reset_to_defaults(&mut self) {
        self.state = ConnectionState::Idle;
        self.tracker.forget();
    }

    fn mark_connected<S: KeyValueStore>(&mut self, store: &mut ConfigStore<S>) {
        if let Err(e) = self.tracker.reset(store) {
            error!("Failed to persist boot counter reset: {}", e);
        }
        self.state = ConnectionState::ConnectedStation;
    }

    fn enter_access_point<N: NetworkPlatform>(
        &mut self,
        reason: ApReason,
        network: &mut N,
    ) -> ConnectOutcome {
        self.state = ConnectionState::AccessPointMode(reason);
        let result = network
            .set_role(ConnectionRole::AccessPoint)
            .and_then(|_| network.start_access_point(&self.config.ap_ssid, self.config.ap_address));
        match result {
            Ok(()) => info!(
                "Access point {:?} started at {}",
                self.config.ap_ssid, self.config.ap_address
            ),
            Err(e) => error!("Failed to start access point: {}", e),
        }
        ConnectOutcome::Terminal(reason)
    }

    fn release<N: NetworkPlatform>(&self, network: &mut N) {
        if let Err(e) = network.disconnect() {
            warn!("Disconnect failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NetworkIdentity, StaticAddress};
    use crate::platform::mock::{FlakyStore, MockClock, MockNetwork, NetworkCall};
    use crate::store::MemoryStore;

    fn record(ssid: &str, password: &str, attempts: u8) -> ProvisioningRecord {
        ProvisioningRecord {
            network: NetworkIdentity::new(ssid, password).unwrap(),
            boot_attempts: attempts,
            ..Default::default()
        }
    }

    fn setup() -> (ConnectionController, ConfigStore<MemoryStore>, MockNetwork, MockClock) {
        (
            ConnectionController::new(DeviceConfig::with_hostname("esp32-node")),
            ConfigStore::new(MemoryStore::new()),
            MockNetwork::new().with_network("Home", "pass"),
            MockClock::new(),
        )
    }

    // ==================== Entry Decision Tests ====================

    #[test]
    fn test_begin_success_resets_counter() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let record = record("Home", "pass", 0);

        let outcome = controller.begin(&record, &mut store, &mut network, &mut clock);

        assert_eq!(outcome, ConnectOutcome::Success);
        assert_eq!(controller.state(), ConnectionState::ConnectedStation);
        assert_eq!(controller.role(), Some(ConnectionRole::Station));
        assert_eq!(controller.boot_attempts(), 0);
        assert_eq!(store.load().unwrap().boot_attempts, 0);
    }

    #[test]
    fn test_begin_success_at_any_counter() {
        for attempts in 0..MAX_ATTEMPTS {
            let (mut controller, mut store, mut network, mut clock) = setup();
            let record = record("Home", "pass", attempts);
            store.save_boot_attempts(attempts).unwrap();

            let outcome = controller.begin(&record, &mut store, &mut network, &mut clock);

            assert_eq!(outcome, ConnectOutcome::Success);
            assert_eq!(store.load().unwrap().boot_attempts, 0);
        }
    }

    #[test]
    fn test_failure_under_budget_requests_restart() {
        for attempts in 0..MAX_ATTEMPTS - 1 {
            let (mut controller, mut store, mut network, mut clock) = setup();
            let record = record("Home", "bad", attempts);

            let outcome = controller.begin(&record, &mut store, &mut network, &mut clock);

            assert_eq!(
                outcome,
                ConnectOutcome::Retry {
                    requires_restart: true
                }
            );
            assert_eq!(store.load().unwrap().boot_attempts, attempts + 1);
            assert_eq!(network.calls.last(), Some(&NetworkCall::Disconnect));
        }
    }

    #[test]
    fn test_last_attempt_failure_enters_ap_without_restart() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let record = record("Home", "bad", 2);

        let outcome = controller.begin(&record, &mut store, &mut network, &mut clock);

        assert_eq!(outcome, ConnectOutcome::Terminal(ApReason::AttemptsExhausted));
        assert_eq!(store.load().unwrap().boot_attempts, MAX_ATTEMPTS);
        assert_eq!(controller.role(), Some(ConnectionRole::AccessPoint));
    }

    #[test]
    fn test_exhausted_budget_skips_attempt() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let record = record("Home", "pass", MAX_ATTEMPTS);

        let outcome = controller.begin(&record, &mut store, &mut network, &mut clock);

        assert_eq!(outcome, ConnectOutcome::Terminal(ApReason::AttemptsExhausted));
        assert_eq!(network.connect_count(), 0);
        assert!(network.calls.contains(&NetworkCall::StartAccessPoint(
            "ESP32_SETUP".to_string(),
            std::net::Ipv4Addr::new(192, 168, 4, 1)
        )));
    }

    #[test]
    fn test_no_credentials_enters_ap() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let record = ProvisioningRecord::default();

        assert_eq!(
            controller.begin(&record, &mut store, &mut network, &mut clock),
            ConnectOutcome::Terminal(ApReason::NoCredentials)
        );
        assert_eq!(network.connect_count(), 0);
    }

    #[test]
    fn test_open_network_reports_no_secret() {
        let (mut controller, mut store, _, mut clock) = setup();
        let mut network = MockNetwork::new().with_network("Cafe", "");
        let record = record("Cafe", "", 0);

        assert_eq!(
            controller.begin(&record, &mut store, &mut network, &mut clock),
            ConnectOutcome::Terminal(ApReason::NoSecret)
        );
        assert_eq!(network.connect_count(), 0);

        clock.advance(Duration::from_secs(30));
        let outcome = controller.tick(&record, &mut store, &mut network, &mut clock);

        assert_eq!(outcome, Some(ConnectOutcome::Success));
        assert_eq!(network.connect_count(), 1);
    }

    #[test]
    fn test_unpersisted_counter_never_restarts() {
        let mut controller = ConnectionController::new(DeviceConfig::default());
        let mut store = ConfigStore::new(FlakyStore {
            fail_writes: true,
            ..Default::default()
        });
        let mut network = MockNetwork::new();
        let mut clock = MockClock::new();
        let record = record("Home", "bad", 0);

        let outcome = controller.begin(&record, &mut store, &mut network, &mut clock);

        assert_eq!(outcome, ConnectOutcome::Terminal(ApReason::PersistenceFailure));
    }

    #[test]
    fn test_attempt_blocks_for_timeout() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let record = record("Home", "bad", 0);

        controller.begin(&record, &mut store, &mut network, &mut clock);

        assert_eq!(clock.now(), Duration::from_millis(5000));
    }

    #[test]
    fn test_slow_link_within_timeout_succeeds() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        network.polls_to_connect = 6;
        let record = record("Home", "pass", 0);

        assert_eq!(
            controller.begin(&record, &mut store, &mut network, &mut clock),
            ConnectOutcome::Success
        );
        assert!(clock.now() < Duration::from_millis(5000));
    }

    // ==================== Attempt Procedure Tests ====================

    #[test]
    fn test_invalid_static_address_falls_back() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let mut record = record("Home", "pass", 0);
        record.static_address = StaticAddress {
            enabled: true,
            ip: "not-an-ip".to_string(),
            gateway: "192.168.1.1".to_string(),
            subnet: "255.255.255.0".to_string(),
            dns: "192.168.1.1".to_string(),
        };

        store.save(&record).unwrap();

        let outcome = controller.begin(&record, &mut store, &mut network, &mut clock);

        assert_eq!(outcome, ConnectOutcome::Success);
        assert_eq!(network.last_addressing(), Some(&None));
        let stored = store.load().unwrap();
        assert!(stored.static_address.enabled);
        assert_eq!(stored.static_address.ip, "not-an-ip");
    }

    #[test]
    fn test_valid_static_address_applied() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let mut record = record("Home", "pass", 0);
        record.static_address = StaticAddress {
            enabled: true,
            ip: "192.168.1.50".to_string(),
            gateway: "192.168.1.1".to_string(),
            subnet: "255.255.255.0".to_string(),
            dns: "192.168.1.1".to_string(),
        };

        controller.begin(&record, &mut store, &mut network, &mut clock);

        let applied = network.last_addressing().and_then(|a| a.as_ref()).unwrap();
        assert_eq!(applied.ip, std::net::Ipv4Addr::new(192, 168, 1, 50));
        assert_eq!(applied.prefix_len(), 24);
    }

    #[test]
    fn test_hostname_falls_back_to_default() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let mut record = record("Home", "pass", 0);

        controller.begin(&record, &mut store, &mut network, &mut clock);
        assert!(network
            .calls
            .contains(&NetworkCall::SetHostname("esp32-node".to_string())));

        record.hostname = "garden".to_string();
        controller.attempt_station(&record, &mut network, &mut clock);
        assert!(network
            .calls
            .contains(&NetworkCall::SetHostname("garden".to_string())));
    }

    #[test]
    fn test_hostname_set_after_addressing() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let mut record = record("Home", "pass", 0);
        record.hostname = "garden".to_string();
        record.static_address = StaticAddress {
            enabled: true,
            ip: "192.168.1.50".to_string(),
            gateway: "192.168.1.1".to_string(),
            subnet: "255.255.255.0".to_string(),
            dns: "192.168.1.1".to_string(),
        };

        controller.begin(&record, &mut store, &mut network, &mut clock);

        let calls = &network.calls;
        let addressing = calls
            .iter()
            .position(|c| matches!(c, NetworkCall::Addressing(_)))
            .unwrap();
        let hostname = calls
            .iter()
            .position(|c| matches!(c, NetworkCall::SetHostname(_)))
            .unwrap();
        let connect = calls
            .iter()
            .position(|c| matches!(c, NetworkCall::Connect(_)))
            .unwrap();
        assert!(addressing < hostname);
        assert!(hostname < connect);
    }

    // ==================== Health Check Tests ====================

    #[test]
    fn test_health_check_waits_for_interval() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let record = record("Home", "pass", 0);
        controller.begin(&record, &mut store, &mut network, &mut clock);
        network.drop_link();

        clock.advance(Duration::from_secs(29));
        assert_eq!(controller.tick(&record, &mut store, &mut network, &mut clock), None);

        clock.advance(Duration::from_secs(1));
        assert_eq!(
            controller.tick(&record, &mut store, &mut network, &mut clock),
            Some(ConnectOutcome::Success)
        );
    }

    #[test]
    fn test_health_check_reconnect_failure_is_silent() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let record = record("Home", "pass", 0);
        controller.begin(&record, &mut store, &mut network, &mut clock);
        network.drop_link();
        network.joinable.clear();

        clock.advance(Duration::from_secs(30));
        assert_eq!(
            controller.tick(&record, &mut store, &mut network, &mut clock),
            Some(ConnectOutcome::Retry {
                requires_restart: false
            })
        );
        assert_eq!(controller.role(), Some(ConnectionRole::Station));
        assert_eq!(store.load().unwrap().boot_attempts, 0);
    }

    #[test]
    fn test_connected_station_needs_nothing() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let record = record("Home", "pass", 0);
        controller.begin(&record, &mut store, &mut network, &mut clock);

        clock.advance(Duration::from_secs(30));
        assert_eq!(controller.tick(&record, &mut store, &mut network, &mut clock), None);
        assert_eq!(network.connect_count(), 1);
    }

    #[test]
    fn test_ap_reachable_network_returns_to_station() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let record = record("Home", "pass", MAX_ATTEMPTS);
        store.save_boot_attempts(MAX_ATTEMPTS).unwrap();
        controller.begin(&record, &mut store, &mut network, &mut clock);
        assert_eq!(controller.role(), Some(ConnectionRole::AccessPoint));

        clock.advance(Duration::from_secs(30));
        let outcome = controller.tick(&record, &mut store, &mut network, &mut clock);

        assert_eq!(outcome, Some(ConnectOutcome::Success));
        assert_eq!(controller.state(), ConnectionState::ConnectedStation);
        assert_eq!(controller.boot_attempts(), 0);
        assert_eq!(store.load().unwrap().boot_attempts, 0);
    }

    #[test]
    fn test_ap_unreachable_network_restores_ap() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let record = record("Home", "bad", MAX_ATTEMPTS);
        controller.begin(&record, &mut store, &mut network, &mut clock);

        clock.advance(Duration::from_secs(30));
        let outcome = controller.tick(&record, &mut store, &mut network, &mut clock);

        assert_eq!(
            outcome,
            Some(ConnectOutcome::Terminal(ApReason::AttemptsExhausted))
        );
        assert_eq!(controller.role(), Some(ConnectionRole::AccessPoint));
        assert_eq!(network.role, Some(ConnectionRole::AccessPoint));
    }

    #[test]
    fn test_ap_without_network_name_stays_idle() {
        let (mut controller, mut store, mut network, mut clock) = setup();
        let record = ProvisioningRecord::default();
        controller.begin(&record, &mut store, &mut network, &mut clock);

        clock.advance(Duration::from_secs(30));
        assert_eq!(controller.tick(&record, &mut store, &mut network, &mut clock), None);
        assert_eq!(network.connect_count(), 0);
    }
}
