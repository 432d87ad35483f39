//! Scripted and recording platform doubles for unit tests.

use super::{
    Board, Clock, ConnectionRole, DigitalInput, LinkStatus, NetworkPlatform, Peripherals,
    PlatformError, PowerPlatform, Result, SystemControl, VisibleNetwork, WakeSource, WakeTrigger,
};
use crate::config::{Secret, StaticIpv4};
use crate::store::{KeyValueStore, MemoryStore, StoreError, StoredValue, ValueKind};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Manually advanced clock; `delay` advances it.
#[derive(Debug, Default)]
pub struct MockClock {
    now: Duration,
}

impl MockClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }
}

impl Clock for MockClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn delay(&mut self, duration: Duration) {
        self.now += duration;
    }
}

/// A call made on [`MockNetwork`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkCall {
    SetRole(ConnectionRole),
    SetHostname(String),
    Addressing(Option<StaticIpv4>),
    Connect(String),
    Disconnect,
    StartAccessPoint(String, Ipv4Addr),
    Scan,
    TimeSync(String),
}

/// Radio that joins networks from a fixed table of name and secret.
#[derive(Debug, Default)]
pub struct MockNetwork {
    /// Joinable networks and the secret each accepts.
    pub joinable: BTreeMap<String, String>,
    /// Status polls spent in `Connecting` before the link comes up.
    pub polls_to_connect: u32,
    /// Scan results.
    pub visible: Vec<VisibleNetwork>,
    pub calls: Vec<NetworkCall>,
    pub role: Option<ConnectionRole>,
    link: Cell<LinkStatus>,
    pending_polls: Cell<u32>,
    joining: bool,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `ssid` joinable with `password`.
    pub fn with_network(mut self, ssid: &str, password: &str) -> Self {
        self.joinable.insert(ssid.to_string(), password.to_string());
        self
    }

    /// Simulate the link dropping.
    pub fn drop_link(&mut self) {
        self.link.set(LinkStatus::Disconnected);
        self.joining = false;
    }

    pub fn connect_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, NetworkCall::Connect(_)))
            .count()
    }

    pub fn last_addressing(&self) -> Option<&Option<StaticIpv4>> {
        self.calls.iter().rev().find_map(|c| match c {
            NetworkCall::Addressing(a) => Some(a),
            _ => None,
        })
    }
}

impl NetworkPlatform for MockNetwork {
    fn set_role(&mut self, role: ConnectionRole) -> Result<()> {
        self.calls.push(NetworkCall::SetRole(role));
        self.role = Some(role);
        Ok(())
    }

    fn set_hostname(&mut self, hostname: &str) -> Result<()> {
        self.calls.push(NetworkCall::SetHostname(hostname.to_string()));
        Ok(())
    }

    fn configure_addressing(&mut self, address: Option<&StaticIpv4>) -> Result<()> {
        self.calls.push(NetworkCall::Addressing(address.cloned()));
        Ok(())
    }

    fn connect(&mut self, ssid: &str, password: &Secret) -> Result<()> {
        self.calls.push(NetworkCall::Connect(ssid.to_string()));
        self.joining = self
            .joinable
            .get(ssid)
            .is_some_and(|accepted| accepted == password.expose());
        self.pending_polls.set(self.polls_to_connect);
        self.link.set(LinkStatus::Connecting);
        Ok(())
    }

    fn status(&self) -> LinkStatus {
        if self.link.get() != LinkStatus::Connecting {
            return self.link.get();
        }
        if !self.joining {
            return LinkStatus::Connecting;
        }
        match self.pending_polls.get() {
            0 => {
                self.link.set(LinkStatus::Connected);
                LinkStatus::Connected
            }
            n => {
                self.pending_polls.set(n - 1);
                LinkStatus::Connecting
            }
        }
    }

    fn disconnect(&mut self) -> Result<()> {
        self.calls.push(NetworkCall::Disconnect);
        self.drop_link();
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str, address: Ipv4Addr) -> Result<()> {
        self.calls
            .push(NetworkCall::StartAccessPoint(ssid.to_string(), address));
        Ok(())
    }

    fn scan_visible_networks(&mut self) -> Result<Vec<VisibleNetwork>> {
        self.calls.push(NetworkCall::Scan);
        Ok(self.visible.clone())
    }

    fn start_time_sync(&mut self, server: &str) -> Result<()> {
        self.calls.push(NetworkCall::TimeSync(server.to_string()));
        Ok(())
    }

    fn local_address(&self) -> Option<Ipv4Addr> {
        (self.link.get() == LinkStatus::Connected).then_some(Ipv4Addr::new(192, 168, 1, 77))
    }
}

/// Button whose level is set by the test.
#[derive(Debug, Default)]
pub struct MockButton {
    pub pressed: bool,
}

impl DigitalInput for MockButton {
    fn is_low(&mut self) -> bool {
        self.pressed
    }
}

/// Power platform that records the registered wake sources.
#[derive(Debug, Default)]
pub struct MockPower {
    pub timer_us: Option<u64>,
    pub gpio_class_enabled: bool,
    pub registered: BTreeMap<u8, WakeTrigger>,
    /// Pins that reject wake registration.
    pub unsupported: Vec<u8>,
    /// Pins that pass the support check but fail registration.
    pub rejected: Vec<u8>,
    pub suspends: u32,
    /// Cause reported after the next suspend.
    pub next_wake: Option<(WakeSource, Option<u8>)>,
    cause: Option<(WakeSource, Option<u8>)>,
}

impl MockPower {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PowerPlatform for MockPower {
    fn enable_timer_wake(&mut self, interval_us: u64) -> Result<()> {
        self.timer_us = Some(interval_us);
        Ok(())
    }

    fn disable_gpio_wake_class(&mut self) -> Result<()> {
        self.gpio_class_enabled = false;
        self.registered.clear();
        Ok(())
    }

    fn enable_gpio_wake_class(&mut self) -> Result<()> {
        self.gpio_class_enabled = true;
        Ok(())
    }

    fn enable_gpio_wake(&mut self, pin: u8, trigger: WakeTrigger) -> Result<()> {
        if self.unsupported.contains(&pin) {
            return Err(PlatformError::UnsupportedTrigger { pin, trigger });
        }
        if self.rejected.contains(&pin) {
            return Err(PlatformError::Gpio {
                pin,
                reason: "wake registration failed".to_string(),
            });
        }
        self.registered.insert(pin, trigger);
        Ok(())
    }

    fn supports_gpio_wake(&self, pin: u8, _trigger: WakeTrigger) -> bool {
        !self.unsupported.contains(&pin)
    }

    fn suspend(&mut self) -> Result<()> {
        self.suspends += 1;
        self.cause = Some(self.next_wake.unwrap_or((WakeSource::Timer, None)));
        Ok(())
    }

    fn last_wake_cause(&self) -> WakeSource {
        self.cause.map_or(WakeSource::Undefined, |(source, _)| source)
    }

    fn last_wake_gpio_pin(&self) -> Option<u8> {
        self.cause.and_then(|(_, pin)| pin)
    }
}

/// Counts restarts instead of performing them.
#[derive(Debug, Default)]
pub struct MockSystem {
    pub restarts: u32,
}

impl SystemControl for MockSystem {
    fn restart(&mut self) {
        self.restarts += 1;
    }
}

/// In-memory store whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_writes: bool,
}

impl FlakyStore {
    fn check(&self) -> core::result::Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Backend("flash write failed".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for FlakyStore {
    fn get(
        &self,
        namespace: &str,
        key: &str,
        kind: ValueKind,
    ) -> core::result::Result<Option<StoredValue>, StoreError> {
        self.inner.get(namespace, key, kind)
    }

    fn set(
        &mut self,
        namespace: &str,
        key: &str,
        value: &StoredValue,
    ) -> core::result::Result<(), StoreError> {
        self.check()?;
        self.inner.set(namespace, key, value)
    }

    fn remove(&mut self, namespace: &str, key: &str) -> core::result::Result<(), StoreError> {
        self.check()?;
        self.inner.remove(namespace, key)
    }

    fn clear_namespace(&mut self, namespace: &str) -> core::result::Result<(), StoreError> {
        self.check()?;
        self.inner.clear_namespace(namespace)
    }

    fn contains(&self, namespace: &str, key: &str) -> core::result::Result<bool, StoreError> {
        self.inner.contains(namespace, key)
    }
}

/// Board built from the doubles above.
pub struct MockBoard;

impl Board for MockBoard {
    type Store = FlakyStore;
    type Network = MockNetwork;
    type Power = MockPower;
    type Button = MockButton;
    type Clock = MockClock;
    type System = MockSystem;
}

impl MockBoard {
    /// Peripherals with one joinable network, `Home` / `pass`.
    pub fn peripherals() -> Peripherals<MockBoard> {
        Peripherals {
            store: FlakyStore::default(),
            network: MockNetwork::new().with_network("Home", "pass"),
            power: MockPower::new(),
            button: MockButton::default(),
            clock: MockClock::new(),
            system: MockSystem::default(),
        }
    }
}
