//! Host (development) platform.
//!
//! Runs the device logic on a workstation: settings live in a JSON file, the
//! radio is simulated, and light sleep is a thread sleep.
//!
//! Reachable networks are read from `WIFIWEB_REACHABLE`, a comma-separated
//! list of `ssid:password` pairs:
//!
//! ```bash
//! WIFIWEB_REACHABLE="Home:hunter22,Cafe:" cargo run --bin host-device
//! ```

use super::{
    Board, ConnectionRole, DigitalInput, LinkStatus, NetworkPlatform, Peripherals, PowerPlatform,
    Result, StdClock, SystemControl, VisibleNetwork, WakeSource, WakeTrigger,
};
use crate::config::{Secret, StaticIpv4};
use crate::store::{FileStore, StoreError};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Environment variable listing the simulated networks.
pub const REACHABLE_ENV: &str = "WIFIWEB_REACHABLE";

/// Exit code used in place of a restart, so a wrapper can relaunch.
pub const RESTART_EXIT_CODE: i32 = 3;

/// Simulated radio.
#[derive(Debug, Default)]
pub struct HostNetwork {
    reachable: BTreeMap<String, String>,
    role: Option<ConnectionRole>,
    status: LinkStatus,
    static_address: Option<StaticIpv4>,
    ap_address: Option<Ipv4Addr>,
}

impl HostNetwork {
    /// Radio that can join the given `ssid` / password pairs.
    pub fn new(reachable: BTreeMap<String, String>) -> Self {
        Self {
            reachable,
            ..Default::default()
        }
    }

    /// Radio configured from [`REACHABLE_ENV`].
    pub fn from_env() -> Self {
        let spec = std::env::var(REACHABLE_ENV).unwrap_or_default();
        Self::new(parse_reachable(&spec))
    }
}

/// Parse `ssid:password,ssid:password`. Entries without a colon are open networks.
pub fn parse_reachable(spec: &str) -> BTreeMap<String, String> {
    spec.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(':') {
            Some((ssid, password)) => (ssid.to_string(), password.to_string()),
            None => (entry.to_string(), String::new()),
        })
        .collect()
}

impl NetworkPlatform for HostNetwork {
    fn set_role(&mut self, role: ConnectionRole) -> Result<()> {
        debug!("[sim] role {:?}", role);
        self.role = Some(role);
        self.ap_address = None;
        self.status = LinkStatus::Disconnected;
        Ok(())
    }

    fn set_hostname(&mut self, hostname: &str) -> Result<()> {
        debug!("[sim] hostname {}", hostname);
        Ok(())
    }

    fn configure_addressing(&mut self, address: Option<&StaticIpv4>) -> Result<()> {
        self.static_address = address.cloned();
        Ok(())
    }

    fn connect(&mut self, ssid: &str, password: &Secret) -> Result<()> {
        let accepted = self
            .reachable
            .get(ssid)
            .is_some_and(|expected| expected == password.expose());
        self.status = if accepted {
            LinkStatus::Connected
        } else {
            LinkStatus::Connecting
        };
        debug!("[sim] join {:?}: {:?}", ssid, self.status);
        Ok(())
    }

    fn status(&self) -> LinkStatus {
        self.status
    }

    fn disconnect(&mut self) -> Result<()> {
        self.status = LinkStatus::Disconnected;
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str, address: Ipv4Addr) -> Result<()> {
        info!("[sim] access point {:?} at {}", ssid, address);
        self.role = Some(ConnectionRole::AccessPoint);
        self.ap_address = Some(address);
        Ok(())
    }

    fn scan_visible_networks(&mut self) -> Result<Vec<VisibleNetwork>> {
        Ok(self
            .reachable
            .keys()
            .enumerate()
            .map(|(i, ssid)| VisibleNetwork {
                ssid: ssid.clone(),
                signal: -40 - (i as i8).saturating_mul(7),
            })
            .collect())
    }

    fn start_time_sync(&mut self, server: &str) -> Result<()> {
        info!("[sim] time sync with {} (host clock used)", server);
        Ok(())
    }

    fn local_address(&self) -> Option<Ipv4Addr> {
        match self.role {
            Some(ConnectionRole::AccessPoint) => self.ap_address,
            Some(ConnectionRole::Station) if self.status == LinkStatus::Connected => Some(
                self.static_address
                    .as_ref()
                    .map_or(Ipv4Addr::LOCALHOST, |address| address.ip),
            ),
            _ => None,
        }
    }
}

/// Light sleep as a thread sleep; always wakes by timer.
#[derive(Debug, Default)]
pub struct HostPower {
    interval: Option<Duration>,
    woke: bool,
}

impl PowerPlatform for HostPower {
    fn enable_timer_wake(&mut self, interval_us: u64) -> Result<()> {
        self.interval = Some(Duration::from_micros(interval_us));
        Ok(())
    }

    fn disable_gpio_wake_class(&mut self) -> Result<()> {
        Ok(())
    }

    fn enable_gpio_wake_class(&mut self) -> Result<()> {
        Ok(())
    }

    fn enable_gpio_wake(&mut self, pin: u8, trigger: WakeTrigger) -> Result<()> {
        debug!("[sim] GPIO{} wake on {:?} (never fires)", pin, trigger);
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        if let Some(interval) = self.interval {
            thread::sleep(interval);
        }
        self.woke = true;
        Ok(())
    }

    fn last_wake_cause(&self) -> WakeSource {
        if self.woke {
            WakeSource::Timer
        } else {
            WakeSource::Undefined
        }
    }

    fn last_wake_gpio_pin(&self) -> Option<u8> {
        None
    }
}

/// Reset button that is never pressed.
#[derive(Debug, Default)]
pub struct IdleButton;

impl DigitalInput for IdleButton {
    fn is_low(&mut self) -> bool {
        false
    }
}

/// Restart by exiting with [`RESTART_EXIT_CODE`].
#[derive(Debug, Default)]
pub struct HostSystem;

impl SystemControl for HostSystem {
    fn restart(&mut self) {
        warn!("Restart requested, exiting with code {}", RESTART_EXIT_CODE);
        std::process::exit(RESTART_EXIT_CODE);
    }
}

/// The host board.
pub struct HostBoard;

impl Board for HostBoard {
    type Store = FileStore;
    type Network = HostNetwork;
    type Power = HostPower;
    type Button = IdleButton;
    type Clock = StdClock;
    type System = HostSystem;
}

impl HostBoard {
    /// Peripherals backed by the store at `path` (default path when `None`).
    pub fn peripherals(path: Option<&Path>) -> std::result::Result<Peripherals<HostBoard>, StoreError> {
        let store = match path {
            Some(path) => FileStore::open(path)?,
            None => FileStore::open_default()?,
        };
        info!("Settings file: {}", store.path().display());
        Ok(Peripherals {
            store,
            network: HostNetwork::from_env(),
            power: HostPower::default(),
            button: IdleButton,
            clock: StdClock::default(),
            system: HostSystem,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reachable() {
        let networks = parse_reachable(" Home:hunter22 ,Cafe, Lab:a:b,");
        assert_eq!(networks.len(), 3);
        assert_eq!(networks["Home"], "hunter22");
        assert_eq!(networks["Cafe"], "");
        assert_eq!(networks["Lab"], "a:b");
    }

    #[test]
    fn test_join_requires_matching_password() {
        let mut network = HostNetwork::new(parse_reachable("Home:pw"));
        network.set_role(ConnectionRole::Station).unwrap();

        network.connect("Home", &Secret::new("nope")).unwrap();
        assert_eq!(network.status(), LinkStatus::Connecting);
        assert_eq!(network.local_address(), None);

        network.connect("Home", &Secret::new("pw")).unwrap();
        assert_eq!(network.status(), LinkStatus::Connected);
        assert_eq!(network.local_address(), Some(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_access_point_address() {
        let mut network = HostNetwork::default();
        network.set_role(ConnectionRole::AccessPoint).unwrap();
        network
            .start_access_point("ESP32_SETUP", Ipv4Addr::new(192, 168, 4, 1))
            .unwrap();
        assert_eq!(network.local_address(), Some(Ipv4Addr::new(192, 168, 4, 1)));
    }

    #[test]
    fn test_scan_lists_reachable_networks() {
        let mut network = HostNetwork::new(parse_reachable("A:1,B:2"));
        let visible = network.scan_visible_networks().unwrap();
        assert_eq!(visible.len(), 2);
        assert!(visible[0].signal > visible[1].signal);
    }

    #[test]
    fn test_suspend_reports_timer() {
        let mut power = HostPower::default();
        assert_eq!(power.last_wake_cause(), WakeSource::Undefined);
        power.enable_timer_wake(1).unwrap();
        power.suspend().unwrap();
        assert_eq!(power.last_wake_cause(), WakeSource::Timer);
    }
}
