//! Device scheduler.
//!
//! [`Device`] owns the provisioning record and every component, and runs them
//! from a single cooperative loop:
//!
//! 1. a pending reboot is carried out first (after a short delay)
//! 2. the reset button is polled
//! 3. queued portal requests are applied
//! 4. the connection health check runs (every 30 s)
//! 5. if light sleep is enabled, the device suspends; the wake cause is
//!    classified immediately on resume
//! 6. the status snapshot is published
//!
//! All blocking (connection attempts, sleep, restart delays) happens on the
//! loop thread; nothing is cancellable mid-wait.

use crate::config::{ConfigUpdate, DeviceConfig, ProvisioningRecord, MAX_ATTEMPTS};
use crate::controller::{ConnectOutcome, ConnectionController, ConnectionState};
use crate::gesture::{ResetGestureRecognizer, ResetTier};
use crate::platform::{
    Board, Clock, NetworkPlatform, Peripherals, PlatformError, SystemControl, WakeTrigger,
};
use crate::portal::{ControlError, DeviceStatus, PortalControl, PortalLink, PortalRequest, ScannedNetwork};
use crate::power::PowerManager;
use crate::store::{ConfigStore, StoreError};
use log::{debug, error, info, warn, LevelFilter};
use std::collections::BTreeSet;

/// The device: record, components and platform, driven by [`tick`](Device::tick).
pub struct Device<B: Board> {
    config: DeviceConfig,
    record: ProvisioningRecord,
    store: ConfigStore<B::Store>,
    controller: ConnectionController,
    gesture: ResetGestureRecognizer,
    power: PowerManager,
    network: B::Network,
    power_platform: B::Power,
    button: B::Button,
    clock: B::Clock,
    system: B::System,
    reboot_pending: bool,
    debug_mode: bool,
    portal: Option<PortalLink>,
}

impl<B: Board> Device<B> {
    /// Build the device and load the stored record.
    ///
    /// An unreadable store is logged and replaced by defaults in memory.
    pub fn new(config: DeviceConfig, peripherals: Peripherals<B>) -> Self {
        let store = ConfigStore::new(peripherals.store);
        let record = store.load().unwrap_or_else(|e| {
            error!("Failed to load configuration, using defaults: {}", e);
            ProvisioningRecord::default()
        });

        Self {
            controller: ConnectionController::new(config.clone()),
            gesture: ResetGestureRecognizer::from_config(&config),
            power: PowerManager::new(record.power, config.reset_pin),
            config,
            record,
            store,
            network: peripherals.network,
            power_platform: peripherals.power,
            button: peripherals.button,
            clock: peripherals.clock,
            system: peripherals.system,
            reboot_pending: false,
            debug_mode: false,
            portal: None,
        }
    }

    /// Receive portal requests through `link` and publish status to it.
    pub fn attach_portal(&mut self, link: PortalLink) {
        self.portal = Some(link);
    }

    /// Boot-time entry. May restart the device.
    pub fn begin(&mut self) {
        info!("{} starting", crate::version_string());

        let outcome = self.controller.begin(
            &self.record,
            &mut self.store,
            &mut self.network,
            &mut self.clock,
        );
        self.record.boot_attempts = self.controller.boot_attempts();

        if outcome == (ConnectOutcome::Retry { requires_restart: true }) {
            warn!(
                "Attempt {}/{} failed, restarting",
                self.controller.boot_attempts(),
                MAX_ATTEMPTS
            );
            self.clock.delay(self.config.restart_grace);
            self.system.restart();
            return;
        }

        self.start_time_sync();
        if self.power.settings().sleep_enabled {
            if let Err(e) = self.power.arm(&mut self.power_platform) {
                warn!("Failed to arm wake sources: {}", e);
            }
        }
        self.publish_status();
    }

    /// One scheduler iteration.
    pub fn tick(&mut self) {
        if self.reboot_pending {
            info!("Rebooting");
            self.clock.delay(self.config.reboot_delay);
            self.system.restart();
            return;
        }

        if let Some(tier) = self.gesture.tick(&mut self.button, &self.clock) {
            if let Err(e) = self.apply_reset(tier) {
                error!("{:?} reset failed: {}", tier, e);
            }
        }

        self.drain_portal();

        if let Some(outcome) = self.controller.tick(
            &self.record,
            &mut self.store,
            &mut self.network,
            &mut self.clock,
        ) {
            debug!("Health check: {:?}", outcome);
        }

        if self.power.settings().sleep_enabled && !self.reboot_pending {
            match self.power.sleep_cycle(&mut self.power_platform) {
                Ok(cause) => debug!("Resumed: {:?}", cause),
                Err(e) => warn!("Light sleep failed: {}", e),
            }
        }

        self.publish_status();
    }

    pub fn record(&self) -> &ProvisioningRecord {
        &self.record
    }

    pub fn state(&self) -> ConnectionState {
        self.controller.state()
    }

    pub fn power(&self) -> &PowerManager {
        &self.power
    }

    pub fn reboot_pending(&self) -> bool {
        self.reboot_pending
    }

    /// Store access for custom data.
    pub fn store_mut(&mut self) -> &mut ConfigStore<B::Store> {
        &mut self.store
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// Raise logging to `Debug`, or back to `Info`.
    pub fn set_debug_mode(&mut self, enabled: bool) {
        self.debug_mode = enabled;
        log::set_max_level(if enabled {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        });
        info!("Debug mode {}", if enabled { "on" } else { "off" });
    }

    /// Add an extra GPIO wake source.
    pub fn add_wake_gpio(&mut self, pin: u8, trigger: WakeTrigger) -> Result<(), PlatformError> {
        self.power.add_wake_gpio(pin, trigger, &mut self.power_platform)
    }

    /// Remove an extra GPIO wake source.
    pub fn remove_wake_gpio(&mut self, pin: u8) -> Result<bool, PlatformError> {
        self.power.remove_wake_gpio(pin, &mut self.power_platform)
    }

    /// Clear the given tier from the store and memory, then schedule a reboot.
    ///
    /// Nothing is scheduled if the store cannot be cleared.
    pub fn apply_reset(&mut self, tier: ResetTier) -> Result<(), StoreError> {
        match tier {
            ResetTier::NetworkOnly => {
                self.store.clear_network_identity()?;
                self.record.clear_network_identity();
                self.controller.forget_attempts();
                warn!("Network settings cleared");
            }
            ResetTier::Factory => {
                self.store.clear_all()?;
                self.record = ProvisioningRecord::default();
                self.controller.reset_to_defaults();
                self.power.reset_to_defaults();
                self.gesture.reset();
                warn!("Factory reset");
            }
        }
        self.reboot_pending = true;
        Ok(())
    }

    fn start_time_sync(&mut self) {
        if !self.record.time_sync.enabled {
            return;
        }
        let server = self.record.time_sync.effective_server().to_string();
        match self.network.start_time_sync(&server) {
            Ok(()) => info!("Time sync started with {}", server),
            Err(e) => warn!("Failed to start time sync: {}", e),
        }
    }

    fn drain_portal(&mut self) {
        let requests: Vec<PortalRequest> = match &self.portal {
            Some(link) => std::iter::from_fn(|| link.next_request()).collect(),
            None => return,
        };

        for request in requests {
            match request {
                PortalRequest::Reconfigure(update) => {
                    if let Err(e) = self.reconfigure(update) {
                        error!("Reconfiguration failed: {}", e);
                    }
                }
                PortalRequest::Reset(tier) => {
                    if let Err(e) = self.reset(tier) {
                        error!("{:?} reset failed: {}", tier, e);
                    }
                }
                PortalRequest::Scan => match self.scan_networks() {
                    Ok(networks) => {
                        if let Some(link) = &self.portal {
                            link.shared().publish_networks(networks);
                        }
                    }
                    Err(e) => warn!("Scan failed: {}", e),
                },
            }
        }
    }

    fn publish_status(&self) {
        if let Some(link) = &self.portal {
            link.shared().publish_status(self.status());
        }
    }
}

impl<B: Board> PortalControl for Device<B> {
    fn reconfigure(&mut self, update: ConfigUpdate) -> Result<(), ControlError> {
        update.validate()?;

        let mut next = self.record.clone();
        update.apply_station_groups(&mut next);
        if update.network.is_some() {
            self.store.save_network(&next)?;
        }
        if update.addressing.is_some() {
            self.store.save_addressing(&next)?;
        }
        if let Some(time_sync) = &update.time_sync {
            self.store.save_time_sync(time_sync)?;
            next.time_sync = time_sync.clone();
        }
        if let Some(power) = update.power {
            self.store.save_power(&power)?;
            next.power = power;
        }
        self.record = next;

        if update.network.is_some() {
            self.controller.forget_attempts();
        }
        if update.time_sync.is_some() {
            self.start_time_sync();
        }
        let restart = update.requires_restart();
        if restart {
            info!("Configuration saved, restart pending");
            self.reboot_pending = true;
        }
        if let Some(power) = update.power {
            if let Err(e) = self.power.apply_settings(power, &mut self.power_platform) {
                if !restart {
                    return Err(e.into());
                }
                warn!("Power settings not applied live, effective after restart: {}", e);
            }
        }
        if !restart {
            info!("Configuration saved and applied");
        }
        Ok(())
    }

    fn reset(&mut self, tier: ResetTier) -> Result<(), ControlError> {
        Ok(self.apply_reset(tier)?)
    }

    fn status(&self) -> DeviceStatus {
        let state = self.controller.state();
        let settings = self.power.settings();
        DeviceStatus {
            version: crate::version_string(),
            role: state.role(),
            state,
            ap_reason: match state {
                ConnectionState::AccessPointMode(reason) => Some(reason),
                _ => None,
            },
            boot_attempts: self.controller.boot_attempts(),
            max_attempts: MAX_ATTEMPTS,
            hostname: self
                .record
                .effective_hostname(&self.config.default_hostname)
                .to_string(),
            ssid: self.record.network.ssid.clone(),
            address: self.network.local_address().map(|ip| ip.to_string()),
            static_address: self.record.static_address.enabled,
            time_sync: self.record.time_sync.enabled,
            sleep_enabled: settings.sleep_enabled,
            wake_interval_us: settings.wake_interval_us,
            wake_logging: settings.wake_logging,
            last_wake: self.power.last_wake(),
            wake_stats: *self.power.stats(),
            reboot_pending: self.reboot_pending,
            debug_mode: self.debug_mode,
        }
    }

    fn scan_networks(&mut self) -> Result<Vec<ScannedNetwork>, ControlError> {
        let mut visible = self.network.scan_visible_networks()?;
        visible.sort_by(|a, b| b.signal.cmp(&a.signal));

        let mut seen = BTreeSet::new();
        let networks = visible
            .into_iter()
            .filter(|n| !n.ssid.is_empty() && seen.insert(n.ssid.clone()))
            .map(|n| ScannedNetwork {
                stored: n.ssid == self.record.network.ssid,
                ssid: n.ssid,
                signal: n.signal,
            })
            .collect::<Vec<_>>();
        debug!("Scan found {} networks", networks.len());
        Ok(networks)
    }
}
