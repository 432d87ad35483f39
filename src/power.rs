//! Light-sleep orchestration.
//!
//! [`PowerManager`] arms the wake sources before each suspension and
//! classifies the cause after resume.
//!
//! Arming always programs the same hardware state for the same inputs:
//! the timer at the configured interval, then the GPIO wake class is
//! disabled (dropping every earlier pin registration), the reset button is
//! registered as a low-level source, every pin from the wake set is
//! registered with its trigger, and the class is enabled again.
//!
//! [`analyze_wake`](PowerManager::analyze_wake) must run exactly once per
//! resume; each call counts.

use crate::config::PowerSettings;
use crate::platform::{PlatformError, PowerPlatform, WakeSource, WakeTrigger};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;

/// Classified wake cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WakeCause {
    Undefined,
    Timer,
    /// GPIO wake; the pin when the hardware could tell.
    Gpio { pin: Option<u8> },
    Wifi,
    Other,
}

/// Wake counters, kept in memory only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WakeupStats {
    pub timer: u32,
    pub gpio: u32,
    pub wifi: u32,
    pub other: u32,
    pub total: u32,
}

impl WakeupStats {
    fn record(&mut self, cause: WakeCause) {
        match cause {
            WakeCause::Timer => self.timer += 1,
            WakeCause::Gpio { .. } => self.gpio += 1,
            WakeCause::Wifi => self.wifi += 1,
            WakeCause::Undefined | WakeCause::Other => self.other += 1,
        }
        self.total += 1;
    }
}

/// Owns the wake set, the last wake cause and the statistics.
#[derive(Debug, Clone)]
pub struct PowerManager {
    settings: PowerSettings,
    reset_pin: u8,
    wake_pins: BTreeMap<u8, WakeTrigger>,
    last_wake: WakeCause,
    stats: WakeupStats,
}

impl PowerManager {
    /// Manager for a board whose reset button sits on `reset_pin`.
    pub fn new(settings: PowerSettings, reset_pin: u8) -> Self {
        Self {
            settings,
            reset_pin,
            wake_pins: BTreeMap::new(),
            last_wake: WakeCause::Undefined,
            stats: WakeupStats::default(),
        }
    }

    pub fn settings(&self) -> &PowerSettings {
        &self.settings
    }

    pub fn last_wake(&self) -> WakeCause {
        self.last_wake
    }

    pub fn stats(&self) -> &WakeupStats {
        &self.stats
    }

    /// Extra GPIO wake sources (the reset button is not listed).
    pub fn wake_pins(&self) -> &BTreeMap<u8, WakeTrigger> {
        &self.wake_pins
    }

    /// Program every wake source.
    ///
    /// The GPIO class is enabled again even when a pin registration fails, so
    /// the reset button and every accepted pin stay armed. The first failure
    /// is returned.
    pub fn arm<P: PowerPlatform>(&mut self, platform: &mut P) -> Result<(), PlatformError> {
        platform.enable_timer_wake(self.settings.wake_interval_us)?;

        platform.disable_gpio_wake_class()?;
        let registered = self.register_gpio(platform);
        let enabled = platform.enable_gpio_wake_class();
        registered?;
        enabled?;

        debug!(
            "Wake sources armed: timer {} us, {} GPIO",
            self.settings.wake_interval_us,
            self.wake_pins.len() + 1
        );
        Ok(())
    }

    fn register_gpio<P: PowerPlatform>(&self, platform: &mut P) -> Result<(), PlatformError> {
        let mut first_error = platform
            .enable_gpio_wake(self.reset_pin, WakeTrigger::LowLevel)
            .err();
        for (&pin, &trigger) in &self.wake_pins {
            if pin == self.reset_pin {
                continue;
            }
            if let Err(e) = platform.enable_gpio_wake(pin, trigger) {
                warn!("GPIO{} not armed: {}", pin, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Read and classify the cause of the last wake. Call once per resume.
    pub fn analyze_wake<P: PowerPlatform>(&mut self, platform: &P) -> WakeCause {
        let cause = match platform.last_wake_cause() {
            WakeSource::Undefined => WakeCause::Undefined,
            WakeSource::Timer => WakeCause::Timer,
            WakeSource::Gpio => WakeCause::Gpio {
                pin: platform.last_wake_gpio_pin(),
            },
            WakeSource::Wifi => WakeCause::Wifi,
            WakeSource::Other => WakeCause::Other,
        };
        self.last_wake = cause;

        if self.settings.wake_logging {
            self.stats.record(cause);
            info!("Woke by {:?} (total {})", cause, self.stats.total);
        }
        cause
    }

    /// Arm, suspend, and classify the wake.
    pub fn sleep_cycle<P: PowerPlatform>(&mut self, platform: &mut P) -> Result<WakeCause, PlatformError> {
        self.arm(platform)?;
        platform.suspend()?;
        Ok(self.analyze_wake(platform))
    }

    /// Add a wake pin; takes effect now if sleep is enabled, else at the next arm.
    ///
    /// The reset button pin is reserved, and triggers the platform cannot wake
    /// on are refused. If re-arming fails the wake set is left as it was.
    pub fn add_wake_gpio<P: PowerPlatform>(
        &mut self,
        pin: u8,
        trigger: WakeTrigger,
        platform: &mut P,
    ) -> Result<(), PlatformError> {
        if pin == self.reset_pin {
            return Err(PlatformError::Gpio {
                pin,
                reason: "reserved for the reset button".to_string(),
            });
        }
        if !platform.supports_gpio_wake(pin, trigger) {
            return Err(PlatformError::UnsupportedTrigger { pin, trigger });
        }

        let previous = self.wake_pins.insert(pin, trigger);
        if let Err(e) = self.rearm_if_enabled(platform) {
            match previous {
                Some(old) => self.wake_pins.insert(pin, old),
                None => self.wake_pins.remove(&pin),
            };
            if let Err(restore) = self.rearm_if_enabled(platform) {
                warn!("Failed to restore wake sources: {}", restore);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Remove a wake pin; returns whether it was present.
    pub fn remove_wake_gpio<P: PowerPlatform>(
        &mut self,
        pin: u8,
        platform: &mut P,
    ) -> Result<bool, PlatformError> {
        let removed = self.wake_pins.remove(&pin).is_some();
        if removed {
            self.rearm_if_enabled(platform)?;
        }
        Ok(removed)
    }

    /// Turn sleep on or off; turning it on arms immediately.
    pub fn set_sleep_enabled<P: PowerPlatform>(
        &mut self,
        enabled: bool,
        platform: &mut P,
    ) -> Result<(), PlatformError> {
        let was_enabled = self.settings.sleep_enabled;
        self.settings.sleep_enabled = enabled;
        if enabled && !was_enabled {
            if let Err(e) = self.arm(platform) {
                self.settings.sleep_enabled = was_enabled;
                return Err(e);
            }
            info!("Light sleep enabled");
        } else if !enabled && was_enabled {
            info!("Light sleep disabled");
        }
        Ok(())
    }

    /// Change the timer interval; re-arms if sleep is enabled.
    pub fn set_wake_interval<P: PowerPlatform>(
        &mut self,
        interval_us: u64,
        platform: &mut P,
    ) -> Result<(), PlatformError> {
        if interval_us == 0 {
            return Err(PlatformError::Sleep("wake interval must be non-zero".to_string()));
        }
        let previous = self.settings.wake_interval_us;
        if previous == interval_us {
            return Ok(());
        }
        self.settings.wake_interval_us = interval_us;
        if let Err(e) = self.rearm_if_enabled(platform) {
            self.settings.wake_interval_us = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Turn wake counting on or off; off also clears the counters.
    pub fn set_wake_logging(&mut self, enabled: bool) {
        self.settings.wake_logging = enabled;
        if !enabled {
            self.stats = WakeupStats::default();
        }
    }

    /// Apply a whole settings group with the same side effects as the
    /// individual setters.
    pub fn apply_settings<P: PowerPlatform>(
        &mut self,
        settings: PowerSettings,
        platform: &mut P,
    ) -> Result<(), PlatformError> {
        self.set_wake_logging(settings.wake_logging);
        if self.settings.sleep_enabled && settings.sleep_enabled {
            self.set_wake_interval(settings.wake_interval_us, platform)
        } else {
            self.settings.wake_interval_us = settings.wake_interval_us;
            self.set_sleep_enabled(settings.sleep_enabled, platform)
        }
    }

    /// Back to defaults: sleep off, no extra pins, counters zeroed.
    pub fn reset_to_defaults(&mut self) {
        self.settings = PowerSettings::default();
        self.wake_pins.clear();
        self.last_wake = WakeCause::Undefined;
        self.stats = WakeupStats::default();
    }

    fn rearm_if_enabled<P: PowerPlatform>(&mut self, platform: &mut P) -> Result<(), PlatformError> {
        if self.settings.sleep_enabled {
            self.arm(platform)
        } else {
            Ok(())
        }
    }
}
