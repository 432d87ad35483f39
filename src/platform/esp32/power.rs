//! Light sleep through the ESP-IDF sleep API.
//!
//! The classic ESP32 only wakes from light sleep on GPIO levels, so edge
//! triggers are rejected. The chip does not report which line fired; after a
//! GPIO wake the registered lines are read back and the first one still at
//! its trigger level is reported.

use crate::platform::{PlatformError, PowerPlatform, Result, WakeSource, WakeTrigger};
use esp_idf_sys::{
    esp, esp_light_sleep_start, esp_sleep_disable_wakeup_source, esp_sleep_enable_gpio_wakeup,
    esp_sleep_enable_timer_wakeup, esp_sleep_get_wakeup_cause, esp_sleep_source_t_ESP_SLEEP_WAKEUP_GPIO,
    esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER, esp_sleep_source_t_ESP_SLEEP_WAKEUP_UNDEFINED,
    esp_sleep_source_t_ESP_SLEEP_WAKEUP_WIFI, gpio_get_level, gpio_int_type_t,
    gpio_int_type_t_GPIO_INTR_HIGH_LEVEL, gpio_int_type_t_GPIO_INTR_LOW_LEVEL, gpio_wakeup_disable,
    gpio_wakeup_enable, EspError, ESP_ERR_INVALID_STATE,
};
use std::collections::BTreeMap;

/// Wake sources programmed into the sleep controller.
#[derive(Debug, Default)]
pub struct EspPower {
    registered: BTreeMap<u8, WakeTrigger>,
    gpio_pin: Option<u8>,
}

fn sleep_error(e: EspError) -> PlatformError {
    PlatformError::Sleep(format!("{:?}", e))
}

fn level_type(pin: u8, trigger: WakeTrigger) -> Result<gpio_int_type_t> {
    match trigger {
        WakeTrigger::LowLevel => Ok(gpio_int_type_t_GPIO_INTR_LOW_LEVEL),
        WakeTrigger::HighLevel => Ok(gpio_int_type_t_GPIO_INTR_HIGH_LEVEL),
        WakeTrigger::RisingEdge | WakeTrigger::FallingEdge => {
            Err(PlatformError::UnsupportedTrigger { pin, trigger })
        }
    }
}

impl PowerPlatform for EspPower {
    fn enable_timer_wake(&mut self, interval_us: u64) -> Result<()> {
        // SAFETY: plain register setup.
        esp!(unsafe { esp_sleep_enable_timer_wakeup(interval_us) }).map_err(sleep_error)
    }

    fn disable_gpio_wake_class(&mut self) -> Result<()> {
        for &pin in self.registered.keys() {
            // SAFETY: pin was configured by enable_gpio_wake.
            esp!(unsafe { gpio_wakeup_disable(pin as i32) }).map_err(sleep_error)?;
        }
        self.registered.clear();

        // SAFETY: plain register setup.
        match esp!(unsafe { esp_sleep_disable_wakeup_source(esp_sleep_source_t_ESP_SLEEP_WAKEUP_GPIO) }) {
            Err(e) if e.code() == ESP_ERR_INVALID_STATE as i32 => Ok(()),
            other => other.map_err(sleep_error),
        }
    }

    fn enable_gpio_wake_class(&mut self) -> Result<()> {
        // SAFETY: plain register setup.
        esp!(unsafe { esp_sleep_enable_gpio_wakeup() }).map_err(sleep_error)
    }

    fn enable_gpio_wake(&mut self, pin: u8, trigger: WakeTrigger) -> Result<()> {
        let level = level_type(pin, trigger)?;
        // SAFETY: an invalid pin number is reported as ESP_ERR_INVALID_ARG.
        esp!(unsafe { gpio_wakeup_enable(pin as i32, level) }).map_err(|e| PlatformError::Gpio {
            pin,
            reason: format!("{:?}", e),
        })?;
        self.registered.insert(pin, trigger);
        Ok(())
    }

    fn supports_gpio_wake(&self, pin: u8, trigger: WakeTrigger) -> bool {
        level_type(pin, trigger).is_ok()
    }

    fn suspend(&mut self) -> Result<()> {
        // SAFETY: wake sources are armed by the caller.
        esp!(unsafe { esp_light_sleep_start() }).map_err(sleep_error)?;

        self.gpio_pin = if self.last_wake_cause() == WakeSource::Gpio {
            self.registered.iter().find_map(|(&pin, &trigger)| {
                // SAFETY: reading an input level has no side effects.
                let level = unsafe { gpio_get_level(pin as i32) };
                let active = match trigger {
                    WakeTrigger::LowLevel => level == 0,
                    _ => level != 0,
                };
                active.then_some(pin)
            })
        } else {
            None
        };
        Ok(())
    }

    #[allow(non_upper_case_globals)]
    fn last_wake_cause(&self) -> WakeSource {
        // SAFETY: read-only query.
        match unsafe { esp_sleep_get_wakeup_cause() } {
            esp_sleep_source_t_ESP_SLEEP_WAKEUP_UNDEFINED => WakeSource::Undefined,
            esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => WakeSource::Timer,
            esp_sleep_source_t_ESP_SLEEP_WAKEUP_GPIO => WakeSource::Gpio,
            esp_sleep_source_t_ESP_SLEEP_WAKEUP_WIFI => WakeSource::Wifi,
            _ => WakeSource::Other,
        }
    }

    fn last_wake_gpio_pin(&self) -> Option<u8> {
        self.gpio_pin
    }
}
