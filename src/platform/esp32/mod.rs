//! ESP-IDF board.
//!
//! Only compiled with the `esp32` feature.

mod network;
mod power;

pub use network::EspNetwork;
pub use power::EspPower;

use super::{Board, DigitalInput, Peripherals, PlatformError, StdClock, SystemControl};
use crate::config::DeviceConfig;
use crate::store::NvsStore;
use esp_idf_hal::gpio::{AnyIOPin, Input, PinDriver, Pull};
use esp_idf_hal::peripherals::Peripherals as HalPeripherals;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_sys::EspError;
use log::{info, warn};

impl From<EspError> for PlatformError {
    fn from(e: EspError) -> Self {
        Self::Radio(format!("{:?}", e))
    }
}

/// Active-low reset button with the internal pull-up enabled.
pub struct EspButton {
    pin: PinDriver<'static, AnyIOPin, Input>,
}

impl EspButton {
    pub fn new(pin: u8) -> Result<Self, PlatformError> {
        let gpio_error = |e: EspError| PlatformError::Gpio {
            pin,
            reason: format!("{:?}", e),
        };
        // SAFETY: the reset line is not handed to any other driver.
        let any = unsafe { AnyIOPin::new(pin as i32) };
        let mut driver = PinDriver::input(any).map_err(gpio_error)?;
        driver.set_pull(Pull::Up).map_err(gpio_error)?;
        Ok(Self { pin: driver })
    }
}

impl DigitalInput for EspButton {
    fn is_low(&mut self) -> bool {
        self.pin.is_low()
    }
}

/// Restart through `esp_restart`.
#[derive(Debug, Default)]
pub struct EspSystem;

impl SystemControl for EspSystem {
    fn restart(&mut self) {
        warn!("Restarting");
        // SAFETY: esp_restart has no preconditions and does not return.
        unsafe { esp_idf_sys::esp_restart() };
    }
}

/// The ESP32 board.
pub struct EspBoard;

impl Board for EspBoard {
    type Store = NvsStore;
    type Network = EspNetwork;
    type Power = EspPower;
    type Button = EspButton;
    type Clock = StdClock;
    type System = EspSystem;
}

impl EspBoard {
    /// Take the chip peripherals and bring up the drivers.
    ///
    /// May only be called once per boot.
    pub fn peripherals(config: &DeviceConfig) -> Result<Peripherals<EspBoard>, PlatformError> {
        let hal = HalPeripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let store = NvsStore::take().map_err(|e| PlatformError::Storage(e.to_string()))?;

        let network = EspNetwork::new(hal.modem, sysloop, store.partition())?;
        let button = EspButton::new(config.reset_pin)?;
        info!("Drivers ready, reset button on GPIO{}", config.reset_pin);

        Ok(Peripherals {
            store,
            network,
            power: EspPower::default(),
            button,
            clock: StdClock::default(),
            system: EspSystem,
        })
    }
}
