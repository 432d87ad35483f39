//! Hardware seams.
//!
//! Every piece of logic above this module talks to the board through the
//! traits defined here, which keeps the controller, gesture recognizer and
//! power manager testable on the host.
//!
//! # Implementations
//!
//! - [`host`] - simulated board for development on a workstation
//! - `esp32` - ESP-IDF drivers (`esp32` feature)
//! - `mock` - scripted, recording doubles used by unit tests
//!
//! # Example
//!
//! ```ignore
//! fn poll_button<B: Board>(button: &mut B::Button) -> bool {
//!     button.is_low()
//! }
//! ```

mod error;
pub mod host;

#[cfg(feature = "esp32")]
pub mod esp32;

#[cfg(test)]
pub(crate) mod mock;

pub use error::{PlatformError, Result};

use crate::config::{Secret, StaticIpv4};
use crate::store::KeyValueStore;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Network role of the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionRole {
    /// Hosting the setup network.
    AccessPoint,
    /// Joined to (or joining) an existing network as a client.
    Station,
}

/// Link state reported by the radio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkStatus {
    /// No association and none in progress.
    #[default]
    Disconnected,
    /// Association or address acquisition in progress.
    Connecting,
    /// Associated with an address.
    Connected,
}

/// A network seen by a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibleNetwork {
    /// Network name.
    pub ssid: String,
    /// Received signal strength in dBm.
    pub signal: i8,
}

/// Condition that resumes the device from light sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WakeTrigger {
    /// Wake while the line is low.
    LowLevel,
    /// Wake while the line is high.
    HighLevel,
    /// Wake on a low-to-high transition.
    RisingEdge,
    /// Wake on a high-to-low transition.
    FallingEdge,
}

/// Wake cause as reported by the hardware, before pin lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeSource {
    /// Not a wake from sleep (cold boot or reset).
    Undefined,
    Timer,
    Gpio,
    Wifi,
    /// Any other hardware source.
    Other,
}

/// Radio control.
pub trait NetworkPlatform {
    /// Switch the radio role.
    fn set_role(&mut self, role: ConnectionRole) -> Result<()>;

    /// Set the hostname announced in station role.
    fn set_hostname(&mut self, hostname: &str) -> Result<()>;

    /// Use a static address, or automatic addressing when `None`.
    fn configure_addressing(&mut self, address: Option<&StaticIpv4>) -> Result<()>;

    /// Start joining a network; returns without waiting for the link.
    fn connect(&mut self, ssid: &str, password: &Secret) -> Result<()>;

    /// Current link state.
    fn status(&self) -> LinkStatus;

    /// Drop the link and release the radio.
    fn disconnect(&mut self) -> Result<()>;

    /// Host the setup network at `address`.
    fn start_access_point(&mut self, ssid: &str, address: Ipv4Addr) -> Result<()>;

    /// Blocking scan for visible networks.
    fn scan_visible_networks(&mut self) -> Result<Vec<VisibleNetwork>>;

    /// Start periodic time synchronisation against `server`.
    fn start_time_sync(&mut self, server: &str) -> Result<()>;

    /// Address of the active interface, if any.
    fn local_address(&self) -> Option<Ipv4Addr>;
}

/// Light-sleep and wake-source control.
pub trait PowerPlatform {
    /// Arm the timer wake source.
    fn enable_timer_wake(&mut self, interval_us: u64) -> Result<()>;

    /// Disable the GPIO wake source class and drop every pin registration.
    fn disable_gpio_wake_class(&mut self) -> Result<()>;

    /// Enable the GPIO wake source class.
    fn enable_gpio_wake_class(&mut self) -> Result<()>;

    /// Register one pin as a wake source.
    fn enable_gpio_wake(&mut self, pin: u8, trigger: WakeTrigger) -> Result<()>;

    /// Whether `pin` can wake the chip on `trigger`.
    fn supports_gpio_wake(&self, _pin: u8, _trigger: WakeTrigger) -> bool {
        true
    }

    /// Enter light sleep; returns after a wake source fires.
    fn suspend(&mut self) -> Result<()>;

    /// Cause of the most recent wake.
    fn last_wake_cause(&self) -> WakeSource;

    /// Pin that caused the most recent GPIO wake, if known.
    fn last_wake_gpio_pin(&self) -> Option<u8>;
}

/// A digital input line.
pub trait DigitalInput {
    /// Line reads logic low.
    fn is_low(&mut self) -> bool;
}

/// Monotonic time source.
pub trait Clock {
    /// Time since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    /// Block for `duration`.
    fn delay(&mut self, duration: Duration);
}

/// [`Clock`] over `std::time::Instant`, measured from construction.
#[derive(Debug)]
pub struct StdClock {
    start: Instant,
}

impl Default for StdClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Whole-device control.
pub trait SystemControl {
    /// Restart the device. Does not return on hardware.
    fn restart(&mut self);
}

/// A set of concrete platform types.
pub trait Board {
    type Store: KeyValueStore;
    type Network: NetworkPlatform;
    type Power: PowerPlatform;
    type Button: DigitalInput;
    type Clock: Clock;
    type System: SystemControl;
}

/// Owned peripherals of a [`Board`].
pub struct Peripherals<B: Board> {
    pub store: B::Store,
    pub network: B::Network,
    pub power: B::Power,
    pub button: B::Button,
    pub clock: B::Clock,
    pub system: B::System,
}
