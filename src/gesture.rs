//! Reset-button gesture recognition.
//!
//! The button is polled once per tick. A press starts timing; the release
//! classifies the hold into a [`ResetTier`]:
//!
//! | Hold | Action |
//! |---|---|
//! | < 3 s | none |
//! | 3 s to < 10 s | [`ResetTier::NetworkOnly`] |
//! | >= 10 s | [`ResetTier::Factory`] |
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use wifiweb_esp32::gesture::{ResetGestureRecognizer, ResetTier};
//!
//! let mut recognizer = ResetGestureRecognizer::default();
//! assert_eq!(recognizer.poll(true, Duration::ZERO), None);
//! assert_eq!(
//!     recognizer.poll(false, Duration::from_millis(3000)),
//!     Some(ResetTier::NetworkOnly)
//! );
//! ```

use crate::config::DeviceConfig;
use crate::platform::{Clock, DigitalInput};
use log::{debug, info};
use serde::Deserialize;
use std::time::Duration;

/// Scope of a configuration reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetTier {
    /// Clear network name, secret and boot counter.
    NetworkOnly,
    /// Clear every setting and all custom data.
    Factory,
}

/// Button state between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureState {
    Idle,
    /// Held since the given timestamp.
    Pressed(Duration),
}

/// Two-state press-duration classifier.
#[derive(Debug, Clone)]
pub struct ResetGestureRecognizer {
    state: GestureState,
    network_hold: Duration,
    factory_hold: Duration,
}

impl Default for ResetGestureRecognizer {
    fn default() -> Self {
        Self::new(Duration::from_millis(3000), Duration::from_millis(10_000))
    }
}

impl ResetGestureRecognizer {
    pub fn new(network_hold: Duration, factory_hold: Duration) -> Self {
        Self {
            state: GestureState::Idle,
            network_hold,
            factory_hold,
        }
    }

    /// Thresholds from the device configuration.
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.network_reset_hold, config.factory_reset_hold)
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    /// Feed one sample; returns a tier on the release edge of a long enough hold.
    pub fn poll(&mut self, pressed: bool, now: Duration) -> Option<ResetTier> {
        match (self.state, pressed) {
            (GestureState::Idle, true) => {
                debug!("Reset button pressed");
                self.state = GestureState::Pressed(now);
                None
            }
            (GestureState::Pressed(since), false) => {
                self.state = GestureState::Idle;
                let held = now.saturating_sub(since);
                let tier = self.classify(held);
                match tier {
                    Some(tier) => info!("Reset button held {} ms: {:?}", held.as_millis(), tier),
                    None => debug!("Reset button released after {} ms", held.as_millis()),
                }
                tier
            }
            _ => None,
        }
    }

    /// Read the active-low input and feed it to [`poll`](Self::poll).
    pub fn tick<I: DigitalInput, C: Clock>(&mut self, input: &mut I, clock: &C) -> Option<ResetTier> {
        let pressed = input.is_low();
        self.poll(pressed, clock.now())
    }

    /// Drop any press in progress.
    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
    }

    fn classify(&self, held: Duration) -> Option<ResetTier> {
        if held >= self.factory_hold {
            Some(ResetTier::Factory)
        } else if held >= self.network_hold {
            Some(ResetTier::NetworkOnly)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{MockButton, MockClock};

    fn hold(ms: u64) -> Option<ResetTier> {
        let mut recognizer = ResetGestureRecognizer::default();
        let start = Duration::from_secs(100);
        assert_eq!(recognizer.poll(true, start), None);
        recognizer.poll(false, start + Duration::from_millis(ms))
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_short_press_does_nothing() {
        assert_eq!(hold(0), None);
        assert_eq!(hold(2999), None);
    }

    #[test]
    fn test_network_tier_bounds() {
        assert_eq!(hold(3000), Some(ResetTier::NetworkOnly));
        assert_eq!(hold(9999), Some(ResetTier::NetworkOnly));
    }

    #[test]
    fn test_factory_tier() {
        assert_eq!(hold(10_000), Some(ResetTier::Factory));
        assert_eq!(hold(60_000), Some(ResetTier::Factory));
    }

    // ==================== Edge Tests ====================

    #[test]
    fn test_holding_does_not_fire() {
        let mut recognizer = ResetGestureRecognizer::default();
        recognizer.poll(true, Duration::ZERO);
        assert_eq!(recognizer.poll(true, Duration::from_secs(20)), None);
        assert_eq!(recognizer.state(), GestureState::Pressed(Duration::ZERO));
    }

    #[test]
    fn test_release_without_press_is_ignored() {
        let mut recognizer = ResetGestureRecognizer::default();
        assert_eq!(recognizer.poll(false, Duration::from_secs(20)), None);
        assert_eq!(recognizer.state(), GestureState::Idle);
    }

    #[test]
    fn test_returns_to_idle_after_release() {
        let mut recognizer = ResetGestureRecognizer::default();
        recognizer.poll(true, Duration::ZERO);
        recognizer.poll(false, Duration::from_secs(4));
        assert_eq!(recognizer.state(), GestureState::Idle);
    }

    #[test]
    fn test_tick_reads_active_low_input() {
        let mut recognizer = ResetGestureRecognizer::default();
        let mut button = MockButton::default();
        let mut clock = MockClock::new();

        button.pressed = true;
        assert_eq!(recognizer.tick(&mut button, &clock), None);
        clock.advance(Duration::from_millis(3500));
        button.pressed = false;
        assert_eq!(
            recognizer.tick(&mut button, &clock),
            Some(ResetTier::NetworkOnly)
        );
    }
}
