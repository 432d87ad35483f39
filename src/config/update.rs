//! Reconfiguration requests accepted from the portal.
//!
//! A [`ConfigUpdate`] carries any subset of the persisted groups. Groups that
//! change how the station joins the network mark a restart as pending; time
//! sync and power groups are applied live.

use super::record::{
    NetworkIdentity, PowerSettings, ProvisioningRecord, Secret, StaticAddress, TimeSyncSettings,
    MAX_HOSTNAME_LEN,
};
use super::ConfigError;
use serde::Deserialize;

/// New station credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkUpdate {
    /// Network name; must not be empty.
    pub ssid: String,
    /// Network secret.
    #[serde(default)]
    pub password: Secret,
}

/// Hostname and static-address settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AddressingUpdate {
    /// Hostname; empty falls back to the code default.
    pub hostname: String,
    /// Static address override.
    pub static_address: StaticAddress,
}

/// A portal reconfiguration request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    /// Replace the station credentials (resets the attempt budget).
    pub network: Option<NetworkUpdate>,
    /// Replace hostname and static-address settings.
    pub addressing: Option<AddressingUpdate>,
    /// Replace time sync settings.
    pub time_sync: Option<TimeSyncSettings>,
    /// Replace power settings.
    pub power: Option<PowerSettings>,
}

impl ConfigUpdate {
    /// Check every present group.
    ///
    /// Address strings are only checked when the override is being enabled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Err(ConfigError::EmptyUpdate);
        }
        if let Some(network) = &self.network {
            network.identity().validate()?;
        }
        if let Some(addressing) = &self.addressing {
            if addressing.hostname.len() > MAX_HOSTNAME_LEN {
                return Err(ConfigError::HostnameTooLong {
                    len: addressing.hostname.len(),
                    max: MAX_HOSTNAME_LEN,
                });
            }
            if addressing.static_address.enabled {
                addressing.static_address.parse()?;
            }
        }
        if let Some(power) = &self.power {
            if power.sleep_enabled && power.wake_interval_us == 0 {
                return Err(ConfigError::ZeroWakeInterval);
            }
        }
        Ok(())
    }

    /// No group present.
    pub fn is_empty(&self) -> bool {
        self.network.is_none()
            && self.addressing.is_none()
            && self.time_sync.is_none()
            && self.power.is_none()
    }

    /// The update changes how the station joins, so it only takes effect after a restart.
    pub fn requires_restart(&self) -> bool {
        self.network.is_some() || self.addressing.is_some()
    }

    /// Apply the network and addressing groups to `record`.
    ///
    /// A credential change also zeroes the boot counter: new credentials
    /// start a fresh attempt budget. Time sync and power groups are applied by
    /// their owners.
    pub fn apply_station_groups(&self, record: &mut ProvisioningRecord) {
        if let Some(network) = &self.network {
            record.network = network.identity();
            record.boot_attempts = 0;
        }
        if let Some(addressing) = &self.addressing {
            record.hostname = addressing.hostname.trim().to_string();
            record.static_address = addressing.static_address.clone();
        }
    }
}

impl NetworkUpdate {
    fn identity(&self) -> NetworkIdentity {
        NetworkIdentity {
            ssid: self.ssid.clone(),
            password: self.password.clone(),
        }
    }
}
