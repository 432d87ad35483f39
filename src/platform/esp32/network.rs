//! WiFi radio over the non-blocking `EspWifi` driver.
//!
//! `connect` only issues the request; the controller polls [`status`] for the
//! link. The access point runs in mixed mode so scans keep working while the
//! setup network is up.
//!
//! [`status`]: crate::platform::NetworkPlatform::status

use crate::config::{Secret, StaticIpv4};
use crate::platform::{ConnectionRole, LinkStatus, NetworkPlatform, PlatformError, Result, VisibleNetwork};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::ipv4::{
    ClientConfiguration as IpClientConfiguration, ClientSettings as IpClientSettings,
    Configuration as IpConfiguration, Mask, RouterConfiguration, Subnet,
};
use esp_idf_svc::netif::{EspNetif, NetifConfiguration, NetifStack};
use esp_idf_svc::nvs::{EspNvsPartition, NvsDefault};
use esp_idf_svc::sntp::{EspSntp, SntpConf};
use esp_idf_svc::wifi::{
    AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, EspWifi,
};
use log::{debug, info, warn};
use std::net::Ipv4Addr;

/// The radio plus the time-sync client it carries.
pub struct EspNetwork {
    wifi: EspWifi<'static>,
    role: Option<ConnectionRole>,
    connecting: bool,
    sntp: Option<EspSntp<'static>>,
}

impl EspNetwork {
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspNvsPartition<NvsDefault>,
    ) -> Result<Self> {
        let wifi = EspWifi::new(modem, sysloop, Some(nvs))?;
        Ok(Self {
            wifi,
            role: None,
            connecting: false,
            sntp: None,
        })
    }

    fn stop(&mut self) -> Result<()> {
        if self.wifi.is_started()? {
            self.wifi.stop()?;
        }
        self.connecting = false;
        Ok(())
    }

    fn static_netif(address: &StaticIpv4) -> Result<EspNetif> {
        let mask = Mask::try_from(address.subnet)
            .map_err(|_| PlatformError::Radio(format!("invalid subnet mask {}", address.subnet)))?;

        let mut conf = NetifConfiguration::wifi_default_client();
        conf.key = "WIFI_STA_STATIC"
            .try_into()
            .map_err(|_| PlatformError::Radio("netif key too long".to_string()))?;
        conf.ip_configuration = Some(IpConfiguration::Client(IpClientConfiguration::Fixed(
            IpClientSettings {
                ip: address.ip,
                subnet: Subnet {
                    gateway: address.gateway,
                    mask,
                },
                dns: Some(address.dns),
                secondary_dns: None,
            },
        )));
        Ok(EspNetif::new_with_conf(&conf)?)
    }

    fn ap_netif(address: Ipv4Addr) -> Result<EspNetif> {
        let mut conf = NetifConfiguration::wifi_default_router();
        conf.ip_configuration = Some(IpConfiguration::Router(RouterConfiguration {
            subnet: Subnet {
                gateway: address,
                mask: Mask(24),
            },
            ..Default::default()
        }));
        Ok(EspNetif::new_with_conf(&conf)?)
    }
}

impl NetworkPlatform for EspNetwork {
    fn set_role(&mut self, role: ConnectionRole) -> Result<()> {
        if self.role != Some(role) {
            debug!("Radio role {:?}", role);
            self.stop()?;
            self.role = Some(role);
        }
        Ok(())
    }

    fn set_hostname(&mut self, hostname: &str) -> Result<()> {
        self.wifi.sta_netif_mut().set_hostname(hostname)?;
        Ok(())
    }

    fn configure_addressing(&mut self, address: Option<&StaticIpv4>) -> Result<()> {
        self.stop()?;
        let netif = match address {
            Some(address) => {
                info!("Static address {}/{}", address.ip, address.prefix_len());
                Self::static_netif(address)?
            }
            None => EspNetif::new(NetifStack::Sta)?,
        };
        self.wifi.swap_netif_sta(netif)?;
        Ok(())
    }

    fn connect(&mut self, ssid: &str, password: &Secret) -> Result<()> {
        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| PlatformError::CredentialTooLong)?,
            password: password
                .expose()
                .try_into()
                .map_err(|_| PlatformError::CredentialTooLong)?,
            auth_method,
            ..Default::default()
        });

        self.wifi.set_configuration(&config)?;
        if !self.wifi.is_started()? {
            self.wifi.start()?;
        }
        self.wifi.connect()?;
        self.connecting = true;
        Ok(())
    }

    fn status(&self) -> LinkStatus {
        let associated = self.wifi.is_connected().unwrap_or(false);
        let up = self.wifi.sta_netif().is_up().unwrap_or(false);
        match (associated && up, self.connecting) {
            (true, _) => LinkStatus::Connected,
            (false, true) => LinkStatus::Connecting,
            (false, false) => LinkStatus::Disconnected,
        }
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.wifi.is_started()? {
            if let Err(e) = self.wifi.disconnect() {
                debug!("Disconnect: {:?}", e);
            }
        }
        self.stop()
    }

    fn start_access_point(&mut self, ssid: &str, address: Ipv4Addr) -> Result<()> {
        self.stop()?;
        self.wifi.swap_netif_ap(Self::ap_netif(address)?)?;

        let config = Configuration::Mixed(
            ClientConfiguration::default(),
            AccessPointConfiguration {
                ssid: ssid
                    .try_into()
                    .map_err(|_| PlatformError::CredentialTooLong)?,
                auth_method: AuthMethod::None,
                channel: 1,
                ..Default::default()
            },
        );
        self.wifi.set_configuration(&config)?;
        self.wifi.start()?;
        self.role = Some(ConnectionRole::AccessPoint);
        info!("Access point {:?} up at {}", ssid, address);
        Ok(())
    }

    fn scan_visible_networks(&mut self) -> Result<Vec<VisibleNetwork>> {
        if !self.wifi.is_started()? {
            self.wifi
                .set_configuration(&Configuration::Client(ClientConfiguration::default()))?;
            self.wifi.start()?;
        }
        let found = self.wifi.scan()?;
        Ok(found
            .into_iter()
            .map(|ap| VisibleNetwork {
                ssid: ap.ssid.as_str().to_string(),
                signal: ap.signal_strength,
            })
            .collect())
    }

    fn start_time_sync(&mut self, server: &str) -> Result<()> {
        // Replacing the client stops the previous one first.
        self.sntp = None;
        let mut conf = SntpConf::default();
        conf.servers[0] = server;
        let sntp = EspSntp::new(&conf).map_err(|e| PlatformError::TimeSync(format!("{:?}", e)))?;
        self.sntp = Some(sntp);
        Ok(())
    }

    fn local_address(&self) -> Option<Ipv4Addr> {
        let netif = match self.role? {
            ConnectionRole::Station => {
                if self.status() != LinkStatus::Connected {
                    return None;
                }
                self.wifi.sta_netif()
            }
            ConnectionRole::AccessPoint => self.wifi.ap_netif(),
        };
        match netif.get_ip_info() {
            Ok(info) => Some(info.ip),
            Err(e) => {
                warn!("Failed to read address: {:?}", e);
                None
            }
        }
    }
}
