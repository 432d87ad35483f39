//! Strict dotted-quad parsing for the static address override.

use super::ConfigError;
use std::fmt;
use std::net::Ipv4Addr;

/// Which of the four static-address fields a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressField {
    /// Interface address.
    Ip,
    /// Default gateway.
    Gateway,
    /// Subnet mask.
    Subnet,
    /// DNS server.
    Dns,
}

impl AddressField {
    /// Field name as used in logs and the portal.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Gateway => "gateway",
            Self::Subnet => "subnet",
            Self::Dns => "dns",
        }
    }
}

impl fmt::Display for AddressField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parse `a.b.c.d` where each part is 1-3 decimal digits in `0..=255`.
///
/// No surrounding whitespace, signs, or missing/extra parts are accepted.
pub fn parse_address(field: AddressField, value: &str) -> Result<Ipv4Addr, ConfigError> {
    let invalid = || ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    };

    let mut octets = [0u8; 4];
    let mut parts = value.split('.');
    for octet in octets.iter_mut() {
        let part = parts.next().ok_or_else(invalid)?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        *octet = part.parse::<u8>().map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }

    Ok(Ipv4Addr::from(octets))
}

/// A fully parsed static IPv4 configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticIpv4 {
    /// Interface address.
    pub ip: Ipv4Addr,
    /// Default gateway.
    pub gateway: Ipv4Addr,
    /// Subnet mask.
    pub subnet: Ipv4Addr,
    /// DNS server.
    pub dns: Ipv4Addr,
}

impl StaticIpv4 {
    /// Build from parsed parts; the mask must be contiguous ones.
    pub fn new(
        ip: Ipv4Addr,
        gateway: Ipv4Addr,
        subnet: Ipv4Addr,
        dns: Ipv4Addr,
    ) -> Result<Self, ConfigError> {
        let mask = u32::from(subnet);
        if mask.leading_ones() != mask.count_ones() {
            return Err(ConfigError::InvalidAddress {
                field: AddressField::Subnet,
                value: subnet.to_string(),
            });
        }
        Ok(Self {
            ip,
            gateway,
            subnet,
            dns,
        })
    }

    /// Subnet mask as a prefix length (e.g. 24 for 255.255.255.0).
    pub fn prefix_len(&self) -> u8 {
        u32::from(self.subnet).count_ones() as u8
    }
}
