//! Canonical hardware addresses
//!
//! Lease files, neighbor tables and the registry all print MAC addresses
//! differently (`AA-BB-..`, `aabb.ccdd.eeff`, BSD `0:1b:..` without zero
//! padding). Every comparison in this crate goes through [`MacAddress`] so
//! those spellings collapse to one value.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::Error;

/// A six-octet hardware address, displayed as `aa:bb:cc:dd:ee:ff`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Build from raw octets
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Raw octets
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Parse a MAC address, returning `None` if `s` is not one
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty()
            || !s
                .chars()
                .all(|c| c.is_ascii_hexdigit() || matches!(c, ':' | '-' | '.'))
        {
            return None;
        }

        let groups: Vec<&str> = s.split([':', '-', '.']).collect();
        let mut octets = [0u8; 6];

        match groups.len() {
            // aabbccddeeff
            1 => {
                if s.len() != 12 {
                    return None;
                }
                for (i, octet) in octets.iter_mut().enumerate() {
                    *octet = u8::from_str_radix(s.get(i * 2..i * 2 + 2)?, 16).ok()?;
                }
            }
            // aabb.ccdd.eeff
            3 => {
                for (i, group) in groups.iter().enumerate() {
                    if group.len() != 4 {
                        return None;
                    }
                    let word = u16::from_str_radix(group, 16).ok()?;
                    octets[i * 2] = (word >> 8) as u8;
                    octets[i * 2 + 1] = (word & 0xff) as u8;
                }
            }
            // aa:bb:cc:dd:ee:ff, aa-bb-.., 0:1b:..
            6 => {
                for (octet, group) in octets.iter_mut().zip(&groups) {
                    if group.is_empty() || group.len() > 2 {
                        return None;
                    }
                    *octet = u8::from_str_radix(group, 16).ok()?;
                }
            }
            _ => return None,
        }

        Some(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::invalid_input(format!("not a MAC address: {s}")))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Canonical spelling of a registry identifier
///
/// MACs and IP addresses are re-rendered in their canonical form; anything
/// else (CIDRs, ClientIDs, scoped link-local addresses) is kept verbatim.
pub fn canonical_identifier(id: &str) -> String {
    let id = id.trim();
    if let Some(mac) = MacAddress::parse(id) {
        return mac.to_string();
    }
    if let Ok(ip) = id.parse::<IpAddr>() {
        return ip.to_string();
    }
    id.to_string()
}
