//! Client address prefixes
//!
//! Blacklist entries are parsed while the config is deserialized, so a bad
//! entry fails config loading with the offending text.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

/// Error parsing a blacklist entry
#[derive(Debug, thiserror::Error)]
#[error("invalid blacklist entry '{entry}': expected an IP address or CIDR prefix")]
pub struct PrefixParseError {
    entry: String,
}

/// An address or CIDR prefix, e.g. `10.0.0.0/8` or `192.168.1.7`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrPrefix {
    addr: IpAddr,
    len: u8,
}

impl AddrPrefix {
    /// Whether `ip` falls inside this prefix
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_u32(self.len);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_u128(self.len);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn mask_u32(len: u8) -> u32 {
    match len {
        0 => 0,
        len => u32::MAX << (32 - u32::from(len)),
    }
}

fn mask_u128(len: u8) -> u128 {
    match len {
        0 => 0,
        len => u128::MAX << (128 - u32::from(len)),
    }
}

impl FromStr for AddrPrefix {
    type Err = PrefixParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PrefixParseError {
            entry: s.to_string(),
        };

        let (addr, len) = match s.split_once('/') {
            Some((addr, len)) => (addr, Some(len)),
            None => (s, None),
        };
        let addr: IpAddr = addr.trim().parse().map_err(|_| err())?;
        let max = if addr.is_ipv4() { 32 } else { 128 };

        let len = match len {
            None => max,
            Some(len) => len.trim().parse::<u8>().map_err(|_| err())?,
        };
        if len > max {
            return Err(err());
        }

        Ok(Self {
            addr: addr.to_canonical(),
            len,
        })
    }
}

impl fmt::Display for AddrPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl<'de> Deserialize<'de> for AddrPrefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entry = String::deserialize(deserializer)?;
        entry.parse().map_err(serde::de::Error::custom)
    }
}
