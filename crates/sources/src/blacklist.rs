//! Client blacklist
//!
//! Address prefixes checked on every accepted TCP connection. A match is
//! closed at the acceptor and never reaches a worker.

use std::net::IpAddr;

use sluice_config::AddrPrefix;

/// Set of rejected client prefixes
#[derive(Debug, Clone, Default)]
pub struct Blacklist {
    prefixes: Vec<AddrPrefix>,
}

impl Blacklist {
    /// Create an empty blacklist that admits everyone
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `ip` matches any entry
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.prefixes.iter().any(|prefix| prefix.contains(ip))
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl FromIterator<AddrPrefix> for Blacklist {
    fn from_iter<I: IntoIterator<Item = AddrPrefix>>(iter: I) -> Self {
        Self {
            prefixes: iter.into_iter().collect(),
        }
    }
}
