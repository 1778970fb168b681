//! MAC address parsing for partition keys

use std::fmt;
use std::str::FromStr;

use crate::error::MacParseError;

/// 48-bit MAC address packed into the low bits of a `u64`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(u64);

impl MacAddress {
    /// Packed integer value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    /// Parse `aa:bb:cc:dd:ee:ff` (hex digits in either case)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MacParseError(s.to_string());

        if s.len() != 17 {
            return Err(invalid());
        }

        let mut value = 0u64;
        for (i, octet) in s.split(':').enumerate() {
            if i >= 6 || octet.len() != 2 || !octet.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            let byte = u8::from_str_radix(octet, 16).map_err(|_| invalid())?;
            value = (value << 8) | u64::from(byte);
        }
        Ok(Self(value))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}
