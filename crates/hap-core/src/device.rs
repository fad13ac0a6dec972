//! Accessory device identifier.
//!
//! The device id doubles as the accessory pairing identifier: it is
//! advertised in the `id` TXT field and sent as `Identifier` during
//! pair-setup and pair-verify.

use crate::error::ParseError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Six-byte device identifier, formatted like a MAC address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DeviceId(pub [u8; 6]);

impl DeviceId {
    /// Build from random bytes, e.g. on first start.
    pub fn from_random(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Parse a MAC-style string.
    ///
    /// Supports formats:
    /// - Colon-separated: "AA:BB:CC:DD:EE:FF"
    /// - Hyphen-separated: "AA-BB-CC-DD-EE-FF"
    /// - Bare hex: "AABBCCDDEEFF"
    pub fn from_mac_string(s: &str) -> Result<Self, ParseError> {
        let s = s.trim();

        let parts: Vec<&str> = if s.contains(':') {
            s.split(':').collect()
        } else if s.contains('-') {
            s.split('-').collect()
        } else {
            if s.len() != 12 || !s.is_ascii() {
                return Err(ParseError::InvalidFormat(format!(
                    "device id must be 12 hex characters, got {}",
                    s.len()
                )));
            }
            (0..6).map(|i| &s[i * 2..i * 2 + 2]).collect()
        };

        if parts.len() != 6 {
            return Err(ParseError::InvalidFormat(format!(
                "device id must have 6 bytes, got {}",
                parts.len()
            )));
        }

        let mut arr = [0u8; 6];
        for (slot, part) in arr.iter_mut().zip(parts) {
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| ParseError::InvalidHex(part.to_string()))?;
        }
        Ok(Self(arr))
    }

    /// Colon-separated uppercase string.
    pub fn to_mac_string(&self) -> String {
        format!(
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_mac_string())
    }
}

impl FromStr for DeviceId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_mac_string(s)
    }
}

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_mac_string())
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DeviceId::from_mac_string(&s).map_err(serde::de::Error::custom)
    }
}
