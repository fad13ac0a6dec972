//! Characteristic permission flags.
//!
//! On the wire permissions are a JSON array of short codes
//! (`["pr","pw","ev"]`); internally they are a small bitmask.

use crate::error::ParseError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Permission bitmask of a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Permissions(pub u8);

impl Permissions {
    pub const PAIRED_READ: u8 = 1 << 0;
    pub const PAIRED_WRITE: u8 = 1 << 1;
    pub const NOTIFY: u8 = 1 << 2;
    pub const ADDITIONAL_AUTHORIZATION: u8 = 1 << 3;
    pub const TIMED_WRITE: u8 = 1 << 4;
    pub const HIDDEN: u8 = 1 << 5;
    pub const WRITE_RESPONSE: u8 = 1 << 6;

    const CODES: [(u8, &'static str); 7] = [
        (Self::PAIRED_READ, "pr"),
        (Self::PAIRED_WRITE, "pw"),
        (Self::NOTIFY, "ev"),
        (Self::ADDITIONAL_AUTHORIZATION, "aa"),
        (Self::TIMED_WRITE, "tw"),
        (Self::HIDDEN, "hd"),
        (Self::WRITE_RESPONSE, "wr"),
    ];

    pub fn new(bits: u8) -> Self {
        Self(bits)
    }

    /// Read + notify, the shape of most sensor characteristics.
    pub fn read_notify() -> Self {
        Self(Self::PAIRED_READ | Self::NOTIFY)
    }

    /// Read + write + notify.
    pub fn read_write_notify() -> Self {
        Self(Self::PAIRED_READ | Self::PAIRED_WRITE | Self::NOTIFY)
    }

    pub fn has(&self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    pub fn readable(&self) -> bool {
        self.has(Self::PAIRED_READ)
    }

    pub fn writable(&self) -> bool {
        self.has(Self::PAIRED_WRITE)
    }

    pub fn notifies(&self) -> bool {
        self.has(Self::NOTIFY)
    }

    pub fn requires_timed_write(&self) -> bool {
        self.has(Self::TIMED_WRITE)
    }

    pub fn write_response(&self) -> bool {
        self.has(Self::WRITE_RESPONSE)
    }

    /// Parse a single short code such as `"pr"`.
    pub fn parse_code(code: &str) -> Result<u8, ParseError> {
        Self::CODES
            .iter()
            .find(|(_, c)| c.eq_ignore_ascii_case(code))
            .map(|(bit, _)| *bit)
            .ok_or_else(|| ParseError::InvalidValue(format!("unknown permission: {}", code)))
    }

    /// Build from a list of short codes.
    pub fn from_codes<S: AsRef<str>>(codes: &[S]) -> Result<Self, ParseError> {
        let mut bits = 0;
        for code in codes {
            bits |= Self::parse_code(code.as_ref())?;
        }
        Ok(Self(bits))
    }

    /// Short codes in canonical order.
    pub fn codes(&self) -> Vec<&'static str> {
        Self::CODES
            .iter()
            .filter(|(bit, _)| self.has(*bit))
            .map(|(_, code)| *code)
            .collect()
    }
}

impl Serialize for Permissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.codes().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let codes = Vec::<String>::deserialize(deserializer)?;
        Permissions::from_codes(&codes).map_err(serde::de::Error::custom)
    }
}
