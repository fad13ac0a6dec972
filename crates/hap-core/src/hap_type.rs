//! Characteristic and service type identifiers.
//!
//! Apple-defined types live under the base UUID
//! `0000XXXX-0000-1000-8000-0026BB765291` and are sent in short form
//! (`"3E"`); custom types are sent as the full uppercase UUID.

use crate::error::ParseError;
use std::fmt;
use uuid::Uuid;

const APPLE_BASE_SUFFIX: &str = "-0000-1000-8000-0026BB765291";
const APPLE_BASE: u128 = 0x0000_0000_0000_1000_8000_0026_BB76_5291;

/// Type UUID of a characteristic or service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HapType(pub Uuid);

impl HapType {
    /// Apple-defined type from its short code (e.g. `0x4A` for Thermostat).
    pub fn apple(short: u32) -> Self {
        Self(Uuid::from_u128(APPLE_BASE | (short as u128) << 96))
    }

    /// Parse from a full UUID or an Apple short code.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let s = s.trim();
        if s.len() <= 8 {
            let short = u32::from_str_radix(s, 16)
                .map_err(|_| ParseError::InvalidHex(s.to_string()))?;
            return Ok(Self::apple(short));
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ParseError::InvalidFormat(format!("invalid type uuid {}: {}", s, e)))
    }

    pub fn is_apple_defined(&self) -> bool {
        self.0
            .hyphenated()
            .to_string()
            .to_uppercase()
            .ends_with(APPLE_BASE_SUFFIX)
    }

    /// Wire representation: short code for Apple types, full UUID otherwise.
    pub fn to_short_string(&self) -> String {
        let full = self.0.hyphenated().to_string().to_uppercase();
        if self.is_apple_defined() {
            let head = full[..8].trim_start_matches('0');
            if head.is_empty() {
                "0".to_string()
            } else {
                head.to_string()
            }
        } else {
            full
        }
    }
}

impl fmt::Display for HapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_short_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apple_types_use_short_form() {
        assert_eq!(HapType::apple(0x3E).to_short_string(), "3E");
        assert_eq!(HapType::apple(0x4A).to_short_string(), "4A");
        assert_eq!(HapType::apple(0x121).to_short_string(), "121");
    }

    #[test]
    fn parse_full_apple_uuid() {
        let t = HapType::parse("0000004A-0000-1000-8000-0026BB765291").unwrap();
        assert_eq!(t, HapType::apple(0x4A));
        assert!(t.is_apple_defined());
    }

    #[test]
    fn parse_short_code() {
        assert_eq!(HapType::parse("35").unwrap(), HapType::apple(0x35));
    }

    #[test]
    fn custom_types_use_full_form() {
        let t = HapType::parse("b7ddb9a3-54bb-4572-91d2-f1f5b0510f8c").unwrap();
        assert!(!t.is_apple_defined());
        assert_eq!(t.to_short_string(), "B7DDB9A3-54BB-4572-91D2-F1F5B0510F8C");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(HapType::parse("zz").is_err());
        assert!(HapType::parse("not-a-uuid-at-all-really").is_err());
    }
}
