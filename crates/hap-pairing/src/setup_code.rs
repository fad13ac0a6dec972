//! The eight-digit setup code shown to the user.

use hap_core::error::PairingError;
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Codes HomeKit controllers refuse to accept.
const TRIVIAL_CODES: [&str; 12] = [
    "00000000", "11111111", "22222222", "33333333", "44444444", "55555555", "66666666",
    "77777777", "88888888", "99999999", "12345678", "87654321",
];

/// Setup code in `XXX-XX-XXX` form, used as the SRP password.
///
/// `Debug` never prints the digits.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SetupCode(String);

impl SetupCode {
    /// Parse `XXX-XX-XXX` or eight bare digits.
    pub fn parse(s: &str) -> Result<Self, PairingError> {
        let digits: String = match s.len() {
            10 => {
                let b = s.as_bytes();
                if b[3] != b'-' || b[6] != b'-' {
                    return Err(PairingError::InvalidSetupCode("expected XXX-XX-XXX"));
                }
                s.chars().filter(|c| *c != '-').collect()
            }
            8 => s.to_string(),
            _ => return Err(PairingError::InvalidSetupCode("expected 8 digits")),
        };

        if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PairingError::InvalidSetupCode("expected 8 digits"));
        }
        if TRIVIAL_CODES.contains(&digits.as_str()) {
            return Err(PairingError::InvalidSetupCode("code is too trivial"));
        }

        Ok(Self(format!("{}-{}-{}", &digits[..3], &digits[3..5], &digits[5..])))
    }

    /// Generate a random, non-trivial code.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let digits = format!("{:08}", rng.gen_range(0..100_000_000u32));
            if let Ok(code) = Self::parse(&digits) {
                return code;
            }
        }
    }

    /// The formatted code. Only for SRP and for showing to the user once.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl FromStr for SetupCode {
    type Err = PairingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for SetupCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SetupCode(***-**-***)")
    }
}
