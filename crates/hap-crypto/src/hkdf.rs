//! HKDF-SHA512 key derivation for pairing and session keys.

use hap_core::error::CryptoError;

use hkdf::Hkdf;
use sha2::Sha512;

/// Derive key using HKDF-SHA512.
///
/// # Arguments
/// * `ikm` - Input key material
/// * `salt` - Salt value (can be empty)
/// * `info` - Context/application-specific info
/// * `length` - Desired output length in bytes
pub fn derive_key(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    length: usize,
) -> Result<Vec<u8>, CryptoError> {
    let hk = Hkdf::<Sha512>::new(Some(salt), ikm);
    let mut okm = vec![0u8; length];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation("HKDF expand failed".to_string()))?;
    Ok(okm)
}

/// Derive a fixed-size key.
pub fn derive_key_32(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha512>::new(Some(salt), ikm);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation("HKDF expand failed".to_string()))?;
    Ok(okm)
}

/// Salt and info strings used by HomeKit pairing.
pub mod constants {
    pub const PAIR_SETUP_ENCRYPT_SALT: &[u8] = b"Pair-Setup-Encrypt-Salt";
    pub const PAIR_SETUP_ENCRYPT_INFO: &[u8] = b"Pair-Setup-Encrypt-Info";

    pub const PAIR_SETUP_CONTROLLER_SIGN_SALT: &[u8] = b"Pair-Setup-Controller-Sign-Salt";
    pub const PAIR_SETUP_CONTROLLER_SIGN_INFO: &[u8] = b"Pair-Setup-Controller-Sign-Info";

    pub const PAIR_SETUP_ACCESSORY_SIGN_SALT: &[u8] = b"Pair-Setup-Accessory-Sign-Salt";
    pub const PAIR_SETUP_ACCESSORY_SIGN_INFO: &[u8] = b"Pair-Setup-Accessory-Sign-Info";

    pub const PAIR_VERIFY_ENCRYPT_SALT: &[u8] = b"Pair-Verify-Encrypt-Salt";
    pub const PAIR_VERIFY_ENCRYPT_INFO: &[u8] = b"Pair-Verify-Encrypt-Info";

    pub const CONTROL_SALT: &[u8] = b"Control-Salt";
    pub const CONTROL_WRITE_KEY_INFO: &[u8] = b"Control-Write-Encryption-Key";
    pub const CONTROL_READ_KEY_INFO: &[u8] = b"Control-Read-Encryption-Key";
}

/// Derive pair-setup encryption key (M5/M6 sub-TLVs).
pub fn derive_pair_setup_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_SETUP_ENCRYPT_SALT,
        constants::PAIR_SETUP_ENCRYPT_INFO,
    )
}

/// Derive the controller-side signing prefix (iOSDeviceX).
pub fn derive_controller_sign_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_SETUP_CONTROLLER_SIGN_SALT,
        constants::PAIR_SETUP_CONTROLLER_SIGN_INFO,
    )
}

/// Derive the accessory-side signing prefix (AccessoryX).
pub fn derive_accessory_sign_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_SETUP_ACCESSORY_SIGN_SALT,
        constants::PAIR_SETUP_ACCESSORY_SIGN_INFO,
    )
}

/// Derive pair-verify encryption key.
pub fn derive_pair_verify_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_VERIFY_ENCRYPT_SALT,
        constants::PAIR_VERIFY_ENCRYPT_INFO,
    )
}

/// Derive control channel write key (controller to accessory).
pub fn derive_control_write_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::CONTROL_SALT,
        constants::CONTROL_WRITE_KEY_INFO,
    )
}

/// Derive control channel read key (accessory to controller).
pub fn derive_control_read_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::CONTROL_SALT,
        constants::CONTROL_READ_KEY_INFO,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    mod derive_key {
        use super::*;

        #[test]
        fn derives_requested_length() {
            let ikm = [0x0bu8; 22];
            let salt = [0x00u8; 13];

            assert_eq!(derive_key(&ikm, &salt, &[], 16).unwrap().len(), 16);
            assert_eq!(derive_key(&ikm, &salt, &[], 64).unwrap().len(), 64);
        }

        #[test]
        fn different_salts_produce_different_keys() {
            let ikm = [0x0bu8; 22];
            let key1 = derive_key(&ikm, b"salt1", &[], 32).unwrap();
            let key2 = derive_key(&ikm, b"salt2", &[], 32).unwrap();
            assert_ne!(key1, key2);
        }

        #[test]
        fn oversized_output_is_an_error() {
            // HKDF-SHA512 caps output at 255 * 64 bytes.
            let err = derive_key(&[1u8; 32], b"salt", b"info", 255 * 64 + 1).unwrap_err();
            assert!(matches!(err, CryptoError::KeyDerivation(_)));
        }

        #[test]
        fn fixed_size_matches_variable_size() {
            let ikm = [0x42u8; 64];
            let fixed = derive_key_32(&ikm, b"s", b"i").unwrap();
            let var = derive_key(&ikm, b"s", b"i", 32).unwrap();
            assert_eq!(fixed.as_slice(), var.as_slice());
        }
    }

    mod pairing_derivation {
        use super::*;

        #[test]
        fn every_context_produces_a_distinct_key() {
            let secret = [0xABu8; 64];
            let keys = [
                derive_pair_setup_key(&secret).unwrap(),
                derive_controller_sign_key(&secret).unwrap(),
                derive_accessory_sign_key(&secret).unwrap(),
                derive_pair_verify_key(&secret).unwrap(),
                derive_control_write_key(&secret).unwrap(),
                derive_control_read_key(&secret).unwrap(),
            ];
            for (i, a) in keys.iter().enumerate() {
                for b in &keys[i + 1..] {
                    assert_ne!(a, b);
                }
            }
        }

        #[test]
        fn pair_setup_key_uses_published_strings() {
            let secret = [0x01u8; 64];
            let expected =
                derive_key_32(&secret, b"Pair-Setup-Encrypt-Salt", b"Pair-Setup-Encrypt-Info")
                    .unwrap();
            assert_eq!(derive_pair_setup_key(&secret).unwrap(), expected);
        }
    }
}
