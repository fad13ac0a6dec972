//! Session key types and derivation.

use crate::hkdf;
use hap_core::error::CryptoError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Shared secret from SRP or ECDH.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(pub Vec<u8>);

/// 32-byte encryption key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey(pub [u8; 32]);

/// Control channel keys as seen from one end of the connection.
#[derive(ZeroizeOnDrop)]
pub struct SessionKeys {
    /// Key for encrypting data we send.
    pub write_key: EncryptionKey,
    /// Key for decrypting data we receive.
    pub read_key: EncryptionKey,
}

impl SharedSecret {
    /// Create from raw bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl EncryptionKey {
    /// Create from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl SessionKeys {
    /// Derive the accessory's control keys from the pair-verify secret.
    ///
    /// The accessory encrypts with the "Read" key (the controller reads
    /// what we write) and decrypts with the "Write" key.
    pub fn derive_accessory_keys(shared_secret: &SharedSecret) -> Result<Self, CryptoError> {
        let write_key = hkdf::derive_control_read_key(shared_secret.as_bytes())?;
        let read_key = hkdf::derive_control_write_key(shared_secret.as_bytes())?;

        Ok(Self {
            write_key: EncryptionKey(write_key),
            read_key: EncryptionKey(read_key),
        })
    }

    /// Derive the controller's control keys, the mirror image of
    /// [`SessionKeys::derive_accessory_keys`].
    pub fn derive_controller_keys(shared_secret: &SharedSecret) -> Result<Self, CryptoError> {
        let write_key = hkdf::derive_control_write_key(shared_secret.as_bytes())?;
        let read_key = hkdf::derive_control_read_key(shared_secret.as_bytes())?;

        Ok(Self {
            write_key: EncryptionKey(write_key),
            read_key: EncryptionKey(read_key),
        })
    }

    /// Derive the key protecting pair-setup M5/M6.
    pub fn derive_pair_setup_key(shared_secret: &SharedSecret) -> Result<EncryptionKey, CryptoError> {
        let key = hkdf::derive_pair_setup_key(shared_secret.as_bytes())?;
        Ok(EncryptionKey(key))
    }

    /// Derive the key protecting pair-verify M2/M3.
    pub fn derive_pair_verify_key(
        shared_secret: &SharedSecret,
    ) -> Result<EncryptionKey, CryptoError> {
        let key = hkdf::derive_pair_verify_key(shared_secret.as_bytes())?;
        Ok(EncryptionKey(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod shared_secret {
        use super::*;

        #[test]
        fn new_stores_bytes() {
            let bytes = vec![0x01, 0x02, 0x03, 0x04];
            let secret = SharedSecret::new(bytes.clone());
            assert_eq!(secret.as_bytes(), &bytes);
        }

        #[test]
        fn clone_produces_independent_copy() {
            let original = SharedSecret::new(vec![0x42u8; 32]);
            let cloned = original.clone();
            assert_eq!(original.as_bytes(), cloned.as_bytes());
        }
    }

    mod session_keys {
        use super::*;

        #[test]
        fn accessory_and_controller_keys_mirror() {
            let secret = SharedSecret::new(vec![0xABu8; 32]);
            let accessory = SessionKeys::derive_accessory_keys(&secret).unwrap();
            let controller = SessionKeys::derive_controller_keys(&secret).unwrap();

            assert_eq!(accessory.write_key.as_bytes(), controller.read_key.as_bytes());
            assert_eq!(accessory.read_key.as_bytes(), controller.write_key.as_bytes());
            assert_ne!(accessory.write_key.as_bytes(), accessory.read_key.as_bytes());
        }

        #[test]
        fn different_secrets_produce_different_keys() {
            let keys1 = SessionKeys::derive_accessory_keys(&SharedSecret::new(vec![1u8; 32])).unwrap();
            let keys2 = SessionKeys::derive_accessory_keys(&SharedSecret::new(vec![2u8; 32])).unwrap();

            assert_ne!(keys1.write_key.as_bytes(), keys2.write_key.as_bytes());
            assert_ne!(keys1.read_key.as_bytes(), keys2.read_key.as_bytes());
        }

        #[test]
        fn pair_setup_and_verify_keys_are_different() {
            let secret = SharedSecret::new(vec![0xABu8; 32]);
            let setup = SessionKeys::derive_pair_setup_key(&secret).unwrap();
            let verify = SessionKeys::derive_pair_verify_key(&secret).unwrap();
            assert_ne!(setup.as_bytes(), verify.as_bytes());
        }
    }
}
