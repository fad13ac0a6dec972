//! Ed25519 long-term identity keys and signatures.

use hap_core::error::CryptoError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fmt;
use zeroize::ZeroizeOnDrop;

/// Long-term Ed25519 identity key pair (the accessory LTSK/LTPK).
#[derive(Clone, ZeroizeOnDrop)]
pub struct IdentityKeyPair {
    #[zeroize(skip)]
    public: [u8; 32],
    secret: [u8; 32], // Ed25519 seed (32 bytes, not expanded)
}

impl IdentityKeyPair {
    /// Generate a new random identity key pair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public = signing_key.verifying_key().to_bytes();
        let secret = signing_key.to_bytes();
        Self { public, secret }
    }

    /// Create from seed bytes (32 bytes).
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let public = signing_key.verifying_key().to_bytes();
        Self {
            public,
            secret: *seed,
        }
    }

    /// Create from a seed of unchecked length, e.g. read back from storage.
    pub fn from_seed_slice(seed: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; 32] = seed.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            actual: seed.len(),
        })?;
        Ok(Self::from_seed(&seed))
    }

    /// Get the public key (32 bytes).
    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Sign a message, returning 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        let signing_key = SigningKey::from_bytes(&self.secret);
        signing_key.sign(message).to_bytes()
    }

    /// Export the seed for storage (32 bytes).
    pub fn seed(&self) -> [u8; 32] {
        self.secret
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &hex::encode(self.public))
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Verify an Ed25519 signature.
pub fn verify(
    public_key: &[u8; 32],
    message: &[u8],
    signature: &[u8; 64],
) -> Result<(), CryptoError> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;

    let sig = Signature::from_bytes(signature);

    verifying_key
        .verify(message, &sig)
        .map_err(|_| CryptoError::SignatureInvalid)
}

/// Verify a signature whose key and signature come straight off the wire.
pub fn verify_slices(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let public_key: &[u8; 32] =
        public_key
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: public_key.len(),
            })?;
    let signature: &[u8; 64] = signature
        .try_into()
        .map_err(|_| CryptoError::SignatureInvalid)?;
    verify(public_key, message, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod key_generation {
        use super::*;

        #[test]
        fn generate_creates_unique_keys() {
            let kp1 = IdentityKeyPair::generate();
            let kp2 = IdentityKeyPair::generate();
            assert_ne!(kp1.public_key(), kp2.public_key());
        }

        #[test]
        fn seed_roundtrip() {
            let kp = IdentityKeyPair::generate();
            let restored = IdentityKeyPair::from_seed(&kp.seed());
            assert_eq!(kp.public_key(), restored.public_key());
        }

        #[test]
        fn from_seed_slice_checks_length() {
            let err = IdentityKeyPair::from_seed_slice(&[0u8; 31]).unwrap_err();
            assert!(matches!(
                err,
                CryptoError::InvalidKeyLength {
                    expected: 32,
                    actual: 31
                }
            ));
        }

        #[test]
        fn debug_output_redacts_secret() {
            let kp = IdentityKeyPair::from_seed(&[0xAB; 32]);
            let debug = format!("{:?}", kp);
            assert!(debug.contains("<redacted>"));
            assert!(!debug.contains(&hex::encode([0xAB; 32])));
        }
    }

    mod verification {
        use super::*;

        #[test]
        fn verify_accepts_valid_signature() {
            let kp = IdentityKeyPair::generate();
            let sig = kp.sign(b"AccessoryX");
            assert!(verify(&kp.public_key(), b"AccessoryX", &sig).is_ok());
        }

        #[test]
        fn verify_rejects_wrong_message() {
            let kp = IdentityKeyPair::generate();
            let sig = kp.sign(b"original");
            assert!(matches!(
                verify(&kp.public_key(), b"tampered", &sig),
                Err(CryptoError::SignatureInvalid)
            ));
        }

        #[test]
        fn verify_rejects_wrong_public_key() {
            let signer = IdentityKeyPair::generate();
            let other = IdentityKeyPair::generate();
            let sig = signer.sign(b"msg");
            assert!(verify(&other.public_key(), b"msg", &sig).is_err());
        }

        #[test]
        fn verify_slices_rejects_bad_lengths() {
            let kp = IdentityKeyPair::generate();
            let sig = kp.sign(b"msg");
            assert!(verify_slices(&kp.public_key(), b"msg", &sig).is_ok());
            assert!(verify_slices(&kp.public_key()[..31], b"msg", &sig).is_err());
            assert!(verify_slices(&kp.public_key(), b"msg", &sig[..63]).is_err());
        }
    }

    mod known_vectors {
        use super::*;

        #[test]
        fn rfc8032_test_vector_1() {
            // RFC 8032 Section 7.1, empty message
            let seed: [u8; 32] =
                hex::decode("9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60")
                    .unwrap()
                    .try_into()
                    .unwrap();
            let expected_public =
                hex::decode("d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a")
                    .unwrap();
            let expected_signature = hex::decode(
                "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e065224901555fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b"
            ).unwrap();

            let kp = IdentityKeyPair::from_seed(&seed);
            assert_eq!(kp.public_key().to_vec(), expected_public);

            let signature = kp.sign(b"");
            assert_eq!(signature.to_vec(), expected_signature);
            assert!(verify_slices(&expected_public, b"", &expected_signature).is_ok());
        }

        #[test]
        fn rfc8032_test_vector_2() {
            // RFC 8032 Section 7.1, single byte message 0x72
            let seed: [u8; 32] =
                hex::decode("4ccd089b28ff96da9db6c346ec114e0f5b8a319f35aba624da8cf6ed4fb8a6fb")
                    .unwrap()
                    .try_into()
                    .unwrap();
            let expected_signature = hex::decode(
                "92a009a9f0d4cab8720e820b5f642540a2b27b5416503f8fb3762223ebdb69da085ac1e43e15996e458f3613d0f11d8c387b2eaeb4302aeeb00d291612bb0c00"
            ).unwrap();

            let kp = IdentityKeyPair::from_seed(&seed);
            assert_eq!(kp.sign(&[0x72]).to_vec(), expected_signature);
        }
    }
}
