//! # hap-crypto
//!
//! Cryptographic primitives for HomeKit Accessory Protocol pairing and
//! session security.
//!
//! This crate provides:
//! - SRP-6a (3072-bit) for pair-setup, accessory and controller roles
//! - Curve25519 ECDH for pair-verify key agreement
//! - Ed25519 for long-term identity signatures
//! - ChaCha20-Poly1305 for pairing sub-TLVs and the framed session channel
//! - HKDF-SHA512 for key derivation
//! - TLV8 encoding for pairing messages
//!
//! All secret material is zeroized on drop.

pub mod chacha;
pub mod curve25519;
pub mod ed25519;
pub mod hkdf;
pub mod keys;
pub mod srp;
pub mod tlv;

pub use chacha::ControlCipher;
pub use ed25519::IdentityKeyPair;
pub use keys::{EncryptionKey, SessionKeys, SharedSecret};
pub use tlv::{Method, Tlv8, TlvType};
