//! # hap-pairing
//!
//! HomeKit pairing for the accessory side.
//!
//! This crate implements:
//! - Pair-setup (SRP-6a over the setup code, M1-M6)
//! - Pair-verify (Curve25519 + Ed25519, M1-M4)
//! - `/pairings` add, remove and list
//! - Persistent pairing and identity storage
//! - Encrypted session framing for verified connections

mod channel;
#[cfg(any(test, feature = "controller"))]
pub mod controller;
mod identity;
mod manager;
mod pair_setup;
mod pair_verify;
mod pairings;
mod setup_code;
mod store;

pub use channel::EncryptedChannel;
pub use identity::AccessoryIdentity;
pub use manager::{PairingManager, MAX_AUTH_ATTEMPTS};
pub use pair_setup::PairSetup;
pub use pair_verify::{PairVerify, VerifiedSession, VerifyStep};
pub use pairings::{handle_pairings, PairingsOutcome};
pub use setup_code::SetupCode;
pub use store::{FileStore, MemoryStore, PairingRecord, PairingStore, MAX_PAIRINGS, PERMISSION_ADMIN};
