//! Long-term accessory identity.
//!
//! Created once on first start and persisted through the pairing store:
//! the device id doubles as the accessory pairing identifier, the Ed25519
//! key pair signs pair-setup M6 and pair-verify M2, and the configuration
//! number is bumped whenever the attribute database changes shape.

use hap_core::error::StorageError;
use hap_core::DeviceId;
use hap_crypto::IdentityKeyPair;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

const SETUP_ID_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Accessory identity and configuration state.
#[derive(Debug, Clone)]
pub struct AccessoryIdentity {
    device_id: DeviceId,
    keypair: IdentityKeyPair,
    setup_id: String,
    config_number: u32,
    fingerprint: Option<String>,
}

/// On-disk form, with the LTSK seed hex-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredIdentity {
    device_id: DeviceId,
    ltsk: String,
    setup_id: String,
    config_number: u32,
    #[serde(default)]
    fingerprint: Option<String>,
}

impl AccessoryIdentity {
    /// Fresh identity with random device id, key pair and setup id.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut id = [0u8; 6];
        rng.fill_bytes(&mut id);
        let setup_id = (0..4)
            .map(|_| SETUP_ID_ALPHABET[rng.gen_range(0..SETUP_ID_ALPHABET.len())] as char)
            .collect();
        Self {
            device_id: DeviceId::from_random(id),
            keypair: IdentityKeyPair::generate(),
            setup_id,
            config_number: 1,
            fingerprint: None,
        }
    }

    /// Build from known parts (tests, migrations).
    pub fn from_parts(device_id: DeviceId, keypair: IdentityKeyPair, setup_id: impl Into<String>) -> Self {
        Self {
            device_id,
            keypair,
            setup_id: setup_id.into(),
            config_number: 1,
            fingerprint: None,
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Accessory pairing identifier sent in M6 and pair-verify M2.
    pub fn pairing_id(&self) -> String {
        self.device_id.to_mac_string()
    }

    pub fn keypair(&self) -> &IdentityKeyPair {
        &self.keypair
    }

    pub fn setup_id(&self) -> &str {
        &self.setup_id
    }

    pub fn set_setup_id(&mut self, setup_id: impl Into<String>) {
        self.setup_id = setup_id.into();
    }

    /// Current `c#`.
    pub fn config_number(&self) -> u32 {
        self.config_number
    }

    /// Record the fingerprint of the attribute database.
    ///
    /// Bumps the configuration number when the fingerprint differs from the
    /// one it was issued for; returns whether it changed. `c#` wraps from
    /// 65535 back to 1.
    pub fn update_fingerprint(&mut self, fingerprint: &str) -> bool {
        match &self.fingerprint {
            Some(current) if current == fingerprint => false,
            None => {
                self.fingerprint = Some(fingerprint.to_string());
                true
            }
            Some(_) => {
                self.config_number = if self.config_number >= 65535 {
                    1
                } else {
                    self.config_number + 1
                };
                self.fingerprint = Some(fingerprint.to_string());
                true
            }
        }
    }

    pub(crate) fn to_stored(&self) -> StoredIdentity {
        StoredIdentity {
            device_id: self.device_id,
            ltsk: hex::encode(self.keypair.seed()),
            setup_id: self.setup_id.clone(),
            config_number: self.config_number,
            fingerprint: self.fingerprint.clone(),
        }
    }

    pub(crate) fn from_stored(stored: StoredIdentity) -> Result<Self, StorageError> {
        let seed = hex::decode(&stored.ltsk)
            .map_err(|e| StorageError::Corrupt(format!("accessory ltsk: {}", e)))?;
        let keypair = IdentityKeyPair::from_seed_slice(&seed)
            .map_err(|e| StorageError::Corrupt(format!("accessory ltsk: {}", e)))?;
        Ok(Self {
            device_id: stored.device_id,
            keypair,
            setup_id: stored.setup_id,
            config_number: stored.config_number.max(1),
            fingerprint: stored.fingerprint,
        })
    }
}
