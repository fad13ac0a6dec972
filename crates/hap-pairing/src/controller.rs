//! Controller side of pairing, for tests and tooling.
//!
//! Drives pair-setup and pair-verify against an accessory the way an iOS
//! controller does, and builds `/pairings` requests. Built with the
//! `controller` feature.

use hap_core::error::{PairingError, Result};
use hap_crypto::{
    chacha::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_string},
    curve25519::{public_key_from_slice, EcdhKeyPair},
    ed25519, hkdf,
    keys::{EncryptionKey, SessionKeys, SharedSecret},
    srp::{SrpChallenge, SrpClient, SrpProof, PAIR_SETUP_IDENTITY, SALT_BYTES},
    tlv::{Method, Tlv8, TlvType},
    IdentityKeyPair,
};

/// Controller identity: a stable pairing identifier plus its LTSK.
///
/// The same identifier must be used in pair-setup M5 and every later
/// pair-verify M3.
#[derive(Clone)]
pub struct ControllerIdentity {
    id: String,
    keypair: IdentityKeyPair,
}

impl ControllerIdentity {
    /// Fresh identity with a UUID-shaped id derived from the public key.
    pub fn generate() -> Self {
        Self::from_keypair(IdentityKeyPair::generate())
    }

    pub fn from_keypair(keypair: IdentityKeyPair) -> Self {
        let pk = hex::encode_upper(&keypair.public_key()[..16]);
        let id = format!(
            "{}-{}-{}-{}-{}",
            &pk[0..8],
            &pk[8..12],
            &pk[12..16],
            &pk[16..20],
            &pk[20..32]
        );
        Self { id, keypair }
    }

    pub fn with_id(keypair: IdentityKeyPair, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            keypair,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public_key()
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.keypair.sign(message)
    }
}

/// What the controller learns about the accessory from M6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryPairing {
    pub identifier: String,
    pub public_key: [u8; 32],
}

fn check_error(tlv: &Tlv8) -> Result<()> {
    match tlv.error() {
        Some(0x02) => Err(PairingError::AuthFailure.into()),
        Some(0x04) => Err(PairingError::MaxPeers.into()),
        Some(0x05) => Err(PairingError::MaxTries.into()),
        Some(0x06) => Err(PairingError::Unavailable.into()),
        Some(0x07) => Err(PairingError::Busy.into()),
        Some(_) => Err(PairingError::Protocol(
            tlv.error_description().unwrap_or_default(),
        )
        .into()),
        None => Ok(()),
    }
}

fn expect_state(tlv: &Tlv8, expected: u8) -> Result<()> {
    check_error(tlv)?;
    match tlv.state() {
        Some(s) if s == expected => Ok(()),
        actual => Err(PairingError::StateMismatch {
            expected,
            actual: actual.unwrap_or(0),
        }
        .into()),
    }
}

/// Controller-side pair-setup.
pub struct PairSetupClient {
    identity: ControllerIdentity,
    srp: SrpClient,
    proof: Option<SrpProof>,
    session_key: Option<EncryptionKey>,
}

impl PairSetupClient {
    pub fn new(identity: ControllerIdentity, setup_code: &str) -> Self {
        Self {
            identity,
            srp: SrpClient::new(PAIR_SETUP_IDENTITY, setup_code.as_bytes()),
            proof: None,
            session_key: None,
        }
    }

    pub fn m1(&self) -> Vec<u8> {
        Tlv8::pair_setup_m1().encode()
    }

    /// M2 -> M3.
    pub fn m3(&mut self, m2: &[u8]) -> Result<Vec<u8>> {
        let tlv = Tlv8::parse(m2)?;
        expect_state(&tlv, 2)?;

        let salt: [u8; SALT_BYTES] = tlv
            .get(TlvType::Salt)
            .ok_or(PairingError::MissingTlv(TlvType::Salt as u8))?
            .try_into()
            .map_err(|_| PairingError::Protocol("salt is not 16 bytes".into()))?;
        let server_public_key = tlv
            .get(TlvType::PublicKey)
            .ok_or(PairingError::MissingTlv(TlvType::PublicKey as u8))?
            .to_vec();

        let proof = self.srp.process_challenge(&SrpChallenge {
            salt,
            server_public_key,
        })?;

        let mut m3 = Tlv8::with_state(3);
        m3.set(TlvType::PublicKey, self.srp.public_key());
        m3.set(TlvType::Proof, proof.client_proof.clone());
        self.proof = Some(proof);
        Ok(m3.encode())
    }

    /// M4 -> M5.
    pub fn m5(&mut self, m4: &[u8]) -> Result<Vec<u8>> {
        let tlv = Tlv8::parse(m4)?;
        expect_state(&tlv, 4)?;
        let proof = self
            .proof
            .as_ref()
            .ok_or(PairingError::StateMismatch { expected: 3, actual: 4 })?;

        let server_proof = tlv
            .get(TlvType::Proof)
            .ok_or(PairingError::MissingTlv(TlvType::Proof as u8))?;
        if !self
            .srp
            .verify_server_proof(server_proof, &proof.expected_server_proof)
        {
            return Err(PairingError::AuthFailure.into());
        }

        let shared = SharedSecret::new(proof.shared_secret.clone());
        let session_key = SessionKeys::derive_pair_setup_key(&shared)?;

        let controller_x = hkdf::derive_controller_sign_key(shared.as_bytes())?;
        let mut info = Vec::new();
        info.extend_from_slice(&controller_x);
        info.extend_from_slice(self.identity.id().as_bytes());
        info.extend_from_slice(&self.identity.public_key());
        let signature = self.identity.sign(&info);

        let mut sub = Tlv8::new();
        sub.set(TlvType::Identifier, self.identity.id().as_bytes().to_vec());
        sub.set(TlvType::PublicKey, self.identity.public_key().to_vec());
        sub.set(TlvType::Signature, signature.to_vec());
        let encrypted = encrypt_with_nonce(
            session_key.as_bytes(),
            &nonce_from_string(b"PS-Msg05"),
            &sub.encode(),
        )?;

        let mut m5 = Tlv8::with_state(5);
        m5.set(TlvType::EncryptedData, encrypted);
        self.session_key = Some(session_key);
        Ok(m5.encode())
    }

    /// Check M6 and return the accessory's long-term identity.
    pub fn finish(&mut self, m6: &[u8]) -> Result<AccessoryPairing> {
        let tlv = Tlv8::parse(m6)?;
        expect_state(&tlv, 6)?;
        let (proof, session_key) = match (&self.proof, &self.session_key) {
            (Some(p), Some(k)) => (p, k),
            _ => return Err(PairingError::StateMismatch { expected: 5, actual: 6 }.into()),
        };

        let encrypted = tlv
            .get(TlvType::EncryptedData)
            .ok_or(PairingError::MissingTlv(TlvType::EncryptedData as u8))?;
        let decrypted = decrypt_with_nonce(
            session_key.as_bytes(),
            &nonce_from_string(b"PS-Msg06"),
            encrypted,
        )?;
        let sub = Tlv8::parse(&decrypted)?;

        let identifier = sub
            .get(TlvType::Identifier)
            .ok_or(PairingError::MissingTlv(TlvType::Identifier as u8))?;
        let ltpk = sub
            .get(TlvType::PublicKey)
            .ok_or(PairingError::MissingTlv(TlvType::PublicKey as u8))?;
        let signature = sub
            .get(TlvType::Signature)
            .ok_or(PairingError::MissingTlv(TlvType::Signature as u8))?;

        let accessory_x = hkdf::derive_accessory_sign_key(&proof.shared_secret)?;
        let mut info = Vec::new();
        info.extend_from_slice(&accessory_x);
        info.extend_from_slice(identifier);
        info.extend_from_slice(ltpk);
        ed25519::verify_slices(ltpk, &info, signature)?;

        Ok(AccessoryPairing {
            identifier: String::from_utf8_lossy(identifier).into_owned(),
            public_key: public_key_from_slice(ltpk)?,
        })
    }
}

/// Controller-side pair-verify.
pub struct PairVerifyClient {
    identity: ControllerIdentity,
    accessory_ltpk: [u8; 32],
    ecdh: Option<EcdhKeyPair>,
    ecdh_public: [u8; 32],
    shared: Option<SharedSecret>,
}

impl PairVerifyClient {
    pub fn new(identity: ControllerIdentity, accessory_ltpk: [u8; 32]) -> Self {
        let ecdh = EcdhKeyPair::generate();
        Self {
            identity,
            accessory_ltpk,
            ecdh_public: ecdh.public_key(),
            ecdh: Some(ecdh),
            shared: None,
        }
    }

    pub fn m1(&self) -> Vec<u8> {
        Tlv8::pair_verify_m1(&self.ecdh_public).encode()
    }

    /// M2 -> M3.
    pub fn m3(&mut self, m2: &[u8]) -> Result<Vec<u8>> {
        let tlv = Tlv8::parse(m2)?;
        expect_state(&tlv, 2)?;

        let accessory_public = public_key_from_slice(
            tlv.get(TlvType::PublicKey)
                .ok_or(PairingError::MissingTlv(TlvType::PublicKey as u8))?,
        )?;
        let ecdh = self
            .ecdh
            .take()
            .ok_or(PairingError::StateMismatch { expected: 1, actual: 2 })?;
        let shared = SharedSecret::new(ecdh.diffie_hellman(&accessory_public)?.to_vec());
        let key = SessionKeys::derive_pair_verify_key(&shared)?;

        let encrypted = tlv
            .get(TlvType::EncryptedData)
            .ok_or(PairingError::MissingTlv(TlvType::EncryptedData as u8))?;
        let sub = Tlv8::parse(&decrypt_with_nonce(
            key.as_bytes(),
            &nonce_from_string(b"PV-Msg02"),
            encrypted,
        )?)?;
        let accessory_id = sub
            .get(TlvType::Identifier)
            .ok_or(PairingError::MissingTlv(TlvType::Identifier as u8))?;
        let signature = sub
            .get(TlvType::Signature)
            .ok_or(PairingError::MissingTlv(TlvType::Signature as u8))?;

        let mut info = Vec::new();
        info.extend_from_slice(&accessory_public);
        info.extend_from_slice(accessory_id);
        info.extend_from_slice(&self.ecdh_public);
        ed25519::verify_slices(&self.accessory_ltpk, &info, signature)?;

        let mut info = Vec::new();
        info.extend_from_slice(&self.ecdh_public);
        info.extend_from_slice(self.identity.id().as_bytes());
        info.extend_from_slice(&accessory_public);
        let signature = self.identity.sign(&info);

        let mut sub = Tlv8::new();
        sub.set(TlvType::Identifier, self.identity.id().as_bytes().to_vec());
        sub.set(TlvType::Signature, signature.to_vec());
        let encrypted = encrypt_with_nonce(
            key.as_bytes(),
            &nonce_from_string(b"PV-Msg03"),
            &sub.encode(),
        )?;

        let mut m3 = Tlv8::with_state(3);
        m3.set(TlvType::EncryptedData, encrypted);
        self.shared = Some(shared);
        Ok(m3.encode())
    }

    /// Check M4 and derive the controller's session keys.
    pub fn finish(&mut self, m4: &[u8]) -> Result<SessionKeys> {
        let tlv = Tlv8::parse(m4)?;
        expect_state(&tlv, 4)?;
        let shared = self
            .shared
            .take()
            .ok_or(PairingError::StateMismatch { expected: 3, actual: 4 })?;
        Ok(SessionKeys::derive_controller_keys(&shared)?)
    }
}

/// `/pairings` Add request.
pub fn add_pairing_request(identifier: &str, public_key: &[u8; 32], permissions: u8) -> Vec<u8> {
    let mut tlv = Tlv8::with_state(1);
    tlv.set(TlvType::Method, vec![Method::AddPairing as u8]);
    tlv.set(TlvType::Identifier, identifier.as_bytes().to_vec());
    tlv.set(TlvType::PublicKey, public_key.to_vec());
    tlv.set(TlvType::Permissions, vec![permissions]);
    tlv.encode()
}

/// `/pairings` Remove request.
pub fn remove_pairing_request(identifier: &str) -> Vec<u8> {
    let mut tlv = Tlv8::with_state(1);
    tlv.set(TlvType::Method, vec![Method::RemovePairing as u8]);
    tlv.set(TlvType::Identifier, identifier.as_bytes().to_vec());
    tlv.encode()
}

/// `/pairings` List request.
pub fn list_pairings_request() -> Vec<u8> {
    let mut tlv = Tlv8::with_state(1);
    tlv.set(TlvType::Method, vec![Method::ListPairings as u8]);
    tlv.encode()
}
