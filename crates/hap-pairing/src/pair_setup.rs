//! Accessory side of HomeKit pair-setup (M1-M6).
//!
//! SRP-6a over the setup code establishes a shared secret; the controller
//! then proves ownership of its long-term key (M5) and the accessory
//! answers with its own (M6). The controller is stored as an admin.

use crate::manager::PairingManager;
use crate::store::{PairingRecord, MAX_PAIRINGS, PERMISSION_ADMIN};
use hap_core::error::{CryptoError, PairingError};
use hap_crypto::{
    chacha::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_string},
    ed25519,
    hkdf,
    keys::{EncryptionKey, SessionKeys, SharedSecret},
    srp::{SrpServer, PAIR_SETUP_IDENTITY},
    tlv::{Method, Tlv8, TlvType},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Nonce for pair-setup M5 decryption.
const PS_MSG05_NONCE: &[u8] = b"PS-Msg05";
/// Nonce for pair-setup M6 encryption.
const PS_MSG06_NONCE: &[u8] = b"PS-Msg06";

type StepResult = std::result::Result<Tlv8, PairingError>;

enum SetupState {
    Idle,
    AwaitingM3 {
        srp: SrpServer,
    },
    AwaitingM5 {
        shared_secret: SharedSecret,
        session_key: EncryptionKey,
    },
}

/// Pair-setup handler for one connection.
///
/// Dropping it releases the accessory-wide setup claim, so a controller
/// that disconnects mid-handshake does not block others.
pub struct PairSetup {
    manager: Arc<PairingManager>,
    connection: u64,
    state: SetupState,
}

impl PairSetup {
    pub fn new(manager: Arc<PairingManager>, connection: u64) -> Self {
        Self {
            manager,
            connection,
            state: SetupState::Idle,
        }
    }

    /// Handle one `/pair-setup` request body, returning the TLV response.
    ///
    /// Errors never escape: they become `{State, Error}` responses and reset
    /// the handshake.
    pub async fn handle(&mut self, body: &[u8]) -> Vec<u8> {
        let request = match Tlv8::parse(body) {
            Ok(tlv) => tlv,
            Err(e) => {
                warn!(connection = self.connection, error = %e, "Malformed pair-setup request");
                self.reset();
                return Tlv8::error_response(2, PairingError::TlvParse(e.to_string()).tlv_code())
                    .encode();
            }
        };

        let state = request.state().unwrap_or(0);
        let result = match state {
            1 => self.handle_m1(&request),
            3 => self.handle_m3(&request),
            5 => self.handle_m5(&request).await,
            actual => Err(PairingError::StateMismatch {
                expected: self.expected_state(),
                actual,
            }),
        };

        match result {
            Ok(response) => response.encode(),
            Err(e) => {
                warn!(connection = self.connection, state, error = %e, "Pair-setup failed");
                self.reset();
                Tlv8::error_response(state.saturating_add(1), e.tlv_code()).encode()
            }
        }
    }

    fn expected_state(&self) -> u8 {
        match self.state {
            SetupState::Idle => 1,
            SetupState::AwaitingM3 { .. } => 3,
            SetupState::AwaitingM5 { .. } => 5,
        }
    }

    fn reset(&mut self) {
        self.state = SetupState::Idle;
        self.manager.end_setup(self.connection);
    }

    /// M1 -> M2: claim setup, start SRP, send salt and B.
    fn handle_m1(&mut self, request: &Tlv8) -> StepResult {
        let method = request.method().unwrap_or(Method::PairSetup as u8);
        match Method::from_byte(method) {
            Some(Method::PairSetup) | Some(Method::PairSetupWithAuth) => {}
            _ => return Err(PairingError::UnsupportedMethod(method)),
        }

        self.manager.begin_setup(self.connection)?;

        let srp = SrpServer::new(
            PAIR_SETUP_IDENTITY,
            self.manager.setup_code().expose().as_bytes(),
        );

        let mut response = Tlv8::with_state(2);
        response.set(TlvType::PublicKey, srp.public_key());
        response.set(TlvType::Salt, srp.salt().to_vec());

        self.state = SetupState::AwaitingM3 { srp };
        debug!(connection = self.connection, "Sent pair-setup M2");
        Ok(response)
    }

    /// M3 -> M4: check the controller proof, answer with ours.
    fn handle_m3(&mut self, request: &Tlv8) -> StepResult {
        let srp = match &self.state {
            SetupState::AwaitingM3 { srp } => srp,
            _ => {
                return Err(PairingError::StateMismatch {
                    expected: self.expected_state(),
                    actual: 3,
                })
            }
        };

        let client_public = request
            .get(TlvType::PublicKey)
            .ok_or(PairingError::MissingTlv(TlvType::PublicKey as u8))?;
        let client_proof = request
            .get(TlvType::Proof)
            .ok_or(PairingError::MissingTlv(TlvType::Proof as u8))?;

        let session = match srp.verify_client(client_public, client_proof) {
            Ok(session) => session,
            Err(CryptoError::ProofMismatch) => {
                let attempts = self.manager.record_failure();
                warn!(connection = self.connection, attempts, "Incorrect setup code");
                return Err(PairingError::AuthFailure);
            }
            Err(e) => {
                warn!(connection = self.connection, error = %e, "Rejected SRP public key");
                return Err(PairingError::AuthFailure);
            }
        };

        let shared_secret = SharedSecret::new(session.shared_secret.clone());
        let session_key = SessionKeys::derive_pair_setup_key(&shared_secret)
            .map_err(|e| PairingError::Protocol(e.to_string()))?;

        let mut response = Tlv8::with_state(4);
        response.set(TlvType::Proof, session.server_proof.clone());

        self.state = SetupState::AwaitingM5 {
            shared_secret,
            session_key,
        };
        debug!(connection = self.connection, "Sent pair-setup M4");
        Ok(response)
    }

    /// M5 -> M6: verify and store the controller, send our identity.
    async fn handle_m5(&mut self, request: &Tlv8) -> StepResult {
        let (shared_secret, session_key) = match &self.state {
            SetupState::AwaitingM5 {
                shared_secret,
                session_key,
            } => (shared_secret.clone(), session_key.clone()),
            _ => {
                return Err(PairingError::StateMismatch {
                    expected: self.expected_state(),
                    actual: 5,
                })
            }
        };

        let encrypted = request
            .get(TlvType::EncryptedData)
            .ok_or(PairingError::MissingTlv(TlvType::EncryptedData as u8))?;
        let decrypted = decrypt_with_nonce(
            session_key.as_bytes(),
            &nonce_from_string(PS_MSG05_NONCE),
            encrypted,
        )
        .map_err(|_| PairingError::AuthFailure)?;
        let inner = Tlv8::parse(&decrypted).map_err(|e| PairingError::TlvParse(e.to_string()))?;

        let controller_id = inner
            .get(TlvType::Identifier)
            .ok_or(PairingError::MissingTlv(TlvType::Identifier as u8))?;
        let controller_ltpk = inner
            .get(TlvType::PublicKey)
            .ok_or(PairingError::MissingTlv(TlvType::PublicKey as u8))?;
        let signature = inner
            .get(TlvType::Signature)
            .ok_or(PairingError::MissingTlv(TlvType::Signature as u8))?;

        // iOSDeviceX || iOSDevicePairingID || iOSDeviceLTPK
        let controller_x = hkdf::derive_controller_sign_key(shared_secret.as_bytes())
            .map_err(|e| PairingError::Protocol(e.to_string()))?;
        let mut info = Vec::with_capacity(32 + controller_id.len() + controller_ltpk.len());
        info.extend_from_slice(&controller_x);
        info.extend_from_slice(controller_id);
        info.extend_from_slice(controller_ltpk);
        ed25519::verify_slices(controller_ltpk, &info, signature)
            .map_err(|_| PairingError::AuthFailure)?;

        let identifier = String::from_utf8(controller_id.to_vec())
            .map_err(|_| PairingError::TlvParse("controller identifier is not UTF-8".into()))?;
        let public_key: [u8; 32] = controller_ltpk
            .try_into()
            .map_err(|_| PairingError::AuthFailure)?;

        let store = self.manager.store();
        let existing = store
            .list()
            .await
            .map_err(|e| PairingError::Persist(e.to_string()))?;
        if existing.len() >= MAX_PAIRINGS {
            return Err(PairingError::MaxPeers);
        }
        store
            .put(PairingRecord::new(identifier.clone(), public_key, PERMISSION_ADMIN))
            .await
            .map_err(|e| PairingError::Persist(e.to_string()))?;
        info!(connection = self.connection, controller = %identifier, "Controller paired");

        // AccessoryX || AccessoryPairingID || AccessoryLTPK
        let identity = self.manager.identity();
        let accessory_id = identity.pairing_id();
        let accessory_ltpk = identity.keypair().public_key();
        let accessory_x = hkdf::derive_accessory_sign_key(shared_secret.as_bytes())
            .map_err(|e| PairingError::Protocol(e.to_string()))?;
        let mut info = Vec::with_capacity(32 + accessory_id.len() + 32);
        info.extend_from_slice(&accessory_x);
        info.extend_from_slice(accessory_id.as_bytes());
        info.extend_from_slice(&accessory_ltpk);
        let signature = identity.keypair().sign(&info);

        let mut sub = Tlv8::new();
        sub.set(TlvType::Identifier, accessory_id.into_bytes());
        sub.set(TlvType::PublicKey, accessory_ltpk.to_vec());
        sub.set(TlvType::Signature, signature.to_vec());
        let encrypted = encrypt_with_nonce(
            session_key.as_bytes(),
            &nonce_from_string(PS_MSG06_NONCE),
            &sub.encode(),
        )
        .map_err(|e| PairingError::Protocol(e.to_string()))?;

        let mut response = Tlv8::with_state(6);
        response.set(TlvType::EncryptedData, encrypted);

        self.reset();
        if let Err(e) = self.manager.refresh_paired().await {
            warn!(error = %e, "Could not refresh pairing status");
        }
        Ok(response)
    }
}

impl Drop for PairSetup {
    fn drop(&mut self) {
        self.manager.end_setup(self.connection);
    }
}
