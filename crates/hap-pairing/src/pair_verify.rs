//! Accessory side of HomeKit pair-verify (M1-M4).
//!
//! An ephemeral Curve25519 exchange, authenticated in both directions with
//! the long-term Ed25519 keys exchanged during pair-setup. On success both
//! ends derive the control channel keys from the ECDH secret.

use crate::manager::PairingManager;
use crate::store::PairingRecord;
use hap_core::error::PairingError;
use hap_crypto::{
    chacha::{decrypt_with_nonce, encrypt_with_nonce, nonce_from_string},
    curve25519::{public_key_from_slice, EcdhKeyPair},
    ed25519,
    keys::{EncryptionKey, SessionKeys, SharedSecret},
    tlv::{Tlv8, TlvType},
};
use std::sync::Arc;
use tracing::{debug, info, warn};

const PV_MSG02_NONCE: &[u8] = b"PV-Msg02";
const PV_MSG03_NONCE: &[u8] = b"PV-Msg03";

type StepResult = std::result::Result<Tlv8, PairingError>;

enum VerifyState {
    Idle,
    AwaitingM3 {
        shared_secret: SharedSecret,
        session_key: EncryptionKey,
        accessory_public: [u8; 32],
        controller_public: [u8; 32],
    },
}

/// Controller authenticated by a completed pair-verify.
pub struct VerifiedSession {
    /// Pairing record the controller proved ownership of.
    pub controller: PairingRecord,
    /// Accessory-side control channel keys.
    pub keys: SessionKeys,
}

/// Result of one pair-verify request.
pub struct VerifyStep {
    /// TLV body to send back, always in plaintext.
    pub response: Vec<u8>,
    /// Set once M4 is produced; the connection switches to encrypted
    /// framing after the response has been written.
    pub verified: Option<VerifiedSession>,
}

/// Pair-verify handler for one connection.
pub struct PairVerify {
    manager: Arc<PairingManager>,
    connection: u64,
    state: VerifyState,
}

impl PairVerify {
    pub fn new(manager: Arc<PairingManager>, connection: u64) -> Self {
        Self {
            manager,
            connection,
            state: VerifyState::Idle,
        }
    }

    /// Handle one `/pair-verify` request body.
    pub async fn handle(&mut self, body: &[u8]) -> VerifyStep {
        let request = match Tlv8::parse(body) {
            Ok(tlv) => tlv,
            Err(e) => {
                warn!(connection = self.connection, error = %e, "Malformed pair-verify request");
                self.state = VerifyState::Idle;
                return VerifyStep {
                    response: Tlv8::error_response(2, 0x01).encode(),
                    verified: None,
                };
            }
        };

        let state = request.state().unwrap_or(0);
        let result = match state {
            1 => self.handle_m1(&request).map(|tlv| (tlv, None)),
            3 => self
                .handle_m3(&request)
                .await
                .map(|(tlv, verified)| (tlv, Some(verified))),
            actual => Err(PairingError::StateMismatch {
                expected: match self.state {
                    VerifyState::Idle => 1,
                    VerifyState::AwaitingM3 { .. } => 3,
                },
                actual,
            }),
        };

        match result {
            Ok((response, verified)) => VerifyStep {
                response: response.encode(),
                verified,
            },
            Err(e) => {
                warn!(connection = self.connection, state, error = %e, "Pair-verify failed");
                self.state = VerifyState::Idle;
                VerifyStep {
                    response: Tlv8::error_response(state.saturating_add(1), e.tlv_code())
                        .encode(),
                    verified: None,
                }
            }
        }
    }

    /// M1 -> M2: ECDH, then prove the accessory identity.
    fn handle_m1(&mut self, request: &Tlv8) -> StepResult {
        let controller_public = request
            .get(TlvType::PublicKey)
            .ok_or(PairingError::MissingTlv(TlvType::PublicKey as u8))
            .and_then(|pk| {
                public_key_from_slice(pk).map_err(|e| PairingError::Protocol(e.to_string()))
            })?;

        let ecdh = EcdhKeyPair::generate();
        let accessory_public = ecdh.public_key();
        let shared = ecdh
            .diffie_hellman(&controller_public)
            .map_err(|_| PairingError::AuthFailure)?;
        let shared_secret = SharedSecret::new(shared.to_vec());
        let session_key = SessionKeys::derive_pair_verify_key(&shared_secret)
            .map_err(|e| PairingError::Protocol(e.to_string()))?;

        // AccessoryECDH || AccessoryPairingID || ControllerECDH
        let identity = self.manager.identity();
        let accessory_id = identity.pairing_id();
        let mut info = Vec::with_capacity(64 + accessory_id.len());
        info.extend_from_slice(&accessory_public);
        info.extend_from_slice(accessory_id.as_bytes());
        info.extend_from_slice(&controller_public);
        let signature = identity.keypair().sign(&info);

        let mut sub = Tlv8::new();
        sub.set(TlvType::Identifier, accessory_id.into_bytes());
        sub.set(TlvType::Signature, signature.to_vec());
        let encrypted = encrypt_with_nonce(
            session_key.as_bytes(),
            &nonce_from_string(PV_MSG02_NONCE),
            &sub.encode(),
        )
        .map_err(|e| PairingError::Protocol(e.to_string()))?;

        let mut response = Tlv8::with_state(2);
        response.set(TlvType::PublicKey, accessory_public.to_vec());
        response.set(TlvType::EncryptedData, encrypted);

        self.state = VerifyState::AwaitingM3 {
            shared_secret,
            session_key,
            accessory_public,
            controller_public,
        };
        debug!(connection = self.connection, "Sent pair-verify M2");
        Ok(response)
    }

    /// M3 -> M4: check the controller's signature against its stored LTPK.
    async fn handle_m3(
        &mut self,
        request: &Tlv8,
    ) -> std::result::Result<(Tlv8, VerifiedSession), PairingError> {
        let (shared_secret, session_key, accessory_public, controller_public) = match &self.state {
            VerifyState::AwaitingM3 {
                shared_secret,
                session_key,
                accessory_public,
                controller_public,
            } => (
                shared_secret.clone(),
                session_key.clone(),
                *accessory_public,
                *controller_public,
            ),
            VerifyState::Idle => {
                return Err(PairingError::StateMismatch {
                    expected: 1,
                    actual: 3,
                })
            }
        };

        let encrypted = request
            .get(TlvType::EncryptedData)
            .ok_or(PairingError::MissingTlv(TlvType::EncryptedData as u8))?;
        let decrypted = decrypt_with_nonce(
            session_key.as_bytes(),
            &nonce_from_string(PV_MSG03_NONCE),
            encrypted,
        )
        .map_err(|_| PairingError::AuthFailure)?;
        let inner = Tlv8::parse(&decrypted).map_err(|e| PairingError::TlvParse(e.to_string()))?;

        let controller_id = inner
            .get(TlvType::Identifier)
            .ok_or(PairingError::MissingTlv(TlvType::Identifier as u8))?;
        let signature = inner
            .get(TlvType::Signature)
            .ok_or(PairingError::MissingTlv(TlvType::Signature as u8))?;
        let identifier = String::from_utf8_lossy(controller_id).into_owned();

        let record = self
            .manager
            .store()
            .get(&identifier)
            .await
            .map_err(|e| PairingError::Protocol(e.to_string()))?
            .ok_or_else(|| PairingError::UnknownController(identifier.clone()))?;

        // ControllerECDH || ControllerPairingID || AccessoryECDH
        let mut info = Vec::with_capacity(64 + controller_id.len());
        info.extend_from_slice(&controller_public);
        info.extend_from_slice(controller_id);
        info.extend_from_slice(&accessory_public);
        ed25519::verify_slices(&record.public_key, &info, signature)
            .map_err(|_| PairingError::AuthFailure)?;

        let keys = SessionKeys::derive_accessory_keys(&shared_secret)
            .map_err(|e| PairingError::Protocol(e.to_string()))?;

        self.state = VerifyState::Idle;
        info!(connection = self.connection, controller = %identifier, "Controller verified");
        Ok((
            Tlv8::with_state(4),
            VerifiedSession {
                controller: record,
                keys,
            },
        ))
    }
}
