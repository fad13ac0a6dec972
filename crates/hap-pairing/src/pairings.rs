//! `/pairings`: add, remove and list controller pairings.
//!
//! Only available on a verified session whose controller is an admin.

use crate::manager::PairingManager;
use crate::store::{PairingRecord, MAX_PAIRINGS};
use hap_core::error::PairingError;
use hap_crypto::tlv::{Method, Tlv8, TlvType};
use tracing::{info, warn};

/// Result of one `/pairings` request.
#[derive(Debug, Default)]
pub struct PairingsOutcome {
    /// TLV body to send back.
    pub response: Vec<u8>,
    /// Controllers whose pairings were removed; their sessions must close.
    pub removed: Vec<String>,
}

impl PairingsOutcome {
    fn respond(response: Tlv8) -> Self {
        Self {
            response: response.encode(),
            removed: Vec::new(),
        }
    }
}

/// Handle a `/pairings` request from the session of `controller_id`.
pub async fn handle_pairings(
    manager: &PairingManager,
    controller_id: &str,
    body: &[u8],
) -> PairingsOutcome {
    let request = match Tlv8::parse(body) {
        Ok(tlv) => tlv,
        Err(e) => {
            warn!(controller = controller_id, error = %e, "Malformed pairings request");
            return PairingsOutcome::respond(Tlv8::error_response(2, 0x01));
        }
    };

    match process(manager, controller_id, &request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(controller = controller_id, error = %e, "Pairings request failed");
            PairingsOutcome::respond(Tlv8::error_response(2, e.tlv_code()))
        }
    }
}

async fn process(
    manager: &PairingManager,
    controller_id: &str,
    request: &Tlv8,
) -> std::result::Result<PairingsOutcome, PairingError> {
    if request.state() != Some(1) {
        return Err(PairingError::StateMismatch {
            expected: 1,
            actual: request.state().unwrap_or(0),
        });
    }

    // Permissions may have changed since the session was verified.
    let caller = manager
        .store()
        .get(controller_id)
        .await
        .map_err(|e| PairingError::Persist(e.to_string()))?;
    if !caller.map(|c| c.is_admin()).unwrap_or(false) {
        return Err(PairingError::NotAdmin);
    }

    let method = request
        .method()
        .ok_or(PairingError::MissingTlv(TlvType::Method as u8))?;
    match Method::from_byte(method) {
        Some(Method::AddPairing) => add(manager, request).await,
        Some(Method::RemovePairing) => remove(manager, request).await,
        Some(Method::ListPairings) => list(manager).await,
        _ => Err(PairingError::UnsupportedMethod(method)),
    }
}

fn identifier(request: &Tlv8) -> std::result::Result<String, PairingError> {
    let raw = request
        .get(TlvType::Identifier)
        .ok_or(PairingError::MissingTlv(TlvType::Identifier as u8))?;
    String::from_utf8(raw.to_vec())
        .map_err(|_| PairingError::TlvParse("identifier is not UTF-8".into()))
}

async fn add(
    manager: &PairingManager,
    request: &Tlv8,
) -> std::result::Result<PairingsOutcome, PairingError> {
    let identifier = identifier(request)?;
    let public_key: [u8; 32] = request
        .get(TlvType::PublicKey)
        .ok_or(PairingError::MissingTlv(TlvType::PublicKey as u8))?
        .try_into()
        .map_err(|_| PairingError::TlvParse("public key is not 32 bytes".into()))?;
    let permissions = request
        .get(TlvType::Permissions)
        .and_then(|p| p.first().copied())
        .ok_or(PairingError::MissingTlv(TlvType::Permissions as u8))?;

    let store = manager.store();
    match store
        .get(&identifier)
        .await
        .map_err(|e| PairingError::Persist(e.to_string()))?
    {
        Some(existing) if existing.public_key != public_key => {
            return Err(PairingError::Protocol(format!(
                "controller {} already paired with a different key",
                identifier
            )));
        }
        Some(_) => {}
        None => {
            let count = store
                .list()
                .await
                .map_err(|e| PairingError::Persist(e.to_string()))?
                .len();
            if count >= MAX_PAIRINGS {
                return Err(PairingError::MaxPeers);
            }
        }
    }

    store
        .put(PairingRecord::new(identifier.clone(), public_key, permissions))
        .await
        .map_err(|e| PairingError::Persist(e.to_string()))?;
    info!(controller = %identifier, permissions, "Pairing added");

    refresh(manager).await;
    Ok(PairingsOutcome::respond(Tlv8::with_state(2)))
}

async fn remove(
    manager: &PairingManager,
    request: &Tlv8,
) -> std::result::Result<PairingsOutcome, PairingError> {
    let identifier = identifier(request)?;
    let store = manager.store();
    let mut removed = Vec::new();

    if store
        .delete(&identifier)
        .await
        .map_err(|e| PairingError::Persist(e.to_string()))?
    {
        info!(controller = %identifier, "Pairing removed");
        removed.push(identifier);
    }

    // Without an admin nobody could manage the rest; drop them all.
    let remaining = store
        .list()
        .await
        .map_err(|e| PairingError::Persist(e.to_string()))?;
    if !remaining.is_empty() && !remaining.iter().any(PairingRecord::is_admin) {
        warn!(count = remaining.len(), "Last admin removed, dropping all pairings");
        for record in remaining {
            store
                .delete(&record.identifier)
                .await
                .map_err(|e| PairingError::Persist(e.to_string()))?;
            removed.push(record.identifier);
        }
    }

    refresh(manager).await;
    Ok(PairingsOutcome {
        response: Tlv8::with_state(2).encode(),
        removed,
    })
}

async fn list(manager: &PairingManager) -> std::result::Result<PairingsOutcome, PairingError> {
    let records = manager
        .store()
        .list()
        .await
        .map_err(|e| PairingError::Persist(e.to_string()))?;

    let mut response = Tlv8::with_state(2);
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            response.push_separator();
        }
        response.push(TlvType::Identifier, record.identifier.as_bytes().to_vec());
        response.push(TlvType::PublicKey, record.public_key.to_vec());
        response.push(TlvType::Permissions, vec![record.permissions]);
    }
    Ok(PairingsOutcome::respond(response))
}

async fn refresh(manager: &PairingManager) {
    if let Err(e) = manager.refresh_paired().await {
        warn!(error = %e, "Could not refresh pairing status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{add_pairing_request, list_pairings_request, remove_pairing_request};
    use crate::identity::AccessoryIdentity;
    use crate::setup_code::SetupCode;
    use crate::store::{MemoryStore, PairingStore, PERMISSION_ADMIN};
    use std::sync::Arc;

    const ADMIN: &str = "AAAAAAAA-0000-0000-0000-000000000001";

    async fn manager() -> PairingManager {
        let store = Arc::new(MemoryStore::new());
        store
            .put(PairingRecord::new(ADMIN, [1; 32], PERMISSION_ADMIN))
            .await
            .unwrap();
        PairingManager::new(
            AccessoryIdentity::generate(),
            SetupCode::parse("031-45-154").unwrap(),
            store,
        )
        .await
        .unwrap()
    }

    fn error_of(outcome: &PairingsOutcome) -> Option<u8> {
        Tlv8::parse(&outcome.response).unwrap().error()
    }

    mod add {
        use super::*;

        #[tokio::test]
        async fn adds_regular_controller() {
            let m = manager().await;
            let out = handle_pairings(&m, ADMIN, &add_pairing_request("guest", &[2; 32], 0)).await;
            assert_eq!(error_of(&out), None);

            let guest = m.store().get("guest").await.unwrap().unwrap();
            assert!(!guest.is_admin());
        }

        #[tokio::test]
        async fn re_adding_updates_permissions() {
            let m = manager().await;
            handle_pairings(&m, ADMIN, &add_pairing_request("guest", &[2; 32], 0)).await;
            let out = handle_pairings(&m, ADMIN, &add_pairing_request("guest", &[2; 32], 1)).await;
            assert_eq!(error_of(&out), None);
            assert!(m.store().get("guest").await.unwrap().unwrap().is_admin());
        }

        #[tokio::test]
        async fn different_key_for_same_id_is_unknown_error() {
            let m = manager().await;
            handle_pairings(&m, ADMIN, &add_pairing_request("guest", &[2; 32], 0)).await;
            let out = handle_pairings(&m, ADMIN, &add_pairing_request("guest", &[3; 32], 0)).await;
            assert_eq!(error_of(&out), Some(0x01));
        }

        #[tokio::test]
        async fn full_store_is_max_peers() {
            let m = manager().await;
            for i in 1..MAX_PAIRINGS {
                let id = format!("ctrl-{:02}", i);
                let out = handle_pairings(&m, ADMIN, &add_pairing_request(&id, &[i as u8; 32], 0)).await;
                assert_eq!(error_of(&out), None);
            }
            let out = handle_pairings(&m, ADMIN, &add_pairing_request("one-too-many", &[99; 32], 0)).await;
            assert_eq!(error_of(&out), Some(0x04));
        }

        #[tokio::test]
        async fn non_admin_is_refused() {
            let m = manager().await;
            handle_pairings(&m, ADMIN, &add_pairing_request("guest", &[2; 32], 0)).await;
            let out = handle_pairings(&m, "guest", &add_pairing_request("other", &[4; 32], 0)).await;
            assert_eq!(error_of(&out), Some(0x02));
            assert!(m.store().get("other").await.unwrap().is_none());
        }
    }

    mod remove {
        use super::*;

        #[tokio::test]
        async fn removes_and_reports_controller() {
            let m = manager().await;
            handle_pairings(&m, ADMIN, &add_pairing_request("guest", &[2; 32], 0)).await;
            let out = handle_pairings(&m, ADMIN, &remove_pairing_request("guest")).await;
            assert_eq!(error_of(&out), None);
            assert_eq!(out.removed, vec!["guest".to_string()]);
            assert!(m.is_paired());
        }

        #[tokio::test]
        async fn removing_unknown_id_succeeds() {
            let m = manager().await;
            let out = handle_pairings(&m, ADMIN, &remove_pairing_request("nobody")).await;
            assert_eq!(error_of(&out), None);
            assert!(out.removed.is_empty());
        }

        #[tokio::test]
        async fn removing_last_admin_drops_everyone() {
            let m = manager().await;
            handle_pairings(&m, ADMIN, &add_pairing_request("guest", &[2; 32], 0)).await;
            let out = handle_pairings(&m, ADMIN, &remove_pairing_request(ADMIN)).await;

            assert_eq!(error_of(&out), None);
            assert_eq!(out.removed, vec![ADMIN.to_string(), "guest".to_string()]);
            assert!(m.store().list().await.unwrap().is_empty());
            assert!(!m.is_paired());
        }
    }

    mod list {
        use super::*;

        #[tokio::test]
        async fn lists_records_separated() {
            let m = manager().await;
            handle_pairings(&m, ADMIN, &add_pairing_request("guest", &[2; 32], 0)).await;
            let out = handle_pairings(&m, ADMIN, &list_pairings_request()).await;

            let tlv = Tlv8::parse(&out.response).unwrap();
            assert_eq!(tlv.state(), Some(2));
            let records = tlv.split_records();
            assert_eq!(records.len(), 2);
            assert_eq!(records[0].get(TlvType::Identifier), Some(ADMIN.as_bytes()));
            assert_eq!(records[0].get(TlvType::Permissions), Some(&[1u8][..]));
            assert_eq!(records[1].get(TlvType::Identifier), Some(&b"guest"[..]));
            assert_eq!(records[1].get(TlvType::PublicKey), Some(&[2u8; 32][..]));
        }
    }

    #[tokio::test]
    async fn unknown_method_is_rejected() {
        let m = manager().await;
        let mut request = Tlv8::with_state(1);
        request.set(TlvType::Method, vec![Method::PairVerify as u8]);
        let out = handle_pairings(&m, ADMIN, &request.encode()).await;
        assert_eq!(error_of(&out), Some(0x01));
    }
}
