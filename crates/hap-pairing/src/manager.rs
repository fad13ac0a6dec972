//! State shared by every connection's pairing handlers.

use crate::identity::AccessoryIdentity;
use crate::setup_code::SetupCode;
use crate::store::PairingStore;
use hap_core::error::{PairingError, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info};

/// Failed SRP proofs tolerated before pair-setup is refused for good.
pub const MAX_AUTH_ATTEMPTS: u32 = 100;

/// Accessory-wide pairing state.
///
/// Owns the accessory identity, the setup code and the store, enforces that
/// only one connection runs pair-setup at a time, counts failed attempts,
/// and publishes the paired/unpaired status for advertisement updates.
pub struct PairingManager {
    identity: AccessoryIdentity,
    setup_code: SetupCode,
    store: Arc<dyn PairingStore>,
    setup_owner: Mutex<Option<u64>>,
    failed_attempts: AtomicU32,
    paired: watch::Sender<bool>,
}

impl PairingManager {
    pub async fn new(
        identity: AccessoryIdentity,
        setup_code: SetupCode,
        store: Arc<dyn PairingStore>,
    ) -> Result<Self> {
        let paired = !store.list().await?.is_empty();
        let (tx, _) = watch::channel(paired);
        Ok(Self {
            identity,
            setup_code,
            store,
            setup_owner: Mutex::new(None),
            failed_attempts: AtomicU32::new(0),
            paired: tx,
        })
    }

    pub fn identity(&self) -> &AccessoryIdentity {
        &self.identity
    }

    pub(crate) fn setup_code(&self) -> &SetupCode {
        &self.setup_code
    }

    pub fn store(&self) -> &Arc<dyn PairingStore> {
        &self.store
    }

    /// Whether at least one controller is paired.
    pub fn is_paired(&self) -> bool {
        *self.paired.borrow()
    }

    /// Receive a value every time the paired status flips.
    pub fn subscribe_paired(&self) -> watch::Receiver<bool> {
        self.paired.subscribe()
    }

    /// Claim pair-setup for `connection`.
    pub(crate) fn begin_setup(&self, connection: u64) -> std::result::Result<(), PairingError> {
        if self.is_paired() {
            return Err(PairingError::Unavailable);
        }
        if self.failed_attempts.load(Ordering::SeqCst) >= MAX_AUTH_ATTEMPTS {
            return Err(PairingError::MaxTries);
        }
        let mut owner = self.setup_owner.lock().unwrap_or_else(|e| e.into_inner());
        match *owner {
            Some(other) if other != connection => Err(PairingError::Busy),
            _ => {
                *owner = Some(connection);
                debug!(connection, "Pair-setup started");
                Ok(())
            }
        }
    }

    /// Release pair-setup if `connection` holds it.
    pub(crate) fn end_setup(&self, connection: u64) {
        let mut owner = self.setup_owner.lock().unwrap_or_else(|e| e.into_inner());
        if *owner == Some(connection) {
            *owner = None;
        }
    }

    pub(crate) fn record_failure(&self) -> u32 {
        self.failed_attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Re-read the store and publish the paired status if it changed.
    pub async fn refresh_paired(&self) -> Result<bool> {
        let paired = !self.store.list().await?.is_empty();
        let changed = self.paired.send_if_modified(|current| {
            if *current != paired {
                *current = paired;
                true
            } else {
                false
            }
        });
        if changed {
            info!(paired, "Pairing status changed");
        }
        Ok(paired)
    }
}
