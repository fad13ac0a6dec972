//! Pairing persistence.
//!
//! The [`PairingStore`] trait keeps controller pairings and the accessory
//! identity across restarts. [`MemoryStore`] is for tests and ephemeral
//! runs; [`FileStore`] keeps everything in one JSON document that is
//! replaced atomically (write to a temporary file, then rename). A failed
//! write leaves both the file and the in-memory view untouched.

use crate::identity::{AccessoryIdentity, StoredIdentity};
use async_trait::async_trait;
use hap_core::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Permission bit marking an admin controller.
pub const PERMISSION_ADMIN: u8 = 0x01;

/// Maximum number of stored pairings.
pub const MAX_PAIRINGS: usize = 16;

/// A paired controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRecord {
    /// Controller pairing identifier (usually a UUID string).
    pub identifier: String,
    /// Controller Ed25519 long-term public key.
    pub public_key: [u8; 32],
    /// Permission bits; bit 0 = admin.
    pub permissions: u8,
}

impl PairingRecord {
    pub fn new(identifier: impl Into<String>, public_key: [u8; 32], permissions: u8) -> Self {
        Self {
            identifier: identifier.into(),
            public_key,
            permissions,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.permissions & PERMISSION_ADMIN != 0
    }
}

/// Storage for pairings and the accessory identity.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait PairingStore: Send + Sync {
    /// Load the persisted accessory identity, if any.
    async fn load_identity(&self) -> Result<Option<AccessoryIdentity>>;

    /// Persist the accessory identity.
    async fn save_identity(&self, identity: &AccessoryIdentity) -> Result<()>;

    /// Look up a pairing by controller identifier.
    async fn get(&self, identifier: &str) -> Result<Option<PairingRecord>>;

    /// Insert or replace a pairing.
    async fn put(&self, record: PairingRecord) -> Result<()>;

    /// Remove a pairing; returns whether it existed.
    async fn delete(&self, identifier: &str) -> Result<bool>;

    /// All pairings, ordered by identifier.
    async fn list(&self) -> Result<Vec<PairingRecord>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredPairing {
    public_key: String,
    permissions: u8,
}

/// The whole persisted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    accessory: Option<StoredIdentity>,
    #[serde(default)]
    pairings: BTreeMap<String, StoredPairing>,
}

impl StoreState {
    fn identity(&self) -> Result<Option<AccessoryIdentity>> {
        match &self.accessory {
            Some(stored) => Ok(Some(AccessoryIdentity::from_stored(stored.clone())?)),
            None => Ok(None),
        }
    }

    fn record(identifier: &str, stored: &StoredPairing) -> Result<PairingRecord> {
        let key = hex::decode(&stored.public_key)
            .map_err(|e| StorageError::Corrupt(format!("pairing {}: {}", identifier, e)))?;
        let public_key: [u8; 32] = key.try_into().map_err(|_| {
            StorageError::Corrupt(format!("pairing {}: public key is not 32 bytes", identifier))
        })?;
        Ok(PairingRecord::new(identifier, public_key, stored.permissions))
    }

    fn get(&self, identifier: &str) -> Result<Option<PairingRecord>> {
        self.pairings
            .get(identifier)
            .map(|stored| Self::record(identifier, stored))
            .transpose()
    }

    fn put(&mut self, record: &PairingRecord) {
        self.pairings.insert(
            record.identifier.clone(),
            StoredPairing {
                public_key: hex::encode(record.public_key),
                permissions: record.permissions,
            },
        );
    }

    fn list(&self) -> Result<Vec<PairingRecord>> {
        self.pairings
            .iter()
            .map(|(id, stored)| Self::record(id, stored))
            .collect()
    }
}

/// Volatile store; everything is lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PairingStore for MemoryStore {
    async fn load_identity(&self) -> Result<Option<AccessoryIdentity>> {
        self.state.read().await.identity()
    }

    async fn save_identity(&self, identity: &AccessoryIdentity) -> Result<()> {
        self.state.write().await.accessory = Some(identity.to_stored());
        Ok(())
    }

    async fn get(&self, identifier: &str) -> Result<Option<PairingRecord>> {
        self.state.read().await.get(identifier)
    }

    async fn put(&self, record: PairingRecord) -> Result<()> {
        self.state.write().await.put(&record);
        Ok(())
    }

    async fn delete(&self, identifier: &str) -> Result<bool> {
        Ok(self.state.write().await.pairings.remove(identifier).is_some())
    }

    async fn list(&self) -> Result<Vec<PairingRecord>> {
        self.state.read().await.list()
    }
}

/// JSON file store with atomic replacement.
pub struct FileStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Corrupt(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No pairing state yet, starting empty");
                StoreState::default()
            }
            Err(source) => {
                return Err(StorageError::Io {
                    path: path.display().to_string(),
                    source,
                }
                .into())
            }
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `mutate` to a copy of the state, write it out, and only then
    /// swap it in.
    async fn commit<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut StoreState),
    {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        mutate(&mut next);

        let json = serde_json::to_vec_pretty(&next)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        let io_err = |source| StorageError::Io {
            path: tmp.display().to_string(),
            source,
        };

        if let Err(e) = tokio::fs::write(&tmp, &json).await {
            warn!(path = %tmp.display(), error = %e, "Failed to write pairing state");
            return Err(io_err(e).into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            warn!(path = %self.path.display(), error = %e, "Failed to replace pairing state");
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e).into());
        }

        *state = next;
        Ok(())
    }
}

#[async_trait]
impl PairingStore for FileStore {
    async fn load_identity(&self) -> Result<Option<AccessoryIdentity>> {
        self.state.read().await.identity()
    }

    async fn save_identity(&self, identity: &AccessoryIdentity) -> Result<()> {
        let stored = identity.to_stored();
        self.commit(move |s| s.accessory = Some(stored)).await
    }

    async fn get(&self, identifier: &str) -> Result<Option<PairingRecord>> {
        self.state.read().await.get(identifier)
    }

    async fn put(&self, record: PairingRecord) -> Result<()> {
        self.commit(move |s| s.put(&record)).await
    }

    async fn delete(&self, identifier: &str) -> Result<bool> {
        if !self.state.read().await.pairings.contains_key(identifier) {
            return Ok(false);
        }
        self.commit(|s| {
            s.pairings.remove(identifier);
        })
        .await?;
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<PairingRecord>> {
        self.state.read().await.list()
    }
}
