//! Server builder.

use crate::config::ServerConfig;
use crate::database::AccessoryDatabase;
use crate::server::AccessoryServer;
use hap_core::error::AccessoryError;
use hap_core::{AccessoryGraph, Result};
use hap_discovery::Advertiser;
use hap_pairing::{AccessoryIdentity, FileStore, MemoryStore, PairingManager, PairingStore, SetupCode};
use std::sync::Arc;
use tracing::{debug, info};

/// Builder for configuring an [`AccessoryServer`].
pub struct ServerBuilder {
    config: ServerConfig,
    graph: Option<AccessoryGraph>,
    store: Option<Arc<dyn PairingStore>>,
    advertiser: Option<Arc<dyn Advertiser>>,
}

impl ServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            graph: None,
            store: None,
            advertiser: None,
        }
    }

    /// Accessories to expose: a standalone accessory or a bridge.
    pub fn accessories(mut self, graph: impl Into<AccessoryGraph>) -> Self {
        self.graph = Some(graph.into());
        self
    }

    /// Use a specific pairing store instead of the configured one.
    pub fn store(mut self, store: Arc<dyn PairingStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Announce the server through `advertiser`.
    pub fn advertiser(mut self, advertiser: Arc<dyn Advertiser>) -> Self {
        self.advertiser = Some(advertiser);
        self
    }

    /// Load or create the accessory identity and assemble the server.
    pub async fn build(self) -> Result<AccessoryServer> {
        let graph = self
            .graph
            .ok_or_else(|| AccessoryError::InvalidDefinition("no accessories configured".into()))?;
        let database = AccessoryDatabase::new(graph)?;
        let setup_code = SetupCode::parse(&self.config.setup_code)?;

        let store: Arc<dyn PairingStore> = match (self.store, &self.config.state_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(FileStore::open(path).await?),
            (None, None) => Arc::new(MemoryStore::new()),
        };

        let (mut identity, mut dirty) = match store.load_identity().await? {
            Some(identity) => (identity, false),
            None => {
                info!("Generating accessory identity");
                (AccessoryIdentity::generate(), true)
            }
        };
        if let Some(setup_id) = &self.config.setup_id {
            if identity.setup_id() != setup_id {
                identity.set_setup_id(setup_id.clone());
                dirty = true;
            }
        }
        if identity.update_fingerprint(&database.fingerprint()) {
            debug!(config_number = identity.config_number(), "Attribute database changed");
            dirty = true;
        }
        if dirty {
            store.save_identity(&identity).await?;
        }
        info!(
            device_id = %identity.device_id(),
            config_number = identity.config_number(),
            characteristics = database.len(),
            "Accessory ready"
        );

        let manager = Arc::new(PairingManager::new(identity, setup_code, store).await?);
        Ok(AccessoryServer::new(
            self.config,
            database,
            manager,
            self.advertiser,
        ))
    }
}
