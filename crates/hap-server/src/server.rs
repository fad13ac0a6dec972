//! The accessory server: shared state, accept loop and advertisement.

use crate::broker::EventBroker;
use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::database::AccessoryDatabase;
use crate::dispatcher::Dispatcher;
use crate::session::SessionRegistry;
use hap_core::error::CharacteristicError;
use hap_core::{Error, Result, Value};
use hap_discovery::{Advertisement, Advertiser};
use hap_pairing::PairingManager;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// State shared by every connection.
pub(crate) struct ServerState {
    pub(crate) database: Arc<AccessoryDatabase>,
    pub(crate) broker: Arc<EventBroker>,
    pub(crate) sessions: SessionRegistry,
    pub(crate) manager: Arc<PairingManager>,
    pub(crate) dispatcher: Dispatcher,
}

/// A HAP accessory server. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct AccessoryServer {
    state: Arc<ServerState>,
    config: Arc<ServerConfig>,
    advertiser: Option<Arc<dyn Advertiser>>,
}

impl AccessoryServer {
    pub(crate) fn new(
        config: ServerConfig,
        database: AccessoryDatabase,
        manager: Arc<PairingManager>,
        advertiser: Option<Arc<dyn Advertiser>>,
    ) -> Self {
        let database = Arc::new(database);
        let broker = Arc::new(EventBroker::new());
        let dispatcher = Dispatcher::new(
            database.clone(),
            broker.clone(),
            manager.subscribe_paired(),
        );
        Self {
            state: Arc::new(ServerState {
                database,
                broker,
                sessions: SessionRegistry::new(),
                manager,
                dispatcher,
            }),
            config: Arc::new(config),
            advertiser,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn database(&self) -> &AccessoryDatabase {
        &self.state.database
    }

    pub fn manager(&self) -> &Arc<PairingManager> {
        &self.state.manager
    }

    pub fn broker(&self) -> &EventBroker {
        &self.state.broker
    }

    pub fn is_paired(&self) -> bool {
        self.state.manager.is_paired()
    }

    /// Number of open controller connections.
    pub fn session_count(&self) -> usize {
        self.state.sessions.len()
    }

    /// Update a characteristic from the accessory side (e.g. a new sensor
    /// reading) and notify every subscribed controller.
    ///
    /// Returns whether the stored value changed.
    pub fn set_value(
        &self,
        aid: u64,
        iid: u64,
        value: impl Into<Value>,
    ) -> std::result::Result<bool, CharacteristicError> {
        let characteristic = self.state.database.resolve(aid, iid)?;
        let broker = &self.state.broker;
        let outcome = characteristic.set_value(&value.into(), |committed| {
            broker.publish(aid, iid, committed, None);
        })?;
        Ok(outcome.changed)
    }

    /// Current TXT record for a listener on `port`.
    pub fn advertisement(&self, port: u16) -> Advertisement {
        let identity = self.state.manager.identity();
        let category = self
            .config
            .category
            .unwrap_or_else(|| self.state.database.category());
        Advertisement::builder(self.config.display_name(self.state.database.name()), port)
            .config_number(identity.config_number())
            .device_id(identity.device_id())
            .model(self.config.model.as_str())
            .category(category.code())
            .paired(self.is_paired())
            .setup_id(identity.setup_id())
            .build()
    }

    /// Serve one controller connection until it closes.
    ///
    /// Returns `Err(Error::SessionClosed)` when the session was closed by
    /// the accessory, e.g. because the controller's pairing was removed.
    pub async fn serve_connection<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let connection = Connection::new(stream, self.state.clone());
        debug!(session = connection.id(), "Connection opened");
        connection.run().await
    }

    /// Bind the configured address and serve forever.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener =
            TcpListener::bind(SocketAddr::new(self.config.bind_address, self.config.port)).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let port = listener.local_addr()?.port();
        info!(
            name = %self.config.display_name(self.state.database.name()),
            port,
            accessories = self.state.database.accessories().len(),
            paired = self.is_paired(),
            "Accessory server listening"
        );

        let watcher = self.spawn_advertisement(port).await;

        tokio::pin!(shutdown);
        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down");
                    break Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => break Err(Error::Connection(e)),
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(%peer, "set_nodelay failed: {}", e);
                    }
                    let server = self.clone();
                    tokio::spawn(async move {
                        debug!(%peer, "Controller connected");
                        match server.serve_connection(stream).await {
                            Ok(()) => debug!(%peer, "Connection finished"),
                            Err(Error::SessionClosed) => info!(%peer, "Connection closed by accessory"),
                            Err(e) => warn!(%peer, error = %e, "Connection failed"),
                        }
                    });
                }
            }
        };

        if let Some(watcher) = watcher {
            watcher.abort();
        }
        if let Some(advertiser) = &self.advertiser {
            if let Err(e) = advertiser.withdraw().await {
                warn!(error = %e, "Failed to withdraw advertisement");
            }
        }
        result
    }

    /// Advertise now, then again on every pairing-status change.
    async fn spawn_advertisement(&self, port: u16) -> Option<JoinHandle<()>> {
        let advertiser = self.advertiser.clone()?;
        if let Err(e) = advertiser.advertise(&self.advertisement(port)).await {
            error!(error = %e, "Failed to advertise accessory");
        }

        let mut paired = self.state.manager.subscribe_paired();
        let server = self.clone();
        Some(tokio::spawn(async move {
            while paired.changed().await.is_ok() {
                let advertisement = server.advertisement(port);
                info!(
                    paired = !advertisement.is_discoverable(),
                    "Updating advertisement"
                );
                if let Err(e) = advertiser.advertise(&advertisement).await {
                    error!(error = %e, "Failed to update advertisement");
                }
            }
        }))
    }
}
