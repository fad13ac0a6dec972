//! # hap-server
//!
//! The accessory side of the HomeKit Accessory Protocol over IP.
//!
//! This crate provides:
//! - The attribute database and its `/accessories` JSON form
//! - Request dispatch for characteristic reads, writes, timed writes and
//!   identify
//! - Per-connection sessions with pairing, encryption and teardown
//! - Event subscriptions and `EVENT/1.0` delivery
//!
//! ## Example
//!
//! ```ignore
//! use hap_server::{Accessory, Category, ServerBuilder, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> hap_server::Result<()> {
//!     let mut lamp = Accessory::new("Lamp", Category::Lightbulb);
//!     lamp.add_service("Lightbulb")?;
//!
//!     let server = ServerBuilder::new(ServerConfig::new("Lamp", "031-45-154"))
//!         .accessories(lamp)
//!         .build()
//!         .await?;
//!     server.run().await
//! }
//! ```

mod broker;
mod builder;
mod config;
mod connection;
mod database;
mod dispatcher;
mod server;
mod session;

pub use broker::{EventBroker, Notification, SessionId};
pub use builder::ServerBuilder;
pub use config::{ServerConfig, DEFAULT_PORT};
pub use database::{characteristic_json, AccessoryDatabase, JsonOptions};
pub use dispatcher::{Dispatcher, SessionContext};
pub use server::AccessoryServer;
pub use session::{SessionHandle, SessionRegistry};

// Re-export commonly used types
pub use hap_core::{
    Accessory, AccessoryGraph, Bridge, Catalog, Category, Characteristic, Error, Result, Service,
    Setter, SetterError, Value,
};
pub use hap_discovery::{Advertiser, MdnsAdvertiser};
pub use hap_pairing::{FileStore, MemoryStore, PairingStore};
