//! # hap-discovery
//!
//! Bonjour advertisement for HAP accessories.
//!
//! This crate provides:
//! - The `_hap._tcp` TXT record built from the accessory's identity and
//!   pairing status
//! - An [`Advertiser`] trait so the server can be driven with mocks in tests
//! - [`MdnsAdvertiser`], an adapter over the `mdns-sd` responder
//!
//! ## Example
//!
//! ```ignore
//! use hap_discovery::{Advertisement, Advertiser, MdnsAdvertiser};
//!
//! let advertisement = Advertisement::builder("Thermostat", 51826)
//!     .device_id(device_id)
//!     .model("Thermostat")
//!     .category(9)
//!     .paired(false)
//!     .build();
//! MdnsAdvertiser::new(Vec::new())?.advertise(&advertisement).await?;
//! ```

mod advertisement;
mod mdns;
mod traits;

pub use advertisement::{setup_hash, Advertisement, AdvertisementBuilder};
pub use mdns::MdnsAdvertiser;
pub use traits::Advertiser;

/// HAP-over-IP service type.
pub const HAP_SERVICE_TYPE: &str = "_hap._tcp.local.";

/// Protocol version advertised in `pv`.
pub const PROTOCOL_VERSION: &str = "1.1";
