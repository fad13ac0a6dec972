//! # hap-core
//!
//! Core types and error definitions shared across the HAP accessory crates.
//!
//! This crate provides:
//! - Characteristic value cells with format, permission and range metadata
//! - Services, accessories, bridges and the accessory graph
//! - A declarative catalog of well-known characteristic and service types
//! - HAP status codes and common error types

pub mod accessory;
pub mod catalog;
pub mod characteristic;
pub mod device;
pub mod error;
pub mod format;
pub mod hap_type;
pub mod permissions;
pub mod service;
pub mod status;

pub use accessory::{Accessory, AccessoryGraph, AccessoryInfo, Bridge, Category, PRIMARY_AID};
pub use catalog::{Catalog, CharacteristicDef, ServiceDef};
pub use characteristic::{Characteristic, Getter, Properties, Setter, SetterError, WriteOutcome};
pub use device::DeviceId;
pub use error::{
    AccessoryError, CharacteristicError, CryptoError, Error, HttpError, PairingError, ParseError,
    Result, StorageError,
};
pub use format::{Format, Unit, Value};
pub use hap_type::HapType;
pub use permissions::Permissions;
pub use service::Service;
pub use status::HapStatus;
