//! `_hap._tcp` TXT record.

use crate::PROTOCOL_VERSION;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hap_core::DeviceId;
use sha2::{Digest, Sha512};
use std::collections::BTreeMap;

/// Everything an mDNS responder needs to announce the accessory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Service instance name (the accessory name).
    pub name: String,
    pub port: u16,
    pub txt: BTreeMap<String, String>,
}

impl Advertisement {
    pub fn builder(name: impl Into<String>, port: u16) -> AdvertisementBuilder {
        AdvertisementBuilder {
            name: name.into(),
            port,
            config_number: 1,
            feature_flags: 0,
            device_id: DeviceId::default(),
            model: String::new(),
            category: 1,
            paired: false,
            setup_id: None,
        }
    }

    /// TXT value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.txt.get(key).map(String::as_str)
    }

    /// Whether `sf` says the accessory is waiting to be paired.
    pub fn is_discoverable(&self) -> bool {
        self.get("sf") == Some("1")
    }

    /// Host label derived from the name, e.g. `Living-Room.local.`.
    pub fn host_name(&self) -> String {
        let label: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let label = label.trim_matches('-');
        if label.is_empty() {
            "hap-accessory.local.".to_string()
        } else {
            format!("{}.local.", label)
        }
    }
}

/// Builds an [`Advertisement`].
#[derive(Debug, Clone)]
pub struct AdvertisementBuilder {
    name: String,
    port: u16,
    config_number: u32,
    feature_flags: u8,
    device_id: DeviceId,
    model: String,
    category: u16,
    paired: bool,
    setup_id: Option<String>,
}

impl AdvertisementBuilder {
    /// `c#`; bumped whenever the attribute database changes.
    pub fn config_number(mut self, config_number: u32) -> Self {
        self.config_number = config_number;
        self
    }

    /// `ff`; 0 for accessories without MFi authentication.
    pub fn feature_flags(mut self, flags: u8) -> Self {
        self.feature_flags = flags;
        self
    }

    pub fn device_id(mut self, device_id: DeviceId) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// `ci`, the accessory category code.
    pub fn category(mut self, category: u16) -> Self {
        self.category = category;
        self
    }

    pub fn paired(mut self, paired: bool) -> Self {
        self.paired = paired;
        self
    }

    /// Adds `sh` so controllers can match the accessory to a scanned setup payload.
    pub fn setup_id(mut self, setup_id: impl Into<String>) -> Self {
        let setup_id = setup_id.into();
        self.setup_id = if setup_id.is_empty() {
            None
        } else {
            Some(setup_id)
        };
        self
    }

    pub fn build(self) -> Advertisement {
        let mut txt = BTreeMap::new();
        txt.insert("c#".to_string(), self.config_number.to_string());
        txt.insert("ff".to_string(), self.feature_flags.to_string());
        txt.insert("id".to_string(), self.device_id.to_mac_string());
        txt.insert("md".to_string(), self.model);
        txt.insert("pv".to_string(), PROTOCOL_VERSION.to_string());
        txt.insert("s#".to_string(), "1".to_string());
        txt.insert(
            "sf".to_string(),
            if self.paired { "0" } else { "1" }.to_string(),
        );
        txt.insert("ci".to_string(), self.category.to_string());
        if let Some(setup_id) = &self.setup_id {
            txt.insert("sh".to_string(), setup_hash(setup_id, &self.device_id));
        }
        Advertisement {
            name: self.name,
            port: self.port,
            txt,
        }
    }
}

/// Base64 of the first four bytes of SHA-512(setup id ‖ device id).
pub fn setup_hash(setup_id: &str, device_id: &DeviceId) -> String {
    let mut hasher = Sha512::new();
    hasher.update(setup_id.as_bytes());
    hasher.update(device_id.to_mac_string().as_bytes());
    let digest = hasher.finalize();
    BASE64.encode(&digest[..4])
}
