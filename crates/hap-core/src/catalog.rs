//! Declarative characteristic and service definitions.
//!
//! The built-in catalog is embedded from `resources/catalog.json`. Extra
//! definitions (custom characteristics, vendor services) can be loaded from
//! JSON of the same shape and merged in with [`Catalog::extend`].

use crate::characteristic::{Characteristic, Properties};
use crate::error::AccessoryError;
use crate::format::{Format, Unit};
use crate::hap_type::HapType;
use crate::permissions::Permissions;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

const BUILTIN_CATALOG: &str = include_str!("../resources/catalog.json");

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    characteristics: BTreeMap<String, RawCharacteristic>,
    #[serde(default)]
    services: BTreeMap<String, RawService>,
}

#[derive(Debug, Deserialize)]
struct RawCharacteristic {
    #[serde(rename = "UUID")]
    uuid: String,
    #[serde(rename = "Format")]
    format: Format,
    #[serde(rename = "Permissions")]
    permissions: Permissions,
    #[serde(rename = "ValidValues", default)]
    valid_values: Option<BTreeMap<String, i64>>,
    #[serde(rename = "minValue", default)]
    min_value: Option<f64>,
    #[serde(rename = "maxValue", default)]
    max_value: Option<f64>,
    #[serde(rename = "minStep", default)]
    min_step: Option<f64>,
    #[serde(rename = "maxLen", default)]
    max_len: Option<usize>,
    #[serde(default)]
    unit: Option<Unit>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    #[serde(rename = "UUID")]
    uuid: String,
    #[serde(rename = "RequiredCharacteristics", default)]
    required: Vec<String>,
    #[serde(rename = "OptionalCharacteristics", default)]
    optional: Vec<String>,
}

/// Template for creating a characteristic.
#[derive(Debug, Clone)]
pub struct CharacteristicDef {
    pub name: String,
    pub hap_type: HapType,
    pub props: Properties,
}

impl CharacteristicDef {
    pub fn new(name: impl Into<String>, hap_type: HapType, props: Properties) -> Self {
        Self {
            name: name.into(),
            hap_type,
            props,
        }
    }

    /// Create a live characteristic with the given instance id.
    pub fn instantiate(&self, iid: u64) -> Characteristic {
        Characteristic::new(iid, self.hap_type, self.name.clone(), self.props.clone())
    }
}

/// Template for creating a service.
#[derive(Debug, Clone)]
pub struct ServiceDef {
    pub name: String,
    pub hap_type: HapType,
    pub required: Vec<String>,
    pub optional: Vec<String>,
}

/// Set of known characteristic and service definitions, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    characteristics: HashMap<String, CharacteristicDef>,
    services: HashMap<String, ServiceDef>,
}

impl Catalog {
    /// The catalog shipped with the crate.
    pub fn builtin() -> &'static Catalog {
        static BUILTIN: OnceLock<Catalog> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            // The embedded file is covered by tests; an empty catalog keeps
            // construction total if it were ever broken.
            Catalog::from_json(BUILTIN_CATALOG).unwrap_or_default()
        })
    }

    /// Parse a catalog from JSON.
    pub fn from_json(json: &str) -> Result<Self, AccessoryError> {
        let raw: RawCatalog = serde_json::from_str(json)
            .map_err(|e| AccessoryError::InvalidDefinition(e.to_string()))?;

        let mut catalog = Catalog::default();

        for (name, c) in raw.characteristics {
            let hap_type = HapType::parse(&c.uuid)
                .map_err(|e| AccessoryError::InvalidDefinition(format!("{}: {}", name, e)))?;
            let mut props = Properties::new(c.format, c.permissions);
            props.min_value = c.min_value;
            props.max_value = c.max_value;
            props.min_step = c.min_step;
            props.max_len = c.max_len;
            props.unit = c.unit;
            if let Some(valid) = c.valid_values {
                let mut values: Vec<i64> = valid.into_values().collect();
                values.sort_unstable();
                props.valid_values = Some(values);
            }
            catalog
                .characteristics
                .insert(name.clone(), CharacteristicDef::new(name, hap_type, props));
        }

        for (name, s) in raw.services {
            let hap_type = HapType::parse(&s.uuid)
                .map_err(|e| AccessoryError::InvalidDefinition(format!("{}: {}", name, e)))?;
            catalog.services.insert(
                name.clone(),
                ServiceDef {
                    name,
                    hap_type,
                    required: s.required,
                    optional: s.optional,
                },
            );
        }

        Ok(catalog)
    }

    /// Merge another catalog into this one; entries in `other` win.
    pub fn extend(&mut self, other: Catalog) {
        self.characteristics.extend(other.characteristics);
        self.services.extend(other.services);
    }

    /// Register a single characteristic definition.
    pub fn add_characteristic(&mut self, def: CharacteristicDef) {
        self.characteristics.insert(def.name.clone(), def);
    }

    pub fn characteristic(&self, name: &str) -> Result<&CharacteristicDef, AccessoryError> {
        self.characteristics
            .get(name)
            .ok_or_else(|| AccessoryError::UnknownCharacteristic(name.to_string()))
    }

    pub fn service(&self, name: &str) -> Result<&ServiceDef, AccessoryError> {
        self.services
            .get(name)
            .ok_or_else(|| AccessoryError::UnknownService(name.to_string()))
    }
}
