//! Attribute database: every characteristic of the accessory graph indexed
//! by (AID, IID), plus its `/accessories` JSON rendering.

use hap_core::error::{AccessoryError, CharacteristicError};
use hap_core::{Accessory, AccessoryGraph, Category, Characteristic, Value, PRIMARY_AID};
use serde_json::{json, Map, Value as Json};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Optional fields of a characteristic object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonOptions {
    pub meta: bool,
    pub perms: bool,
    pub hap_type: bool,
}

impl JsonOptions {
    /// Everything, as used by `/accessories`.
    pub fn full() -> Self {
        Self {
            meta: true,
            perms: true,
            hap_type: true,
        }
    }
}

/// Flattened, immutable-shape view of the accessory graph.
pub struct AccessoryDatabase {
    name: String,
    category: Category,
    accessories: Vec<Accessory>,
    index: HashMap<(u64, u64), Arc<Characteristic>>,
}

impl AccessoryDatabase {
    pub fn new(graph: AccessoryGraph) -> Result<Self, AccessoryError> {
        let name = graph.name().to_string();
        let category = graph.category();
        let accessories = graph.into_accessories()?;

        let mut index = HashMap::new();
        for accessory in &accessories {
            let aid = accessory.aid().unwrap_or(PRIMARY_AID);
            for characteristic in accessory.characteristics() {
                index.insert((aid, characteristic.iid()), characteristic.clone());
            }
        }

        Ok(Self {
            name,
            category,
            accessories,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn accessories(&self) -> &[Accessory] {
        &self.accessories
    }

    /// The accessory at AID 1 (the bridge, or the standalone accessory).
    pub fn primary(&self) -> Option<&Accessory> {
        self.accessories
            .iter()
            .find(|a| a.aid() == Some(PRIMARY_AID))
    }

    /// Look up a characteristic.
    pub fn resolve(&self, aid: u64, iid: u64) -> Result<&Arc<Characteristic>, CharacteristicError> {
        self.index
            .get(&(aid, iid))
            .ok_or(CharacteristicError::ResourceNotFound { aid, iid })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// `GET /accessories` body.
    pub fn to_json(&self) -> Json {
        let accessories: Vec<Json> = self
            .accessories
            .iter()
            .map(|accessory| {
                let aid = accessory.aid().unwrap_or(PRIMARY_AID);
                let services: Vec<Json> = accessory
                    .services()
                    .iter()
                    .map(|service| {
                        let characteristics: Vec<Json> = service
                            .characteristics()
                            .iter()
                            .map(|c| {
                                let value = if c.perms().readable() {
                                    c.read().ok()
                                } else {
                                    None
                                };
                                characteristic_json(None, c, value.as_ref(), JsonOptions::full())
                            })
                            .collect();
                        let mut object = Map::new();
                        object.insert("iid".into(), json!(service.iid()));
                        object.insert("type".into(), json!(service.hap_type().to_short_string()));
                        object.insert("characteristics".into(), Json::Array(characteristics));
                        if service.is_primary() {
                            object.insert("primary".into(), json!(true));
                        }
                        if service.is_hidden() {
                            object.insert("hidden".into(), json!(true));
                        }
                        if !service.linked().is_empty() {
                            object.insert("linked".into(), json!(service.linked()));
                        }
                        Json::Object(object)
                    })
                    .collect();
                json!({ "aid": aid, "services": services })
            })
            .collect();
        json!({ "accessories": accessories })
    }

    /// Digest of the database shape (types, IIDs, formats, permissions).
    ///
    /// Values are excluded so that only structural changes bump `c#`.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for accessory in &self.accessories {
            hasher.update(format!("a{};", accessory.aid().unwrap_or(PRIMARY_AID)));
            for service in accessory.services() {
                hasher.update(format!("s{}:{};", service.iid(), service.hap_type()));
                for c in service.characteristics() {
                    hasher.update(format!(
                        "c{}:{}:{:?}:{};",
                        c.iid(),
                        c.hap_type(),
                        c.properties().format,
                        c.perms().codes().join(",")
                    ));
                }
            }
        }
        hex::encode(hasher.finalize())
    }
}

/// One characteristic object, as used in `/accessories`, read responses and
/// events. `aid` is included when given.
pub fn characteristic_json(
    aid: Option<u64>,
    c: &Characteristic,
    value: Option<&Value>,
    options: JsonOptions,
) -> Json {
    let mut object = Map::new();
    if let Some(aid) = aid {
        object.insert("aid".into(), json!(aid));
    }
    object.insert("iid".into(), json!(c.iid()));
    if options.hap_type {
        object.insert("type".into(), json!(c.hap_type().to_short_string()));
    }
    if options.perms {
        object.insert("perms".into(), json!(c.perms().codes()));
    }
    if let Some(value) = value {
        object.insert("value".into(), value.to_json());
    }
    if options.meta {
        let props = c.properties();
        object.insert("format".into(), json!(props.format));
        if let Some(description) = &props.description {
            object.insert("description".into(), json!(description));
        }
        if let Some(unit) = props.unit {
            object.insert("unit".into(), json!(unit));
        }
        if let Some(min) = props.min_value {
            object.insert("minValue".into(), number(min));
        }
        if let Some(max) = props.max_value {
            object.insert("maxValue".into(), number(max));
        }
        if let Some(step) = props.min_step {
            object.insert("minStep".into(), number(step));
        }
        if let Some(len) = props.max_len {
            object.insert("maxLen".into(), json!(len));
        }
        if let Some(len) = props.max_data_len {
            object.insert("maxDataLen".into(), json!(len));
        }
        if let Some(valid) = &props.valid_values {
            object.insert("valid-values".into(), json!(valid));
        }
        if let Some((lo, hi)) = props.valid_values_range {
            object.insert("valid-values-range".into(), json!([lo, hi]));
        }
    }
    Json::Object(object)
}

/// Integral metadata renders without a fractional part.
fn number(n: f64) -> Json {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        json!(n as i64)
    } else {
        json!(n)
    }
}
