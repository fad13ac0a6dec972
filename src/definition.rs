//! Declarative accessory definitions.
//!
//! ```json
//! {
//!   "bridge": "Porch Bridge",
//!   "accessories": [
//!     {
//!       "name": "Porch Light",
//!       "category": "lightbulb",
//!       "services": [
//!         { "type": "Lightbulb", "optional": ["Brightness"], "primary": true,
//!           "values": { "On": false, "Brightness": 40 } }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Without `bridge` the file must hold exactly one accessory.

use anyhow::{bail, Context, Result};
use hap_core::{Accessory, AccessoryGraph, AccessoryInfo, Bridge, Category, Setter, Value};
use serde::Deserialize;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Definition {
    #[serde(default)]
    pub bridge: Option<String>,
    pub accessories: Vec<AccessoryDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessoryDefinition {
    pub name: String,
    #[serde(default = "default_category")]
    pub category: Category,
    #[serde(default)]
    pub aid: Option<u64>,
    #[serde(default)]
    pub info: Option<InfoDefinition>,
    pub services: Vec<ServiceDefinition>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InfoDefinition {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_revision: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDefinition {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub optional: Vec<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub hidden: bool,
    /// Initial values by characteristic name.
    #[serde(default)]
    pub values: BTreeMap<String, Json>,
}

fn default_category() -> Category {
    Category::Other
}

impl From<InfoDefinition> for AccessoryInfo {
    fn from(def: InfoDefinition) -> Self {
        let defaults = AccessoryInfo::default();
        AccessoryInfo {
            manufacturer: def.manufacturer.unwrap_or(defaults.manufacturer),
            model: def.model.unwrap_or(defaults.model),
            serial_number: def.serial_number.unwrap_or(defaults.serial_number),
            firmware_revision: def.firmware_revision.unwrap_or(defaults.firmware_revision),
        }
    }
}

impl Definition {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("parsing {}", path.display()))
    }

    /// Instantiate the accessories. Controller writes are logged.
    pub fn build(self) -> Result<AccessoryGraph> {
        match self.bridge {
            Some(name) => {
                let mut bridge = Bridge::new(name);
                for def in self.accessories {
                    bridge.add_accessory(def.build()?)?;
                }
                Ok(bridge.into())
            }
            None => {
                let mut accessories = self.accessories.into_iter();
                match (accessories.next(), accessories.next()) {
                    (Some(def), None) => Ok(def.build()?.into()),
                    (None, _) => bail!("no accessories defined"),
                    (Some(_), Some(_)) => bail!("several accessories need a \"bridge\" name"),
                }
            }
        }
    }
}

impl AccessoryDefinition {
    fn build(self) -> Result<Accessory> {
        let info = self.info.map(AccessoryInfo::from).unwrap_or_default();
        let mut accessory = Accessory::with_info(&self.name, self.category, info);
        if let Some(aid) = self.aid {
            accessory = accessory.with_aid(aid);
        }

        for def in self.services {
            let optional: Vec<&str> = def.optional.iter().map(String::as_str).collect();
            let service = accessory
                .add_preload_service(hap_core::Catalog::builtin(), &def.service_type, &optional)
                .with_context(|| format!("{}: service {}", self.name, def.service_type))?;
            service.set_hidden(def.hidden);
            let service_iid = service.iid();

            for (name, json) in &def.values {
                let characteristic = service
                    .characteristic(name)
                    .with_context(|| format!("{}: no characteristic {}", self.name, name))?;
                let value = characteristic
                    .properties()
                    .format
                    .decode(json)
                    .with_context(|| format!("{}: {} = {}", self.name, name, json))?;
                service
                    .configure_characteristic(name, value, None)
                    .with_context(|| format!("{}: {}", self.name, name))?;
            }
            for characteristic in service.characteristics() {
                if characteristic.perms().writable() {
                    characteristic.set_setter(log_writes(&self.name, characteristic.name()));
                }
            }
            if def.primary {
                accessory.set_primary_service(service_iid)?;
            }
        }
        Ok(accessory)
    }
}

/// Setter that records controller writes.
pub fn log_writes(accessory: &str, characteristic: &str) -> Setter {
    let accessory = accessory.to_string();
    let characteristic = characteristic.to_string();
    Arc::new(move |value: &Value| {
        info!(%accessory, %characteristic, ?value, "Controller write");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parse {
        use super::*;

        #[test]
        fn unknown_fields_are_rejected() {
            let err = Definition::from_json(r#"{"accessories":[],"extra":1}"#);
            assert!(err.is_err());
        }

        #[test]
        fn category_defaults_to_other() {
            let def = Definition::from_json(
                r#"{"accessories":[{"name":"Thing","services":[]}]}"#,
            )
            .unwrap();
            assert_eq!(def.accessories[0].category, Category::Other);
        }
    }

    mod build {
        use super::*;

        #[test]
        fn single_accessory_is_standalone() {
            let graph = Definition::from_json(
                r#"{"accessories":[{"name":"Lamp","category":"lightbulb",
                    "services":[{"type":"Lightbulb","optional":["Brightness"],
                                 "values":{"On":true,"Brightness":40}}]}]}"#,
            )
            .unwrap()
            .build()
            .unwrap();
            let AccessoryGraph::Standalone(lamp) = graph else {
                panic!("expected a standalone accessory");
            };
            let bulb = lamp.service_by_name("Lightbulb").unwrap();
            assert_eq!(bulb.characteristic("On").unwrap().value(), Value::Bool(true));
            assert_eq!(
                bulb.characteristic("Brightness").unwrap().value().as_f64(),
                Some(40.0)
            );
        }

        #[test]
        fn bridge_collects_children() {
            let graph = Definition::from_json(
                r#"{"bridge":"Hub","accessories":[
                    {"name":"A","category":"switch","services":[{"type":"Switch"}]},
                    {"name":"B","category":"switch","aid":7,"services":[{"type":"Switch"}]}]}"#,
            )
            .unwrap()
            .build()
            .unwrap();
            let AccessoryGraph::Bridged(bridge) = graph else {
                panic!("expected a bridge");
            };
            assert_eq!(bridge.children().len(), 2);
            assert!(bridge.child(7).is_some());
        }

        #[test]
        fn several_accessories_need_a_bridge() {
            let result = Definition::from_json(
                r#"{"accessories":[
                    {"name":"A","services":[]},{"name":"B","services":[]}]}"#,
            )
            .unwrap()
            .build();
            assert!(result.is_err());
        }

        #[test]
        fn out_of_range_value_is_an_error() {
            let result = Definition::from_json(
                r#"{"accessories":[{"name":"T","category":"thermostat",
                    "services":[{"type":"Thermostat","values":{"TargetTemperature":99}}]}]}"#,
            )
            .unwrap()
            .build();
            assert!(result.is_err());
        }

        #[test]
        fn unknown_characteristic_is_an_error() {
            let result = Definition::from_json(
                r#"{"accessories":[{"name":"S","services":[{"type":"Switch","values":{"Nope":1}}]}]}"#,
            )
            .unwrap()
            .build();
            assert!(result.is_err());
        }

        #[test]
        fn primary_flag_marks_service() {
            let graph = Definition::from_json(
                r#"{"accessories":[{"name":"S","services":[
                    {"type":"Switch"},{"type":"Lightbulb","primary":true}]}]}"#,
            )
            .unwrap()
            .build()
            .unwrap();
            let AccessoryGraph::Standalone(acc) = graph else {
                panic!("expected a standalone accessory");
            };
            assert!(acc.service_by_name("Lightbulb").unwrap().is_primary());
            assert!(!acc.service_by_name("Switch").unwrap().is_primary());
        }
    }

    #[test]
    fn bundled_demo_definitions_build() {
        for file in ["bridge.json", "thermostat.json"] {
            let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join(file);
            Definition::load(&path).unwrap().build().unwrap();
        }
    }
}
