//! Accessories, bridges and the accessory graph handed to the server.

use crate::catalog::Catalog;
use crate::characteristic::{Characteristic, Setter, DEFAULT_MAX_LEN};
use crate::error::AccessoryError;
use crate::service::Service;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, warn};

/// AID of the primary accessory (standalone accessory or bridge).
pub const PRIMARY_AID: u64 = 1;

/// Maximum number of accessories behind one bridge.
pub const MAX_BRIDGED_ACCESSORIES: usize = 149;

/// Accessory category advertised in the `ci` TXT field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Other,
    Bridge,
    Fan,
    GarageDoorOpener,
    Lightbulb,
    DoorLock,
    Outlet,
    Switch,
    Thermostat,
    Sensor,
    SecuritySystem,
    Door,
    Window,
    WindowCovering,
    ProgrammableSwitch,
    RangeExtender,
    IpCamera,
    VideoDoorbell,
    AirPurifier,
    Heater,
    AirConditioner,
    Humidifier,
    Dehumidifier,
    Sprinkler,
    Faucet,
    ShowerHead,
}

impl Category {
    pub fn code(self) -> u16 {
        match self {
            Category::Other => 1,
            Category::Bridge => 2,
            Category::Fan => 3,
            Category::GarageDoorOpener => 4,
            Category::Lightbulb => 5,
            Category::DoorLock => 6,
            Category::Outlet => 7,
            Category::Switch => 8,
            Category::Thermostat => 9,
            Category::Sensor => 10,
            Category::SecuritySystem => 11,
            Category::Door => 12,
            Category::Window => 13,
            Category::WindowCovering => 14,
            Category::ProgrammableSwitch => 15,
            Category::RangeExtender => 16,
            Category::IpCamera => 17,
            Category::VideoDoorbell => 18,
            Category::AirPurifier => 19,
            Category::Heater => 20,
            Category::AirConditioner => 21,
            Category::Humidifier => 22,
            Category::Dehumidifier => 23,
            Category::Sprinkler => 28,
            Category::Faucet => 29,
            Category::ShowerHead => 30,
        }
    }
}

/// Per-accessory instance id counter shared by all of its services.
#[derive(Debug, Clone)]
pub struct IidAllocator(Arc<AtomicU64>);

impl Default for IidAllocator {
    fn default() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }
}

impl IidAllocator {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

/// Accessory information supplied at construction time.
#[derive(Debug, Clone)]
pub struct AccessoryInfo {
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware_revision: String,
}

impl Default for AccessoryInfo {
    fn default() -> Self {
        Self {
            manufacturer: "Default-Manufacturer".to_string(),
            model: "Default-Model".to_string(),
            serial_number: "Default-SerialNumber".to_string(),
            firmware_revision: "1.0".to_string(),
        }
    }
}

/// A HAP accessory: an AID plus an ordered list of services.
///
/// Every accessory starts with an AccessoryInformation service at IID 1.
#[derive(Debug)]
pub struct Accessory {
    aid: Option<u64>,
    name: String,
    category: Category,
    services: Vec<Service>,
    iids: IidAllocator,
}

impl Accessory {
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self::with_info(name, category, AccessoryInfo::default())
    }

    pub fn with_info(name: impl Into<String>, category: Category, info: AccessoryInfo) -> Self {
        let name = name.into();
        let mut accessory = Self {
            aid: None,
            name: name.clone(),
            category,
            services: Vec::new(),
            iids: IidAllocator::default(),
        };
        accessory.add_information_service(&name, &info);
        accessory
    }

    fn add_information_service(&mut self, name: &str, info: &AccessoryInfo) {
        let catalog = Catalog::builtin();
        let def = match catalog.service("AccessoryInformation") {
            Ok(def) => def,
            Err(e) => {
                error!(accessory = %name, error = %e, "Catalog has no AccessoryInformation service");
                return;
            }
        };
        let mut service = Service::new(def, self.iids.clone());
        for (char_name, value) in [
            ("Identify", None),
            ("Manufacturer", Some(info.manufacturer.as_str())),
            ("Model", Some(info.model.as_str())),
            ("Name", Some(name)),
            ("SerialNumber", Some(info.serial_number.as_str())),
            ("FirmwareRevision", Some(info.firmware_revision.as_str())),
        ] {
            let c = match catalog
                .characteristic(char_name)
                .and_then(|def| service.add_characteristic(def))
            {
                Ok(c) => c,
                Err(e) => {
                    error!(accessory = %name, characteristic = char_name, error = %e, "Cannot add information characteristic");
                    continue;
                }
            };
            let Some(value) = value else {
                continue;
            };
            let max = c.properties().max_len.unwrap_or(DEFAULT_MAX_LEN);
            let value = if value.chars().count() > max {
                warn!(accessory = %name, characteristic = char_name, max, "Truncating information value");
                value.chars().take(max).collect::<String>()
            } else {
                value.to_string()
            };
            if let Err(e) = c.set_value(&value.into(), |_| {}) {
                warn!(accessory = %name, characteristic = char_name, error = %e, "Information value rejected");
            }
        }
        self.services.push(service);
    }

    /// Request a specific AID. Only meaningful for bridged accessories,
    /// standalone accessories always use AID 1.
    pub fn with_aid(mut self, aid: u64) -> Self {
        self.aid = Some(aid);
        self
    }

    pub fn aid(&self) -> Option<u64> {
        self.aid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Add a service from the built-in catalog with its required characteristics.
    pub fn add_service(&mut self, name: &str) -> Result<&mut Service, AccessoryError> {
        self.add_preload_service(Catalog::builtin(), name, &[])
    }

    /// Add a service with its required characteristics plus `optional` ones.
    pub fn add_preload_service(
        &mut self,
        catalog: &Catalog,
        name: &str,
        optional: &[&str],
    ) -> Result<&mut Service, AccessoryError> {
        let def = catalog.service(name)?;
        let char_defs = def
            .required
            .iter()
            .map(String::as_str)
            .chain(optional.iter().copied())
            .map(|n| catalog.characteristic(n))
            .collect::<Result<Vec<_>, _>>()?;

        let mut service = Service::new(def, self.iids.clone());
        for char_def in char_defs {
            if service.characteristic_by_type(char_def.hap_type).is_some() {
                continue;
            }
            service.add_characteristic(char_def)?;
        }
        self.services.push(service);
        let last = self.services.len() - 1;
        Ok(&mut self.services[last])
    }

    /// Mark the service with `iid` as primary; clears any previous primary.
    pub fn set_primary_service(&mut self, iid: u64) -> Result<(), AccessoryError> {
        if !self.services.iter().any(|s| s.iid() == iid) {
            return Err(AccessoryError::ServiceNotFound(iid));
        }
        for service in &mut self.services {
            service.set_primary(service.iid() == iid);
        }
        Ok(())
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn service(&self, iid: u64) -> Option<&Service> {
        self.services.iter().find(|s| s.iid() == iid)
    }

    pub fn service_mut(&mut self, iid: u64) -> Option<&mut Service> {
        self.services.iter_mut().find(|s| s.iid() == iid)
    }

    pub fn service_by_name(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name() == name)
    }

    pub fn service_by_name_mut(&mut self, name: &str) -> Option<&mut Service> {
        self.services.iter_mut().find(|s| s.name() == name)
    }

    /// All characteristics of all services, in IID order of creation.
    pub fn characteristics(&self) -> impl Iterator<Item = &Arc<Characteristic>> {
        self.services.iter().flat_map(|s| s.characteristics().iter())
    }

    pub fn characteristic(&self, iid: u64) -> Option<&Arc<Characteristic>> {
        self.characteristics().find(|c| c.iid() == iid)
    }

    /// Register the callback run when a controller identifies this accessory.
    pub fn on_identify(&self, setter: Setter) {
        if let Some(c) = self
            .service_by_name("AccessoryInformation")
            .and_then(|s| s.characteristic("Identify"))
        {
            c.set_setter(setter);
        }
    }

    fn assign_aid(&mut self, aid: u64) {
        self.aid = Some(aid);
    }
}

/// A bridge accessory (AID 1) aggregating child accessories.
#[derive(Debug)]
pub struct Bridge {
    accessory: Accessory,
    children: Vec<Accessory>,
}

impl Bridge {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_info(name, AccessoryInfo::default())
    }

    pub fn with_info(name: impl Into<String>, info: AccessoryInfo) -> Self {
        let mut accessory = Accessory::with_info(name, Category::Bridge, info);
        accessory.assign_aid(PRIMARY_AID);
        Self {
            accessory,
            children: Vec::new(),
        }
    }

    /// The bridge's own accessory (information service and any extras).
    pub fn accessory(&self) -> &Accessory {
        &self.accessory
    }

    pub fn accessory_mut(&mut self) -> &mut Accessory {
        &mut self.accessory
    }

    /// Attach a child. Returns the AID it was assigned.
    pub fn add_accessory(&mut self, mut child: Accessory) -> Result<u64, AccessoryError> {
        if self.children.len() >= MAX_BRIDGED_ACCESSORIES {
            return Err(AccessoryError::TooManyAccessories(MAX_BRIDGED_ACCESSORIES));
        }
        let aid = match child.aid() {
            Some(PRIMARY_AID) => return Err(AccessoryError::ReservedAid),
            Some(aid) if self.children.iter().any(|c| c.aid() == Some(aid)) => {
                return Err(AccessoryError::DuplicateAid(aid));
            }
            Some(aid) => aid,
            None => self.next_free_aid(),
        };
        child.assign_aid(aid);
        self.children.push(child);
        Ok(aid)
    }

    pub fn children(&self) -> &[Accessory] {
        &self.children
    }

    pub fn child(&self, aid: u64) -> Option<&Accessory> {
        self.children.iter().find(|c| c.aid() == Some(aid))
    }

    fn next_free_aid(&self) -> u64 {
        let mut aid = PRIMARY_AID + 1;
        while self.children.iter().any(|c| c.aid() == Some(aid)) {
            aid += 1;
        }
        aid
    }
}

/// The accessories exposed by one server instance.
#[derive(Debug)]
pub enum AccessoryGraph {
    Standalone(Accessory),
    Bridged(Bridge),
}

impl AccessoryGraph {
    pub fn name(&self) -> &str {
        match self {
            AccessoryGraph::Standalone(a) => a.name(),
            AccessoryGraph::Bridged(b) => b.accessory().name(),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            AccessoryGraph::Standalone(a) => a.category(),
            AccessoryGraph::Bridged(_) => Category::Bridge,
        }
    }

    /// Flatten into accessories with final AIDs, primary first.
    pub fn into_accessories(self) -> Result<Vec<Accessory>, AccessoryError> {
        match self {
            AccessoryGraph::Standalone(mut accessory) => match accessory.aid() {
                None | Some(PRIMARY_AID) => {
                    accessory.assign_aid(PRIMARY_AID);
                    Ok(vec![accessory])
                }
                Some(other) => Err(AccessoryError::StandaloneAid(other)),
            },
            AccessoryGraph::Bridged(bridge) => {
                let mut all = Vec::with_capacity(bridge.children.len() + 1);
                all.push(bridge.accessory);
                all.extend(bridge.children);
                Ok(all)
            }
        }
    }
}

impl From<Accessory> for AccessoryGraph {
    fn from(accessory: Accessory) -> Self {
        AccessoryGraph::Standalone(accessory)
    }
}

impl From<Bridge> for AccessoryGraph {
    fn from(bridge: Bridge) -> Self {
        AccessoryGraph::Bridged(bridge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Value;

    mod accessory {
        use super::*;

        #[test]
        fn information_service_is_first_with_iid_1() {
            let acc = Accessory::new("EcoBee", Category::Thermostat);
            let info = &acc.services()[0];
            assert_eq!(info.iid(), 1);
            assert_eq!(info.name(), "AccessoryInformation");
            let name = info.characteristic("Name").unwrap();
            assert_eq!(name.value(), Value::String("EcoBee".into()));
        }

        #[test]
        fn long_information_values_are_truncated() {
            let info = AccessoryInfo {
                manufacturer: "m".repeat(80),
                ..AccessoryInfo::default()
            };
            let acc = Accessory::with_info("x".repeat(65), Category::Other, info);
            let service = &acc.services()[0];
            assert_eq!(
                service.characteristic("Name").unwrap().value(),
                Value::String("x".repeat(64))
            );
            assert_eq!(
                service.characteristic("Manufacturer").unwrap().value(),
                Value::String("m".repeat(64))
            );
            assert_eq!(acc.name(), "x".repeat(65));
        }

        #[test]
        fn iids_are_unique_across_services() {
            let mut acc = Accessory::new("EcoBee", Category::Thermostat);
            acc.add_preload_service(Catalog::builtin(), "Thermostat", &["Name", "CurrentRelativeHumidity"])
                .unwrap();
            let mut iids: Vec<u64> = acc
                .services()
                .iter()
                .map(|s| s.iid())
                .chain(acc.characteristics().map(|c| c.iid()))
                .collect();
            let total = iids.len();
            iids.sort_unstable();
            iids.dedup();
            assert_eq!(iids.len(), total);
        }

        #[test]
        fn preload_service_adds_required_and_optional() {
            let mut acc = Accessory::new("EcoBee", Category::Thermostat);
            let svc = acc
                .add_preload_service(Catalog::builtin(), "Thermostat", &["CurrentRelativeHumidity"])
                .unwrap();
            assert_eq!(svc.characteristics().len(), 6);
            assert!(svc.characteristic("CurrentRelativeHumidity").is_some());
        }

        #[test]
        fn preload_ignores_optional_already_required() {
            let mut acc = Accessory::new("EcoBee", Category::Thermostat);
            let svc = acc
                .add_preload_service(Catalog::builtin(), "Thermostat", &["TargetTemperature"])
                .unwrap();
            assert_eq!(svc.characteristics().len(), 5);
        }

        #[test]
        fn unknown_service_is_error() {
            let mut acc = Accessory::new("EcoBee", Category::Thermostat);
            assert!(matches!(
                acc.add_service("Teleporter"),
                Err(AccessoryError::UnknownService(_))
            ));
        }

        #[test]
        fn set_primary_service_is_exclusive() {
            let mut acc = Accessory::new("Sensor", Category::Sensor);
            let a = acc.add_service("TemperatureSensor").unwrap().iid();
            let b = acc.add_service("HumiditySensor").unwrap().iid();
            acc.set_primary_service(a).unwrap();
            acc.set_primary_service(b).unwrap();
            assert!(!acc.service(a).unwrap().is_primary());
            assert!(acc.service(b).unwrap().is_primary());
            assert_eq!(
                acc.set_primary_service(99),
                Err(AccessoryError::ServiceNotFound(99))
            );
        }

        #[test]
        fn characteristic_lookup_by_iid() {
            let mut acc = Accessory::new("Sensor", Category::Sensor);
            let svc = acc.add_service("TemperatureSensor").unwrap();
            let iid = svc.characteristic("CurrentTemperature").unwrap().iid();
            assert_eq!(acc.characteristic(iid).unwrap().name(), "CurrentTemperature");
            assert!(acc.characteristic(999).is_none());
        }
    }

    mod bridge {
        use super::*;

        #[test]
        fn bridge_is_aid_1() {
            let bridge = Bridge::new("Bridge");
            assert_eq!(bridge.accessory().aid(), Some(PRIMARY_AID));
            assert_eq!(bridge.accessory().category(), Category::Bridge);
        }

        #[test]
        fn children_get_sequential_aids() {
            let mut bridge = Bridge::new("Bridge");
            let a = bridge.add_accessory(Accessory::new("A", Category::Sensor)).unwrap();
            let b = bridge.add_accessory(Accessory::new("B", Category::Sensor)).unwrap();
            assert_eq!((a, b), (2, 3));
        }

        #[test]
        fn explicit_aid_is_kept() {
            let mut bridge = Bridge::new("Bridge");
            let aid = bridge
                .add_accessory(Accessory::new("Humidity", Category::Sensor).with_aid(34534))
                .unwrap();
            assert_eq!(aid, 34534);
            assert!(bridge.child(34534).is_some());
        }

        #[test]
        fn auto_aid_skips_taken_ids() {
            let mut bridge = Bridge::new("Bridge");
            bridge
                .add_accessory(Accessory::new("A", Category::Sensor).with_aid(2))
                .unwrap();
            let next = bridge.add_accessory(Accessory::new("B", Category::Sensor)).unwrap();
            assert_eq!(next, 3);
        }

        #[test]
        fn reusing_aid_1_is_rejected() {
            let mut bridge = Bridge::new("Bridge");
            let err = bridge
                .add_accessory(Accessory::new("A", Category::Sensor).with_aid(1))
                .unwrap_err();
            assert_eq!(err, AccessoryError::ReservedAid);
            assert!(bridge.children().is_empty());
        }

        #[test]
        fn duplicate_aid_is_rejected() {
            let mut bridge = Bridge::new("Bridge");
            bridge
                .add_accessory(Accessory::new("A", Category::Sensor).with_aid(7))
                .unwrap();
            let err = bridge
                .add_accessory(Accessory::new("B", Category::Sensor).with_aid(7))
                .unwrap_err();
            assert_eq!(err, AccessoryError::DuplicateAid(7));
        }

        #[test]
        fn capacity_is_enforced() {
            let mut bridge = Bridge::new("Bridge");
            for i in 0..MAX_BRIDGED_ACCESSORIES {
                bridge
                    .add_accessory(Accessory::new(format!("S{}", i), Category::Sensor))
                    .unwrap();
            }
            assert_eq!(
                bridge.add_accessory(Accessory::new("extra", Category::Sensor)),
                Err(AccessoryError::TooManyAccessories(MAX_BRIDGED_ACCESSORIES))
            );
        }
    }

    mod graph {
        use super::*;

        #[test]
        fn standalone_defaults_to_aid_1() {
            let graph = AccessoryGraph::from(Accessory::new("Thermostat", Category::Thermostat));
            let all = graph.into_accessories().unwrap();
            assert_eq!(all[0].aid(), Some(1));
        }

        #[test]
        fn standalone_with_other_aid_is_rejected() {
            let graph =
                AccessoryGraph::from(Accessory::new("Thermostat", Category::Thermostat).with_aid(5));
            assert_eq!(
                graph.into_accessories().unwrap_err(),
                AccessoryError::StandaloneAid(5)
            );
        }

        #[test]
        fn bridged_graph_flattens_with_unique_aids() {
            let mut bridge = Bridge::new("Bridge");
            bridge.add_accessory(Accessory::new("A", Category::Sensor)).unwrap();
            bridge
                .add_accessory(Accessory::new("B", Category::Sensor).with_aid(34534))
                .unwrap();
            let graph = AccessoryGraph::from(bridge);
            assert_eq!(graph.category(), Category::Bridge);
            let aids: Vec<u64> = graph
                .into_accessories()
                .unwrap()
                .iter()
                .filter_map(|a| a.aid())
                .collect();
            assert_eq!(aids, vec![1, 2, 34534]);
        }
    }

    #[test]
    fn category_codes() {
        assert_eq!(Category::Bridge.code(), 2);
        assert_eq!(Category::Thermostat.code(), 9);
        assert_eq!(Category::Sensor.code(), 10);
        assert_eq!(Category::ShowerHead.code(), 30);
    }
}
