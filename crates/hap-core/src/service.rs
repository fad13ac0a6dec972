//! Services: ordered groups of characteristics under a semantic type.

use crate::accessory::IidAllocator;
use crate::catalog::{CharacteristicDef, ServiceDef};
use crate::characteristic::{Characteristic, Setter};
use crate::error::{AccessoryError, CharacteristicError};
use crate::format::Value;
use crate::hap_type::HapType;
use std::sync::Arc;

/// A service of an accessory.
///
/// Characteristic IIDs come from the owning accessory's allocator, so they
/// are unique across all services of that accessory and never reused.
#[derive(Debug)]
pub struct Service {
    iid: u64,
    hap_type: HapType,
    name: String,
    primary: bool,
    hidden: bool,
    linked: Vec<u64>,
    characteristics: Vec<Arc<Characteristic>>,
    iids: IidAllocator,
}

impl Service {
    pub(crate) fn new(def: &ServiceDef, iids: IidAllocator) -> Self {
        Self {
            iid: iids.next(),
            hap_type: def.hap_type,
            name: def.name.clone(),
            primary: false,
            hidden: false,
            linked: Vec::new(),
            characteristics: Vec::new(),
            iids,
        }
    }

    pub fn iid(&self) -> u64 {
        self.iid
    }

    pub fn hap_type(&self) -> HapType {
        self.hap_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub(crate) fn set_primary(&mut self, primary: bool) {
        self.primary = primary;
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    pub fn linked(&self) -> &[u64] {
        &self.linked
    }

    /// Link another service of the same accessory by its IID.
    pub fn add_linked_service(&mut self, iid: u64) {
        if !self.linked.contains(&iid) {
            self.linked.push(iid);
        }
    }

    /// Append a characteristic, assigning it the next IID.
    pub fn add_characteristic(
        &mut self,
        def: &CharacteristicDef,
    ) -> Result<Arc<Characteristic>, AccessoryError> {
        if self
            .characteristics
            .iter()
            .any(|c| c.hap_type() == def.hap_type)
        {
            return Err(AccessoryError::DuplicateCharacteristic(def.name.clone()));
        }
        let characteristic = Arc::new(def.instantiate(self.iids.next()));
        self.characteristics.push(characteristic.clone());
        Ok(characteristic)
    }

    /// Set the initial value of a characteristic and optionally its setter.
    pub fn configure_characteristic(
        &self,
        name: &str,
        initial: impl Into<Value>,
        setter: Option<Setter>,
    ) -> Result<Arc<Characteristic>, AccessoryError> {
        let characteristic = self
            .characteristic(name)
            .ok_or_else(|| AccessoryError::UnknownCharacteristic(name.to_string()))?
            .clone();
        let initial = initial.into();
        characteristic
            .set_value(&initial, |_| {})
            .map_err(|e: CharacteristicError| {
                AccessoryError::InvalidDefinition(format!("{} = {:?}: {}", name, initial, e))
            })?;
        if let Some(setter) = setter {
            characteristic.set_setter(setter);
        }
        Ok(characteristic)
    }

    /// Characteristics in creation order.
    pub fn characteristics(&self) -> &[Arc<Characteristic>] {
        &self.characteristics
    }

    pub fn characteristic(&self, name: &str) -> Option<&Arc<Characteristic>> {
        self.characteristics.iter().find(|c| c.name() == name)
    }

    pub fn characteristic_by_type(&self, hap_type: HapType) -> Option<&Arc<Characteristic>> {
        self.characteristics
            .iter()
            .find(|c| c.hap_type() == hap_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::characteristic::Properties;
    use crate::format::Format;
    use crate::permissions::Permissions;

    fn thermostat() -> Service {
        let catalog = Catalog::builtin();
        let mut svc = Service::new(catalog.service("Thermostat").unwrap(), IidAllocator::default());
        for name in ["CurrentTemperature", "TargetTemperature", "TemperatureDisplayUnits"] {
            svc.add_characteristic(catalog.characteristic(name).unwrap())
                .unwrap();
        }
        svc
    }

    #[test]
    fn iids_are_monotonic_after_service_iid() {
        let svc = thermostat();
        assert_eq!(svc.iid(), 1);
        let iids: Vec<u64> = svc.characteristics().iter().map(|c| c.iid()).collect();
        assert_eq!(iids, vec![2, 3, 4]);
    }

    #[test]
    fn characteristics_keep_insertion_order() {
        let svc = thermostat();
        let names: Vec<&str> = svc.characteristics().iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            vec!["CurrentTemperature", "TargetTemperature", "TemperatureDisplayUnits"]
        );
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let mut svc = thermostat();
        let def = Catalog::builtin().characteristic("TargetTemperature").unwrap();
        let err = svc.add_characteristic(def).unwrap_err();
        assert_eq!(
            err,
            AccessoryError::DuplicateCharacteristic("TargetTemperature".into())
        );
        assert_eq!(svc.characteristics().len(), 3);
    }

    #[test]
    fn failed_add_does_not_consume_iid() {
        let mut svc = thermostat();
        let dup = Catalog::builtin().characteristic("TargetTemperature").unwrap();
        let _ = svc.add_characteristic(dup);
        let name = Catalog::builtin().characteristic("Name").unwrap();
        let added = svc.add_characteristic(name).unwrap();
        assert_eq!(added.iid(), 5);
    }

    #[test]
    fn configure_sets_initial_value_and_setter() {
        let svc = thermostat();
        let c = svc
            .configure_characteristic("TargetTemperature", 20.0, Some(Arc::new(|_| Ok(()))))
            .unwrap();
        assert_eq!(c.value(), Value::Float(20.0));
    }

    #[test]
    fn configure_coerces_integer_initial_value() {
        let svc = thermostat();
        let c = svc
            .configure_characteristic("TemperatureDisplayUnits", 1, None)
            .unwrap();
        assert_eq!(c.value(), Value::UInt8(1));
    }

    #[test]
    fn configure_rejects_invalid_initial_value() {
        let svc = thermostat();
        let err = svc
            .configure_characteristic("TargetTemperature", 999.0, None)
            .unwrap_err();
        assert!(matches!(err, AccessoryError::InvalidDefinition(_)));
    }

    #[test]
    fn configure_unknown_characteristic_fails() {
        let svc = thermostat();
        let err = svc.configure_characteristic("On", true, None).unwrap_err();
        assert_eq!(err, AccessoryError::UnknownCharacteristic("On".into()));
    }

    #[test]
    fn custom_characteristic_can_be_added() {
        let mut svc = thermostat();
        let def = CharacteristicDef::new(
            "CurrentProgram",
            HapType::parse("b7ddb9a3-54bb-4572-91d2-f1f5b0510f8c").unwrap(),
            Properties::new(Format::Uint8, Permissions::read_notify()),
        );
        let c = svc.add_characteristic(&def).unwrap();
        assert!(svc.characteristic("CurrentProgram").is_some());
        assert_eq!(c.iid(), 5);
    }
}
