//! Characteristic value cells.
//!
//! A [`Characteristic`] owns one typed value behind its own lock. Remote
//! writes go through [`Characteristic::write`], local sensor updates through
//! [`Characteristic::set_value`]. Both validate against the declared
//! [`Properties`] and call an `on_commit` hook while the value lock is held,
//! which is where the server fans the change out to subscribers. Doing the
//! fan-out inside the lock is what keeps notifications for one
//! characteristic in commit order.
//!
//! The setter callback runs *before* the lock is taken, so a slow callback
//! never blocks readers of the same characteristic.

use crate::error::{Access, CharacteristicError};
use crate::format::{Format, Unit, Value};
use crate::hap_type::HapType;
use crate::permissions::Permissions;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Default `maxLen` for string characteristics.
pub const DEFAULT_MAX_LEN: usize = 64;
/// Hard upper bound for `maxLen`.
pub const MAX_STRING_LEN: usize = 256;
/// Default `maxDataLen` for data characteristics.
pub const DEFAULT_MAX_DATA_LEN: usize = 2_097_152;

/// Failure reported by a setter callback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SetterError {
    /// The accessory refuses the value; it is not stored.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Something went wrong while acting on the value; it is still stored.
    #[error("failed: {0}")]
    Failed(String),
}

/// Callback invoked with the validated value of a remote write.
pub type Setter = Arc<dyn Fn(&Value) -> Result<(), SetterError> + Send + Sync>;

/// Callback producing a fresh value on read. `None` keeps the cached value.
pub type Getter = Arc<dyn Fn() -> Option<Value> + Send + Sync>;

/// Declared metadata of a characteristic.
#[derive(Debug, Clone, PartialEq)]
pub struct Properties {
    pub format: Format,
    pub perms: Permissions,
    pub unit: Option<Unit>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_step: Option<f64>,
    pub max_len: Option<usize>,
    pub max_data_len: Option<usize>,
    pub valid_values: Option<Vec<i64>>,
    pub valid_values_range: Option<(i64, i64)>,
    pub description: Option<String>,
}

impl Properties {
    pub fn new(format: Format, perms: Permissions) -> Self {
        Self {
            format,
            perms,
            unit: None,
            min_value: None,
            max_value: None,
            min_step: None,
            max_len: None,
            max_data_len: None,
            valid_values: None,
            valid_values_range: None,
            description: None,
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.min_step = Some(step);
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn with_valid_values(mut self, values: Vec<i64>) -> Self {
        self.valid_values = Some(values);
        self
    }

    pub fn with_max_len(mut self, len: usize) -> Self {
        self.max_len = Some(len.min(MAX_STRING_LEN));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check a value already in this format against the declared constraints.
    pub fn check(&self, value: &Value) -> Result<(), CharacteristicError> {
        let invalid = |msg: String| Err(CharacteristicError::InvalidValue(msg));

        if let Some(n) = value.as_f64() {
            if !n.is_finite() {
                return invalid(format!("{} is not a finite number", n));
            }
            if let Some(min) = self.min_value {
                if n < min {
                    return invalid(format!("{} below minimum {}", n, min));
                }
            }
            if let Some(max) = self.max_value {
                if n > max {
                    return invalid(format!("{} above maximum {}", n, max));
                }
            }
            if self.format.is_integer() {
                let i = n as i64;
                if let Some(valid) = &self.valid_values {
                    if !valid.contains(&i) {
                        return invalid(format!("{} not in valid values {:?}", i, valid));
                    }
                }
                if let Some((lo, hi)) = self.valid_values_range {
                    if i < lo || i > hi {
                        return invalid(format!("{} outside valid range {}..={}", i, lo, hi));
                    }
                }
            }
        }

        match value {
            Value::String(s) => {
                let max = self.max_len.unwrap_or(DEFAULT_MAX_LEN);
                if s.chars().count() > max {
                    return invalid(format!("string longer than {} characters", max));
                }
            }
            Value::Data(bytes) | Value::Tlv8(bytes) => {
                let max = self.max_data_len.unwrap_or(DEFAULT_MAX_DATA_LEN);
                if bytes.len() > max {
                    return invalid(format!("data longer than {} bytes", max));
                }
            }
            _ => {}
        }

        Ok(())
    }
}

/// Result of a committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Whether the stored value differs from the previous one.
    pub changed: bool,
}

/// A single typed, addressable property of an accessory.
pub struct Characteristic {
    iid: u64,
    hap_type: HapType,
    name: String,
    props: Properties,
    value: Mutex<Value>,
    setter: RwLock<Option<Setter>>,
    getter: RwLock<Option<Getter>>,
}

impl Characteristic {
    /// Create a characteristic holding the format's default value.
    pub fn new(iid: u64, hap_type: HapType, name: impl Into<String>, props: Properties) -> Self {
        let initial = match (&props.valid_values, props.min_value) {
            (Some(valid), _) if !valid.is_empty() => props
                .format
                .coerce(&Value::from(valid[0] as i32))
                .unwrap_or_else(|_| props.format.default_value()),
            (_, Some(min)) if props.format.is_numeric() => props
                .format
                .coerce(&Value::Float(min))
                .unwrap_or_else(|_| props.format.default_value()),
            _ => props.format.default_value(),
        };
        Self {
            iid,
            hap_type,
            name: name.into(),
            props,
            value: Mutex::new(initial),
            setter: RwLock::new(None),
            getter: RwLock::new(None),
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

    pub fn properties(&self) -> &Properties {
        &self.props
    }

    pub fn perms(&self) -> Permissions {
        self.props.perms
    }

    /// Register the callback invoked on remote writes.
    pub fn set_setter(&self, setter: Setter) {
        *self.setter.write().unwrap_or_else(|e| e.into_inner()) = Some(setter);
    }

    /// Register the callback consulted on remote reads.
    pub fn set_getter(&self, getter: Getter) {
        *self.getter.write().unwrap_or_else(|e| e.into_inner()) = Some(getter);
    }

    /// Coerce into the declared format and check the constraints.
    pub fn validate(&self, value: &Value) -> Result<Value, CharacteristicError> {
        let value = self.props.format.coerce(value)?;
        self.props.check(&value)?;
        Ok(value)
    }

    /// Current cached value, without permission checks or getter.
    pub fn value(&self) -> Value {
        self.lock().clone()
    }

    /// Remote read: requires `pr` and consults the getter.
    pub fn read(&self) -> Result<Value, CharacteristicError> {
        if !self.props.perms.readable() {
            return Err(CharacteristicError::NotAuthorized(Access::Read));
        }

        let getter = self.getter.read().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(getter) = getter {
            if let Some(fresh) = getter() {
                match self.validate(&fresh) {
                    Ok(fresh) => {
                        *self.lock() = fresh.clone();
                        return Ok(fresh);
                    }
                    Err(e) => {
                        warn!(iid = self.iid, name = %self.name, error = %e, "Getter returned invalid value, serving cached value");
                    }
                }
            }
        }

        Ok(self.value())
    }

    /// Remote write: requires `pw`, validates, runs the setter, commits.
    ///
    /// `on_commit` runs under the value lock, only when the value changed.
    pub fn write<F>(&self, value: &Value, on_commit: F) -> Result<WriteOutcome, CharacteristicError>
    where
        F: FnOnce(&Value),
    {
        if !self.props.perms.writable() {
            return Err(CharacteristicError::NotAuthorized(Access::Write));
        }
        let value = self.validate(value)?;
        let old = self.value();

        let setter = self.setter.read().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(setter) = setter {
            match setter(&value) {
                Ok(()) => {}
                Err(SetterError::Rejected(reason)) => {
                    debug!(iid = self.iid, name = %self.name, %reason, "Setter rejected write");
                    return Err(CharacteristicError::Rejected(reason));
                }
                Err(SetterError::Failed(reason)) => {
                    warn!(iid = self.iid, name = %self.name, %reason, "Setter failed, storing value anyway");
                }
            }
        }

        debug!(iid = self.iid, name = %self.name, old = ?old, new = ?value, "Committing write");
        Ok(self.commit(value, on_commit))
    }

    /// Local update from the accessory side: validated, no setter.
    pub fn set_value<F>(&self, value: &Value, on_commit: F) -> Result<WriteOutcome, CharacteristicError>
    where
        F: FnOnce(&Value),
    {
        let value = self.validate(value)?;
        Ok(self.commit(value, on_commit))
    }

    fn commit<F>(&self, value: Value, on_commit: F) -> WriteOutcome
    where
        F: FnOnce(&Value),
    {
        let mut guard = self.lock();
        let changed = *guard != value;
        *guard = value;
        if changed {
            on_commit(&guard);
        }
        WriteOutcome { changed }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Value> {
        self.value.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Characteristic")
            .field("iid", &self.iid)
            .field("type", &self.hap_type.to_short_string())
            .field("name", &self.name)
            .field("format", &self.props.format)
            .field("value", &*self.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn target_temperature() -> Characteristic {
        Characteristic::new(
            10,
            HapType::apple(0x35),
            "TargetTemperature",
            Properties::new(Format::Float, Permissions::read_write_notify())
                .with_range(10.0, 38.0)
                .with_step(0.1)
                .with_unit(Unit::Celsius),
        )
    }

    fn heating_cooling_state() -> Characteristic {
        Characteristic::new(
            11,
            HapType::apple(0x33),
            "TargetHeatingCoolingState",
            Properties::new(Format::Uint8, Permissions::read_write_notify())
                .with_valid_values(vec![0, 1, 2, 3]),
        )
    }

    mod construction {
        use super::*;

        #[test]
        fn starts_at_minimum_for_ranged_numbers() {
            assert_eq!(target_temperature().value(), Value::Float(10.0));
        }

        #[test]
        fn starts_at_first_valid_value() {
            assert_eq!(heating_cooling_state().value(), Value::UInt8(0));
        }

        #[test]
        fn debug_does_not_require_callbacks() {
            let c = target_temperature();
            c.set_setter(Arc::new(|_| Ok(())));
            let text = format!("{:?}", c);
            assert!(text.contains("TargetTemperature"));
        }
    }

    mod writes {
        use super::*;

        #[test]
        fn write_in_range_commits() {
            let c = target_temperature();
            let outcome = c.write(&Value::Float(25.0), |_| {}).unwrap();
            assert!(outcome.changed);
            assert_eq!(c.value(), Value::Float(25.0));
        }

        #[test]
        fn write_out_of_range_is_invalid_and_keeps_value() {
            let c = target_temperature();
            c.write(&Value::Float(25.0), |_| {}).unwrap();
            let err = c.write(&Value::Float(999.0), |_| {}).unwrap_err();
            assert!(matches!(err, CharacteristicError::InvalidValue(_)));
            assert_eq!(c.value(), Value::Float(25.0));
        }

        #[test]
        fn write_outside_valid_values_is_invalid() {
            let c = heating_cooling_state();
            c.write(&Value::UInt8(2), |_| {}).unwrap();
            for bad in [4u8, 7, 255] {
                let err = c.write(&Value::UInt8(bad), |_| {}).unwrap_err();
                assert!(matches!(err, CharacteristicError::InvalidValue(_)));
                assert_eq!(c.value(), Value::UInt8(2));
            }
        }

        #[test]
        fn write_wrong_format_is_invalid() {
            let c = target_temperature();
            let err = c.write(&Value::from("warm"), |_| {}).unwrap_err();
            assert!(matches!(err, CharacteristicError::InvalidValue(_)));
        }

        #[test]
        fn write_to_read_only_is_not_authorized() {
            let c = Characteristic::new(
                9,
                HapType::apple(0x11),
                "CurrentTemperature",
                Properties::new(Format::Float, Permissions::read_notify()),
            );
            let err = c.write(&Value::Float(20.0), |_| {}).unwrap_err();
            assert_eq!(err, CharacteristicError::NotAuthorized(Access::Write));
        }

        #[test]
        fn string_longer_than_max_len_is_invalid() {
            let c = Characteristic::new(
                3,
                HapType::apple(0x23),
                "Name",
                Properties::new(Format::String, Permissions::new(Permissions::PAIRED_READ | Permissions::PAIRED_WRITE)),
            );
            let long = "x".repeat(DEFAULT_MAX_LEN + 1);
            assert!(c.write(&Value::String(long), |_| {}).is_err());
        }

        #[test]
        fn on_commit_runs_only_when_changed() {
            let c = target_temperature();
            let calls = AtomicUsize::new(0);
            c.write(&Value::Float(25.0), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
            let outcome = c
                .write(&Value::Float(25.0), |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            assert!(!outcome.changed);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    mod callbacks {
        use super::*;

        #[test]
        fn setter_sees_validated_value() {
            let c = target_temperature();
            let seen = Arc::new(Mutex::new(None));
            let seen_clone = seen.clone();
            c.set_setter(Arc::new(move |v| {
                *seen_clone.lock().unwrap() = Some(v.clone());
                Ok(())
            }));
            c.write(&Value::Int(22), |_| {}).unwrap();
            assert_eq!(*seen.lock().unwrap(), Some(Value::Float(22.0)));
        }

        #[test]
        fn rejecting_setter_keeps_old_value() {
            let c = target_temperature();
            c.set_setter(Arc::new(|_| Err(SetterError::Rejected("locked".into()))));
            let err = c.write(&Value::Float(30.0), |_| {}).unwrap_err();
            assert!(matches!(err, CharacteristicError::Rejected(_)));
            assert_eq!(c.value(), Value::Float(10.0));
        }

        #[test]
        fn failing_setter_is_advisory() {
            let c = target_temperature();
            c.set_setter(Arc::new(|_| Err(SetterError::Failed("hvac offline".into()))));
            c.write(&Value::Float(30.0), |_| {}).unwrap();
            assert_eq!(c.value(), Value::Float(30.0));
        }

        #[test]
        fn setter_not_called_for_invalid_value() {
            let c = target_temperature();
            let calls = Arc::new(AtomicUsize::new(0));
            let calls_clone = calls.clone();
            c.set_setter(Arc::new(move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
            let _ = c.write(&Value::Float(999.0), |_| {});
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        }

        #[test]
        fn getter_refreshes_cached_value() {
            let c = target_temperature();
            c.set_getter(Arc::new(|| Some(Value::Float(21.5))));
            assert_eq!(c.read().unwrap(), Value::Float(21.5));
            assert_eq!(c.value(), Value::Float(21.5));
        }

        #[test]
        fn invalid_getter_value_falls_back_to_cache() {
            let c = target_temperature();
            c.set_getter(Arc::new(|| Some(Value::Float(500.0))));
            assert_eq!(c.read().unwrap(), Value::Float(10.0));
        }
    }

    mod local_updates {
        use super::*;

        #[test]
        fn set_value_bypasses_write_permission() {
            let c = Characteristic::new(
                9,
                HapType::apple(0x11),
                "CurrentTemperature",
                Properties::new(Format::Float, Permissions::read_notify()),
            );
            c.set_value(&Value::Int(23), |_| {}).unwrap();
            assert_eq!(c.value(), Value::Float(23.0));
        }

        #[test]
        fn set_value_still_validates() {
            let c = target_temperature();
            assert!(c.set_value(&Value::Float(-5.0), |_| {}).is_err());
        }

        #[test]
        fn non_finite_floats_are_rejected() {
            let c = target_temperature();
            c.set_value(&Value::Float(25.0), |_| {}).unwrap();
            let commits = AtomicUsize::new(0);
            for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
                let err = c
                    .set_value(&Value::Float(bad), |_| {
                        commits.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap_err();
                assert!(matches!(err, CharacteristicError::InvalidValue(_)));
            }
            assert_eq!(commits.load(Ordering::SeqCst), 0);
            assert_eq!(c.value(), Value::Float(25.0));
        }

        #[test]
        fn unbounded_float_rejects_infinity() {
            let c = Characteristic::new(
                9,
                HapType::apple(0x11),
                "CurrentTemperature",
                Properties::new(Format::Float, Permissions::read_notify()),
            );
            assert!(c.set_value(&Value::Float(f64::INFINITY), |_| {}).is_err());
            assert!(c.set_value(&Value::Float(f64::NAN), |_| {}).is_err());
            assert_eq!(c.value().to_json().as_f64(), Some(0.0));
        }

        #[test]
        fn non_finite_getter_value_falls_back_to_cache() {
            let c = target_temperature();
            c.set_getter(Arc::new(|| Some(Value::Float(f64::NAN))));
            assert_eq!(c.read().unwrap(), Value::Float(10.0));
        }
    }

    mod concurrency {
        use super::*;
        use std::thread;

        #[test]
        fn concurrent_writers_leave_one_attempted_value() {
            let c = Arc::new(target_temperature());
            let attempted: Vec<f64> = (0..16).map(|i| 15.0 + i as f64).collect();

            let handles: Vec<_> = attempted
                .iter()
                .map(|&t| {
                    let c = c.clone();
                    thread::spawn(move || {
                        for _ in 0..50 {
                            c.write(&Value::Float(t), |_| {}).unwrap();
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            match c.value() {
                Value::Float(v) => assert!(attempted.contains(&v)),
                other => panic!("unexpected value {:?}", other),
            }
        }

        #[test]
        fn commit_hook_order_matches_commit_order() {
            let c = Arc::new(target_temperature());
            let log = Arc::new(Mutex::new(Vec::new()));

            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let c = c.clone();
                    let log = log.clone();
                    thread::spawn(move || {
                        let v = Value::Float(11.0 + i as f64);
                        c.write(&v, |committed| log.lock().unwrap().push(committed.clone()))
                            .unwrap();
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            let log = log.lock().unwrap();
            assert_eq!(log.last().cloned(), Some(c.value()));
        }
    }
}
