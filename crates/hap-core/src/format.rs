//! Characteristic value formats, units and typed values.

use crate::error::CharacteristicError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Declared format of a characteristic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int,
    Float,
    String,
    Tlv8,
    Data,
}

/// Unit attached to numeric characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Celsius,
    Percentage,
    Arcdegrees,
    Lux,
    Seconds,
}

/// A typed characteristic value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Int(i32),
    Float(f64),
    String(String),
    Tlv8(Vec<u8>),
    Data(Vec<u8>),
}

impl Format {
    pub fn is_numeric(self) -> bool {
        !matches!(
            self,
            Format::Bool | Format::String | Format::Tlv8 | Format::Data
        )
    }

    pub fn is_integer(self) -> bool {
        self.is_numeric() && self != Format::Float
    }

    /// Value a freshly created characteristic holds before configuration.
    pub fn default_value(self) -> Value {
        match self {
            Format::Bool => Value::Bool(false),
            Format::Uint8 => Value::UInt8(0),
            Format::Uint16 => Value::UInt16(0),
            Format::Uint32 => Value::UInt32(0),
            Format::Uint64 => Value::UInt64(0),
            Format::Int => Value::Int(0),
            Format::Float => Value::Float(0.0),
            Format::String => Value::String(String::new()),
            Format::Tlv8 => Value::Tlv8(Vec::new()),
            Format::Data => Value::Data(Vec::new()),
        }
    }

    /// Decode a JSON value from a controller request into this format.
    ///
    /// Only checks the value against the format itself; range and
    /// valid-value constraints are applied by the characteristic.
    pub fn decode(self, json: &Json) -> Result<Value, CharacteristicError> {
        let mismatch = || {
            CharacteristicError::InvalidValue(format!("{} is not a valid {:?} value", json, self))
        };

        match self {
            Format::Bool => match json {
                Json::Bool(b) => Ok(Value::Bool(*b)),
                Json::Number(n) => match n.as_u64() {
                    Some(0) => Ok(Value::Bool(false)),
                    Some(1) => Ok(Value::Bool(true)),
                    _ => Err(mismatch()),
                },
                _ => Err(mismatch()),
            },
            Format::Uint8 => integral(json)
                .and_then(|i| u8::try_from(i).ok())
                .map(Value::UInt8)
                .ok_or_else(mismatch),
            Format::Uint16 => integral(json)
                .and_then(|i| u16::try_from(i).ok())
                .map(Value::UInt16)
                .ok_or_else(mismatch),
            Format::Uint32 => integral(json)
                .and_then(|i| u32::try_from(i).ok())
                .map(Value::UInt32)
                .ok_or_else(mismatch),
            Format::Uint64 => integral(json)
                .and_then(|i| u64::try_from(i).ok())
                .map(Value::UInt64)
                .ok_or_else(mismatch),
            Format::Int => integral(json)
                .and_then(|i| i32::try_from(i).ok())
                .map(Value::Int)
                .ok_or_else(mismatch),
            Format::Float => json
                .as_f64()
                .filter(|f| f.is_finite())
                .map(Value::Float)
                .ok_or_else(mismatch),
            Format::String => json
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(mismatch),
            Format::Tlv8 | Format::Data => {
                let encoded = json.as_str().ok_or_else(mismatch)?;
                let bytes = STANDARD.decode(encoded).map_err(|_| mismatch())?;
                Ok(if self == Format::Tlv8 {
                    Value::Tlv8(bytes)
                } else {
                    Value::Data(bytes)
                })
            }
        }
    }

    /// Convert a locally supplied value into this format.
    ///
    /// Lets callers pass `Value::Int(1)` for a `uint8` characteristic.
    pub fn coerce(self, value: &Value) -> Result<Value, CharacteristicError> {
        if value.format() == self {
            return Ok(value.clone());
        }
        self.decode(&value.to_json())
    }
}

/// JSON number as i128 when it carries no fractional part.
fn integral(json: &Json) -> Option<i128> {
    let n = match json {
        Json::Number(n) => n,
        _ => return None,
    };
    if let Some(u) = n.as_u64() {
        return Some(u as i128);
    }
    if let Some(i) = n.as_i64() {
        return Some(i as i128);
    }
    let f = n.as_f64()?;
    if f.fract() == 0.0 && f.abs() < 1.8e19 {
        Some(f as i128)
    } else {
        None
    }
}

impl Value {
    pub fn format(&self) -> Format {
        match self {
            Value::Bool(_) => Format::Bool,
            Value::UInt8(_) => Format::Uint8,
            Value::UInt16(_) => Format::Uint16,
            Value::UInt32(_) => Format::Uint32,
            Value::UInt64(_) => Format::Uint64,
            Value::Int(_) => Format::Int,
            Value::Float(_) => Format::Float,
            Value::String(_) => Format::String,
            Value::Tlv8(_) => Format::Tlv8,
            Value::Data(_) => Format::Data,
        }
    }

    /// Numeric view used for range checks.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::UInt8(v) => Some(*v as f64),
            Value::UInt16(v) => Some(*v as f64),
            Value::UInt32(v) => Some(*v as f64),
            Value::UInt64(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// JSON representation used in read responses and events.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Bool(b) => Json::Bool(*b),
            Value::UInt8(v) => Json::from(*v),
            Value::UInt16(v) => Json::from(*v),
            Value::UInt32(v) => Json::from(*v),
            Value::UInt64(v) => Json::from(*v),
            Value::Int(v) => Json::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Tlv8(bytes) | Value::Data(bytes) => Json::String(STANDARD.encode(bytes)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::UInt8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::UInt16(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
