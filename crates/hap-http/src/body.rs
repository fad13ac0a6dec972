//! HAP JSON request bodies and query strings.

use hap_core::error::HttpError;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value as Json;

/// `PUT /characteristics` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub characteristics: Vec<WriteItem>,
    /// Prepare id of a preceding `PUT /prepare`, for timed writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u64>,
}

/// One entry of a write request: a value write, a subscription change, or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteItem {
    pub aid: u64,
    pub iid: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Json>,
    #[serde(default, deserialize_with = "flag", skip_serializing_if = "Option::is_none")]
    pub ev: Option<bool>,
    #[serde(default, rename = "authData", skip_serializing_if = "Option::is_none")]
    pub auth_data: Option<String>,
    #[serde(default, deserialize_with = "flag", skip_serializing_if = "Option::is_none")]
    pub remote: Option<bool>,
    /// Write response requested.
    #[serde(default, deserialize_with = "flag", skip_serializing_if = "Option::is_none")]
    pub r: Option<bool>,
}

impl WriteItem {
    pub fn value(aid: u64, iid: u64, value: Json) -> Self {
        Self {
            aid,
            iid,
            value: Some(value),
            ev: None,
            auth_data: None,
            remote: None,
            r: None,
        }
    }

    pub fn subscribe(aid: u64, iid: u64, enable: bool) -> Self {
        Self {
            aid,
            iid,
            value: None,
            ev: Some(enable),
            auth_data: None,
            remote: None,
            r: None,
        }
    }
}

/// `PUT /prepare` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareRequest {
    /// Milliseconds the prepared write stays valid.
    pub ttl: u64,
    pub pid: u64,
}

/// Controllers send booleans as `true`/`false` or `1`/`0`.
fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Json>::deserialize(deserializer)? {
        None | Some(Json::Null) => Ok(None),
        Some(Json::Bool(b)) => Ok(Some(b)),
        Some(Json::Number(n)) => match n.as_u64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(de::Error::custom(format!("expected boolean, got {}", n))),
        },
        Some(other) => Err(de::Error::custom(format!("expected boolean, got {}", other))),
    }
}

/// Decode a JSON body.
pub fn decode<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, HttpError> {
    serde_json::from_slice(body).map_err(|e| HttpError::InvalidJson(e.to_string()))
}

/// `GET /characteristics` query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadQuery {
    pub ids: Vec<(u64, u64)>,
    pub meta: bool,
    pub perms: bool,
    pub hap_type: bool,
    pub ev: bool,
}

impl ReadQuery {
    /// Parse `id=1.10,1.11&meta=1&perms=1&type=1&ev=1`.
    pub fn parse(pairs: &[(String, String)]) -> Result<Self, HttpError> {
        let mut query = ReadQuery::default();
        let mut saw_id = false;
        for (key, value) in pairs {
            match key.as_str() {
                "id" => {
                    saw_id = true;
                    for item in value.split(',').filter(|s| !s.is_empty()) {
                        query.ids.push(parse_id(item)?);
                    }
                }
                "meta" => query.meta = truthy(value),
                "perms" => query.perms = truthy(value),
                "type" => query.hap_type = truthy(value),
                "ev" => query.ev = truthy(value),
                _ => {}
            }
        }
        if !saw_id || query.ids.is_empty() {
            return Err(HttpError::MalformedRequest("missing id parameter".into()));
        }
        Ok(query)
    }
}

fn parse_id(item: &str) -> Result<(u64, u64), HttpError> {
    let bad = || HttpError::MalformedRequest(format!("bad characteristic id: {}", item));
    let (aid, iid) = item.split_once('.').ok_or_else(bad)?;
    Ok((
        aid.trim().parse().map_err(|_| bad())?,
        iid.trim().parse().map_err(|_| bad())?,
    ))
}

fn truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
