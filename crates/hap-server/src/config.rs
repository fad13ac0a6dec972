//! Server configuration.

use hap_core::error::ParseError;
use hap_core::Category;
use hap_pairing::SetupCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

/// Conventional HAP port.
pub const DEFAULT_PORT: u16 = 51826;

/// Everything needed to start an accessory server.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Advertised name; the accessory graph's name when empty.
    pub name: String,
    /// `XXX-XX-XXX`.
    pub setup_code: String,
    /// Four-character setup id; enables the `sh` TXT field.
    pub setup_id: Option<String>,
    pub bind_address: IpAddr,
    /// 0 picks a free port.
    pub port: u16,
    /// Advertised category; derived from the accessory graph when unset.
    pub category: Option<Category>,
    pub model: String,
    /// Pairing store file. Pairings are kept in memory only when unset.
    pub state_path: Option<PathBuf>,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, setup_code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup_code: setup_code.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON configuration file's contents.
    pub fn from_json(json: &str) -> Result<Self, ParseError> {
        serde_json::from_str(json).map_err(|e| ParseError::InvalidFormat(e.to_string()))
    }

    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ParseError::InvalidValue(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub(crate) fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.name.is_empty() {
            fallback
        } else {
            &self.name
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            setup_code: SetupCode::random().expose().to_string(),
            setup_id: None,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            category: None,
            model: "HAP-Accessory".to_string(),
            state_path: None,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("name", &self.name)
            .field("setup_code", &"***-**-***")
            .field("setup_id", &self.setup_id)
            .field("bind_address", &self.bind_address)
            .field("port", &self.port)
            .field("category", &self.category)
            .field("model", &self.model)
            .field("state_path", &self.state_path)
            .finish()
    }
}
