//! Client configuration model.
//!
//! Grounded on `original_source/linear_stage/api/python/config.py`'s
//! `APIConfig` (`RESTfulConfig`, `WebsocketConfig`, `AuthConfig`) and its
//! `load_config_from_file`/`dump_config_to_file` pair, translated from
//! Pydantic into plain `serde` structs and loaded through
//! `labctrl_server::persistence`-style atomic JSON I/O (kept local here
//! since the client crate has no dependency on the server binary).

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Where the REST half of the server lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestfulConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_rest_endpoint")]
    pub endpoint: String,
}

fn default_rest_endpoint() -> String {
    "/".to_string()
}

impl RestfulConfig {
    pub fn base_url(&self) -> String {
        format!(
            "{}{}:{}{}",
            self.protocol, self.host, self.port, self.endpoint
        )
    }
}

/// Where the persistent channel half of the server lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsocketConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub device: String,
}

impl WebsocketConfig {
    pub fn url(&self) -> String {
        format!(
            "{}{}:{}/ws?device={}",
            self.protocol, self.host, self.port, self.device
        )
    }
}

/// Credentials plus the cached bearer token, mirroring `AuthConfig` in
/// `config.py` (including `access_token`/`token_type` persisting across
/// runs so a client doesn't have to reauthenticate on every launch).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub restful: RestfulConfig,
    pub websocket: WebsocketConfig,
    pub authentication: AuthConfig,
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self).expect("ClientConfig always serializes");
        std::fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClientConfig {
        ClientConfig {
            restful: RestfulConfig {
                protocol: "http://".into(),
                host: "127.0.0.1".into(),
                port: 8000,
                endpoint: "/".into(),
            },
            websocket: WebsocketConfig {
                protocol: "ws://".into(),
                host: "127.0.0.1".into(),
                port: 8000,
                device: "stage".into(),
            },
            authentication: AuthConfig {
                username: "admin".into(),
                password: "changeme".into(),
                access_token: "".into(),
                token_type: "bearer".into(),
            },
        }
    }

    #[test]
    fn rest_base_url_composes_from_parts() {
        assert_eq!(sample().restful.base_url(), "http://127.0.0.1:8000/");
    }

    #[test]
    fn websocket_url_includes_device_path() {
        assert_eq!(
            sample().websocket.url(),
            "ws://127.0.0.1:8000/ws?device=stage"
        );
    }

    #[test]
    fn round_trips_through_json() {
        let dir = std::env::temp_dir().join("labctrl_client_config_test.json");
        sample().save(&dir).unwrap();
        let loaded = ClientConfig::load(&dir).unwrap();
        assert_eq!(loaded.authentication.username, "admin");
        std::fs::remove_file(&dir).ok();
    }
}
