//! Hardware and server configuration models.
//!
//! Grounded on `original_source/linear_stage/generic/hardware_config.py`
//! (`SerialConfig`, `StageSoftLimit`, `Stage*Parameter`, `HardwareConfig`)
//! and `server_config.py` (`UserAccessLevel`, `UserConfig`, `JWTConfig`,
//! `AuthConfig`, `CORSConfig`, `ApplicationConfig`), translated from
//! Pydantic models into plain `serde` structs loaded/dumped through
//! `persistence::{load_json, save_json}`.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use labctrl_core::ParameterSpec;

use crate::persistence::{load_or_default, save_json, PersistenceError};

/// Serial line settings for a line-framed or COBS-framed transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    1000
}

/// One device's transport and parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceHardwareConfig {
    pub serial: SerialConfig,
    pub parameters: HashMap<String, ParameterSpec>,
}

/// Every device the server manages, keyed by device name
/// (e.g. `"stage"`, `"sensor"`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareConfig {
    pub devices: HashMap<String, DeviceHardwareConfig>,
}

impl HardwareConfig {
    pub fn load_or_default(path: &Path) -> Self {
        load_or_default(path, Self::default)
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        save_json(path, self)
    }
}

/// Mirrors `server_config.py::UserAccessLevel(int, Enum)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Readonly = 1,
    Standard = 2,
    Advanced = 3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password_hash: String,
    pub access_level: AccessLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default = "default_expiry_seconds")]
    pub expiry_seconds: u64,
}

fn default_expiry_seconds() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub users: Vec<UserConfig>,
    pub jwt: JwtConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8000
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        crate::persistence::load_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        save_json(path, self)
    }

    pub fn find_user(&self, username: &str) -> Option<&UserConfig> {
        self.auth.users.iter().find(|u| u.username == username)
    }
}
