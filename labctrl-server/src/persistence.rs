//! JSON file persistence for hardware and server configuration.
//!
//! A pair of generic load/save helpers reused by both config files
//! (`config.rs`), hardened with an atomic write: a config file a future
//! restart reads must never be observed half-written, so `save_json` writes
//! to a sibling temp file and `rename`s it into place rather than
//! truncating the target in place.

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
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

/// Load and parse a JSON file. Callers fall back to a default when the file
/// is missing; a present-but-corrupt file is still a hard error rather than
/// a silent fallback, since a corrupt hardware config masking itself as
/// defaults could move a stage with the wrong soft limits.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    let path_str = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| PersistenceError::Read {
        path: path_str.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| PersistenceError::Parse {
        path: path_str,
        source,
    })
}

/// Write `value` to `path` atomically: serialize to a temp file in the same
/// directory, then `rename` over the target.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let path_str = path.display().to_string();
    let pretty = serde_json::to_string_pretty(value).map_err(|source| PersistenceError::Parse {
        path: path_str.clone(),
        source,
    })?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, pretty).map_err(|source| PersistenceError::Write {
        path: path_str.clone(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| PersistenceError::Write {
        path: path_str,
        source,
    })?;
    info!(path = %path.display(), "wrote config");
    Ok(())
}

/// Load `path` if present, otherwise log and return `default`.
pub fn load_or_default<T: DeserializeOwned>(path: &Path, default: impl FnOnce() -> T) -> T {
    if !path.exists() {
        warn!(path = %path.display(), "no config file found, using defaults");
        return default();
    }
    match load_json(path) {
        Ok(value) => value,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to load config, using defaults");
            default()
        }
    }
}
