//! Local username/password authentication and bearer-token issuance.
//!
//! `AuthEngine` here has no third-party identity provider; it issues its
//! own tokens against the user list in `server_config.py`'s `AuthConfig`.
//! The shape is kept — an `Arc`-wrapped engine caching what `verify`/`issue`
//! need behind an `RwLock` — while the verification itself is grounded on
//! `original_source/linear_stage/api/python/api.py`'s
//! `check_reauthentication_required` (decode, read `exp`, compare to now)
//! and on `server_config.py`'s `UserAccessLevel` ordering for the
//! access-gating half.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::config::{AccessLevel, ServerConfig};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AuthError {
    #[error("unknown username or incorrect password")]
    InvalidCredentials,
    #[error("token is malformed, expired, or signed with an unknown key")]
    TokenInvalid,
    #[error("access level {required:?} required, token grants {granted:?}")]
    InsufficientAccess {
        required: AccessLevel,
        granted: AccessLevel,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub access_level: AccessLevel,
    pub exp: u64,
}

/// Owns the current server configuration and issues/validates bearer
/// tokens against it. Held behind an `Arc` and shared with every HTTP and
/// WS handler.
pub struct AuthEngine {
    config: RwLock<ServerConfig>,
}

impl AuthEngine {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config: RwLock::new(config),
        })
    }

    pub async fn replace_config(&self, config: ServerConfig) {
        *self.config.write().await = config;
    }

    pub async fn issue(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let config = self.config.read().await;
        let user = config
            .find_user(username)
            .ok_or(AuthError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&user.password_hash).map_err(|e| {
            warn!(username, error = %e, "stored password hash is not valid PHC text");
            AuthError::InvalidCredentials
        })?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let claims = Claims {
            sub: username.to_string(),
            access_level: user.access_level,
            exp: now + config.auth.jwt.expiry_seconds,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.auth.jwt.secret.as_bytes()),
        )
        .map_err(|e| {
            warn!(error = %e, "failed to sign token");
            AuthError::TokenInvalid
        })
    }

    pub async fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let config = self.config.read().await;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(config.auth.jwt.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            warn!(error = %e, "token validation failed");
            AuthError::TokenInvalid
        })?;
        Ok(data.claims)
    }

    pub fn require_at_least(claims: &Claims, required: AccessLevel) -> Result<(), AuthError> {
        if claims.access_level >= required {
            Ok(())
        } else {
            Err(AuthError::InsufficientAccess {
                required,
                granted: claims.access_level,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(level: AccessLevel, required: AccessLevel) -> bool {
        let claims = Claims {
            sub: "alice".into(),
            access_level: level,
            exp: 0,
        };
        AuthEngine::require_at_least(&claims, required).is_ok()
    }

    #[test]
    fn access_level_ordering_gates_correctly() {
        assert!(gate(AccessLevel::Advanced, AccessLevel::Readonly));
        assert!(gate(AccessLevel::Standard, AccessLevel::Standard));
        assert!(!gate(AccessLevel::Readonly, AccessLevel::Standard));
    }
}
