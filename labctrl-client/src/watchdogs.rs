//! Background watchdogs: reauthentication and parameter-state polling.
//!
//! Grounded on `api.py`'s `__authentication_watchdog_task` and
//! `__stage_state_watchdog_task`: plain polling loops over a
//! `*_running` flag, replaced here by a spawned `tokio` task over an
//! `AtomicBool`, stopped and joined the same way `close_watchdogs` joins
//! its threads. The channel watchdog from the same section is
//! `ws_client::ChannelClient`'s own reconnect loop — its auto-reconnect
//! behavior already satisfies "on close, reconnect after a short delay".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cache::ParameterCache;
use crate::rest::RestClient;

const AUTH_POLL_INTERVAL: Duration = Duration::from_secs(1);
const STATE_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Reauthenticate once less than this much time remains before expiry,
/// mirroring `check_reauthentication_required`'s 30-second margin.
const REAUTH_MARGIN: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct ExpOnly {
    exp: u64,
}

/// A single named background loop that can be stopped and joined.
pub struct Watchdog {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Signals the loop to stop and waits for it to exit, mirroring
    /// `close_watchdogs`'s `running = False` followed by `thread.join()`.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// Decodes `exp` out of a JWT without verifying its signature, the same
/// local-only check `check_reauthentication_required` performs so it never
/// has to round-trip to the server just to learn a token's age.
fn needs_reauthentication(token: &str) -> bool {
    if token.is_empty() {
        return true;
    }
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    let Ok(data) = decode::<ExpOnly>(token, &DecodingKey::from_secret(&[]), &validation) else {
        return true;
    };
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let remaining = data.claims.exp.saturating_sub(now);
    remaining < REAUTH_MARGIN.as_secs()
}

/// Starts the auth watchdog. `token` is the shared cell also read by
/// `ws_client::ChannelClient` on each reconnect attempt.
pub fn spawn_auth_watchdog(
    rest: RestClient,
    username: String,
    password: String,
    token: Arc<RwLock<String>>,
) -> Watchdog {
    let running = Arc::new(AtomicBool::new(true));
    let task_running = running.clone();
    let handle = tokio::spawn(async move {
        while task_running.load(Ordering::SeqCst) {
            let current = token.read().await.clone();
            if needs_reauthentication(&current) {
                match rest.issue_token(&username, &password).await {
                    Ok(new_token) => {
                        info!("reauthenticated, token refreshed");
                        *token.write().await = new_token;
                    }
                    Err(err) => error!(%err, "reauthentication failed"),
                }
            }
            tokio::time::sleep(AUTH_POLL_INTERVAL).await;
        }
    });
    Watchdog {
        running,
        handle: Some(handle),
    }
}

/// Starts the state watchdog: polls the stage and sensor REST status
/// endpoints every `STATE_POLL_INTERVAL` and folds the results into
/// `cache`, mirroring `__stage_state_watchdog_task`'s unconditional poll.
pub fn spawn_state_watchdog(
    rest: RestClient,
    token: Arc<RwLock<String>>,
    cache: ParameterCache,
    device: String,
    parameter_name: String,
) -> Watchdog {
    let running = Arc::new(AtomicBool::new(true));
    let task_running = running.clone();
    let handle = tokio::spawn(async move {
        while task_running.load(Ordering::SeqCst) {
            let current_token = token.read().await.clone();
            let status = match device.as_str() {
                "stage" => rest.stage_status(&current_token).await,
                "sensor" => rest.sensor_status(&current_token).await,
                other => {
                    warn!(device = other, "state watchdog configured for unknown device");
                    tokio::time::sleep(STATE_POLL_INTERVAL).await;
                    continue;
                }
            };
            match status {
                Ok(response) => {
                    if let Some(value) = response.value {
                        cache.set_from_poll(&parameter_name, value).await;
                    }
                }
                Err(err) => warn!(%err, device = %device, "state poll failed"),
            }
            tokio::time::sleep(STATE_POLL_INTERVAL).await;
        }
    });
    Watchdog {
        running,
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_always_needs_reauthentication() {
        assert!(needs_reauthentication(""));
    }

    #[test]
    fn malformed_token_needs_reauthentication() {
        assert!(needs_reauthentication("not-a-jwt"));
    }
}
