//! Local parameter cache with dirty-tracking.
//!
//! Grounded on `api.py`'s `self.position`/`self.parameter` fields, kept
//! current two ways: polled every 5 s by the state watchdog
//! (`__stage_state_watchdog_task`) and opportunistically patched by
//! `handle_websocket_message` whenever a broadcast mentions a value the
//! client didn't ask for. Dirty-tracking records which entries came from a
//! broadcast since the last watchdog poll, so a caller can tell "this
//! value changed because another client moved the stage" from "this is
//! still whatever the last poll saw".

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    values: HashMap<String, i64>,
    dirty: HashSet<String>,
}

/// Cheaply `Clone`able handle shared between the watchdogs and the
/// persistent-channel reader.
#[derive(Clone, Default)]
pub struct ParameterCache {
    inner: Arc<RwLock<Inner>>,
}

impl ParameterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the channel reader when a broadcast updates a value this
    /// client didn't request itself.
    pub async fn set(&self, name: &str, value: i64) {
        let mut inner = self.inner.write().await;
        inner.values.insert(name.to_string(), value);
        inner.dirty.insert(name.to_string());
    }

    /// Called by the state watchdog after a REST poll, which is always
    /// authoritative and clears any pending dirty flag for the name.
    pub async fn set_from_poll(&self, name: &str, value: i64) {
        let mut inner = self.inner.write().await;
        inner.values.insert(name.to_string(), value);
        inner.dirty.remove(name);
    }

    pub async fn get(&self, name: &str) -> Option<i64> {
        self.inner.read().await.values.get(name).copied()
    }

    pub async fn is_dirty(&self, name: &str) -> bool {
        self.inner.read().await.dirty.contains(name)
    }

    pub async fn snapshot(&self) -> HashMap<String, i64> {
        self.inner.read().await.values.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_update_marks_dirty_until_next_poll() {
        let cache = ParameterCache::new();
        cache.set("position", 42).await;
        assert_eq!(cache.get("position").await, Some(42));
        assert!(cache.is_dirty("position").await);

        cache.set_from_poll("position", 42).await;
        assert!(!cache.is_dirty("position").await);
    }

    #[tokio::test]
    async fn unset_parameter_reads_as_none() {
        let cache = ParameterCache::new();
        assert_eq!(cache.get("velocity").await, None);
    }
}
