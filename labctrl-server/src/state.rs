//! The shared, in-memory state store.
//!
//! Grounded on a common `Arc<RwLock<_>>`-guarded state-struct shape: one
//! struct per device, a name-keyed map of devices, mutation always through
//! a guard obtained from the shared lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use labctrl_core::ParameterSpec;

/// A device session's state machine.
///
/// `Closed -> Opening -> Idle` on connect; `Idle <-> Commanding` around each
/// command; `Idle <-> Streaming` around continuous sampling. Any transport
/// error collapses the session back to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Closed,
    Opening,
    Idle,
    Commanding,
    Streaming,
}

/// One device's live state: its session phase and the current value of
/// every parameter it exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceState {
    pub name: String,
    pub session: SessionState,
    pub parameters: HashMap<String, ParameterSpec>,
}

impl DeviceState {
    pub fn new(name: impl Into<String>, parameters: HashMap<String, ParameterSpec>) -> Self {
        Self {
            name: name.into(),
            session: SessionState::Closed,
            parameters,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.get(name)
    }

    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut ParameterSpec> {
        self.parameters.get_mut(name)
    }
}

/// Every device this server manages, keyed by device name. Shared behind
/// one `RwLock` per device rather than one lock for the whole map, so a
/// slow command on `stage` never blocks a read of `sensor`'s state.
#[derive(Debug, Default)]
pub struct StateStore {
    devices: HashMap<String, Arc<RwLock<DeviceState>>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, device: DeviceState) {
        self.devices
            .insert(device.name.clone(), Arc::new(RwLock::new(device)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<RwLock<DeviceState>>> {
        self.devices.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctrl_core::{PhysicalQuantity, Unit};
    use std::collections::HashMap;

    fn sample_parameters() -> HashMap<String, ParameterSpec> {
        let mut params = HashMap::new();
        params.insert(
            "position".to_string(),
            ParameterSpec::new(PhysicalQuantity::new(10.0, Unit::Micrometer), 0, 0, -100, 100)
                .unwrap(),
        );
        params
    }

    #[tokio::test]
    async fn store_isolates_locks_per_device() {
        let mut store = StateStore::new();
        store.insert(DeviceState::new("stage", sample_parameters()));
        store.insert(DeviceState::new("sensor", HashMap::new()));

        let stage = store.get("stage").unwrap();
        let mut guard = stage.write().await;
        guard.session = SessionState::Idle;
        drop(guard);

        let sensor = store.get("sensor").unwrap();
        assert_eq!(sensor.read().await.session, SessionState::Closed);
        assert!(store.get("shutter").is_none());
    }
}
