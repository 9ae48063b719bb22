//! The per-instrument session: shared parameter state, a mutex-guarded
//! transport, and the update bus it publishes to.
//!
//! Grounded on `original_source/linear_stage/generic/linear_stage.py`'s
//! `stage_operation` — which always runs the same five steps regardless of
//! which parameter is being set (soft-limit check, no-op short-circuit,
//! device write, state update, `update_hook.handle_update`) — generalized
//! here into `DeviceSession::apply_target`, shared by `stage` and `sensor`
//! instead of being re-implemented per parameter. The command mutex mirrors
//! the single `threading.Lock` the Python session holds around every
//! device write, serializing commands issued concurrently by different
//! clients against the same instrument.

pub mod sensor;
pub mod stage;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use labctrl_core::{to_logical, to_physical, CommandResponse, OperationResult, Target, UpdateEvent};

use crate::state::{DeviceState, SessionState};
use crate::transport::{Transport, TransportError};
use crate::update_bus::UpdateBus;

#[derive(Debug, thiserror::Error)]
pub enum DeviceSessionError {
    #[error("unknown parameter {0:?}")]
    UnknownParameter(String),
    #[error("unit conversion failed: {0}")]
    Unit(#[from] labctrl_core::UnitError),
    #[error("invalid target: {0}")]
    Target(#[from] labctrl_core::TargetError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("device reported an error: {0}")]
    Device(String),
}

impl From<&DeviceSessionError> for OperationResult {
    fn from(err: &DeviceSessionError) -> Self {
        match err {
            DeviceSessionError::UnknownParameter(_) => OperationResult::InvalidAction,
            DeviceSessionError::Unit(_) => OperationResult::InvalidAction,
            DeviceSessionError::Target(_) => OperationResult::InvalidAction,
            DeviceSessionError::Transport(_) => OperationResult::TransportRw,
            DeviceSessionError::Device(_) => OperationResult::DeviceError,
        }
    }
}

/// A live connection to one instrument: its shared state handle, its
/// transport under a command mutex, and the bus it publishes updates to.
pub struct DeviceSession<T: Transport> {
    pub name: String,
    pub state: Arc<RwLock<DeviceState>>,
    transport: Mutex<T>,
    bus: UpdateBus,
    next_command_id: AtomicU64,
    command_timeout: Duration,
}

impl<T: Transport> DeviceSession<T> {
    pub fn new(
        name: impl Into<String>,
        state: Arc<RwLock<DeviceState>>,
        transport: T,
        bus: UpdateBus,
        command_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            state,
            transport: Mutex::new(transport),
            bus,
            next_command_id: AtomicU64::new(1),
            command_timeout,
        }
    }

    pub fn next_command_id(&self) -> u64 {
        self.next_command_id.fetch_add(1, Ordering::Relaxed)
    }

    /// How long a single `recv` on this device's transport may block before
    /// a command is treated as failed, sourced from the hardware config's
    /// `SerialConfig::timeout_ms`.
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Lock the transport for exclusive use by the caller, serializing it
    /// against every other command on this device.
    pub async fn lock_transport(&self) -> tokio::sync::MutexGuard<'_, T> {
        self.transport.lock().await
    }

    /// The five-step mutation protocol shared by every settable parameter:
    /// resolve the target to a logical value, soft-limit check, short
    /// circuit on no-op, write to the device, update shared state, publish
    /// a `ParameterChanged` event. `encode` builds the outbound command
    /// from the resolved logical value; `decode_ack` validates the
    /// device's reply.
    pub async fn apply_target(
        &self,
        param_name: &str,
        target: Target,
        encode: impl Fn(i64) -> Vec<u8>,
        decode_ack: impl Fn(&[u8]) -> Result<(), DeviceSessionError>,
    ) -> Result<CommandResponse, DeviceSessionError> {
        let logical = {
            let state = self.state.read().await;
            let spec = state
                .parameter(param_name)
                .ok_or_else(|| DeviceSessionError::UnknownParameter(param_name.to_string()))?;
            match target {
                Target::Logical(v) => v,
                Target::Physical(q) => to_logical(q, spec)?,
            }
        };

        let (within_limits, current) = {
            let state = self.state.read().await;
            let spec = state
                .parameter(param_name)
                .ok_or_else(|| DeviceSessionError::UnknownParameter(param_name.to_string()))?;
            (spec.within_limits(logical), spec.value)
        };

        if !within_limits {
            warn!(device = %self.name, parameter = param_name, target = logical, "soft limit exceeded");
            return Ok(CommandResponse {
                result: OperationResult::SoftLimitExceeded,
                value: Some(current),
                message: None,
            });
        }

        let is_no_op = logical == current;
        if is_no_op {
            debug!(
                device = %self.name,
                parameter = param_name,
                "target equals current value, still issuing the device command"
            );
        }

        {
            let mut guard = self.transport.lock().await;
            let payload = encode(logical);
            guard.send(&payload).await?;
            let reply = guard.recv(self.command_timeout).await?;
            decode_ack(&reply)?;
        }

        if is_no_op {
            return Ok(CommandResponse::warn_no_action(current));
        }

        {
            let mut state = self.state.write().await;
            if let Some(spec) = state.parameter_mut(param_name) {
                spec.value = logical;
            }
        }

        self.bus.publish(UpdateEvent::ParameterChanged {
            name: param_name.to_string(),
            value: logical,
        });

        Ok(CommandResponse::ok(logical))
    }

    pub async fn session_state(&self) -> SessionState {
        self.state.read().await.session
    }

    pub async fn set_session_state(&self, new_state: SessionState) {
        self.state.write().await.session = new_state;
    }

    pub fn publish(&self, event: UpdateEvent) {
        self.bus.publish(event);
    }

    pub async fn physical_value(
        &self,
        param_name: &str,
        unit: labctrl_core::Unit,
    ) -> Result<labctrl_core::PhysicalQuantity, DeviceSessionError> {
        let state = self.state.read().await;
        let spec = state
            .parameter(param_name)
            .ok_or_else(|| DeviceSessionError::UnknownParameter(param_name.to_string()))?;
        Ok(to_physical(spec.value, spec, unit)?)
    }
}
