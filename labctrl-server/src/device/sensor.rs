//! Sensor command dispatch and continuous-sampling stream reader, grounded
//! on `original_source/sensor/generic/sensor.py`'s `SensorController`
//! (`get_data`, `get_temperature_batch`, `start_continuous_sampling_mode`,
//! `__continuous_sampling_mode_task`, `stop_continuous_sampling_mode`) and
//! `hardware_mocker.py`'s CBOR `{"command": ..., "args": {...}}` dialect.
//!
//! The Python original's stop path has a race: disabling the device and
//! cancelling the reader task happen in an order that can leave one last
//! burst frame misread as the ack to a later command. The fix adopted
//! here, recorded in DESIGN.md, is strict ordering: cancel the reader, send
//! the disable command, then drain any frames still sitting on the
//! transport before the transport is handed back to normal command
//! dispatch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use labctrl_core::{CommandResponse, OperationResult, SensorOperation, UpdateEvent};

use super::{DeviceSession, DeviceSessionError};
use crate::transport::{Transport, TransportError};

const VALUE: &str = "value";

#[derive(Serialize)]
struct CborRequest<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_size: Option<u32>,
}

#[derive(Deserialize)]
struct CborResponse {
    #[serde(default)]
    value: Option<i64>,
    #[serde(default)]
    values: Option<Vec<i64>>,
    #[serde(default)]
    seq: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

fn encode_request(command: &str, batch_size: Option<u32>) -> Result<Vec<u8>, DeviceSessionError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(&CborRequest { command, batch_size }, &mut buf)
        .map_err(|e| DeviceSessionError::Device(format!("CBOR encode failed: {e}")))?;
    Ok(buf)
}

fn decode_response(bytes: &[u8]) -> Result<CborResponse, DeviceSessionError> {
    ciborium::de::from_reader(bytes)
        .map_err(|e| DeviceSessionError::Device(format!("CBOR decode failed: {e}")))
}

/// Rejects a duplicated or out-of-order sequence number on the continuous
/// stream, grounded on `uwb_hub.rs::SeqTracker`: a repeat (`diff == 0`) or
/// an implausible jump (`diff > 1000`) is dropped rather than republished.
struct SeqTracker {
    last: Option<u32>,
}

impl SeqTracker {
    fn new() -> Self {
        Self { last: None }
    }

    fn accept(&mut self, seq: u32) -> bool {
        match self.last {
            None => {
                self.last = Some(seq);
                true
            }
            Some(last) => {
                let diff = seq.wrapping_sub(last);
                if diff == 0 || diff > 1000 {
                    false
                } else {
                    self.last = Some(seq);
                    true
                }
            }
        }
    }
}

struct StreamHandle {
    cancel: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Wraps a generic `DeviceSession` with the sensor-specific continuous
/// sampling lifecycle.
pub struct SensorSession<T: Transport> {
    pub inner: DeviceSession<T>,
    stream: Mutex<Option<StreamHandle>>,
}

impl<T: Transport + 'static> SensorSession<T> {
    pub fn new(inner: DeviceSession<T>) -> Self {
        Self {
            inner,
            stream: Mutex::new(None),
        }
    }

    pub async fn dispatch(
        self: &Arc<Self>,
        op: SensorOperation,
    ) -> Result<CommandResponse, DeviceSessionError> {
        match op {
            SensorOperation::GetSample => {
                let mut transport = self.inner.lock_transport().await;
                transport.send(&encode_request("get_sample", None)?).await?;
                let reply = transport.recv(self.inner.command_timeout()).await?;
                let parsed = decode_response(&reply)?;
                if let Some(err) = parsed.error {
                    return Err(DeviceSessionError::Device(err));
                }
                let value = parsed
                    .value
                    .ok_or_else(|| DeviceSessionError::Device("response missing value".into()))?;
                drop(transport);
                let mut state = self.inner.state.write().await;
                if let Some(spec) = state.parameter_mut(VALUE) {
                    spec.value = value;
                }
                Ok(CommandResponse::ok(value))
            }
            SensorOperation::GetDataBatch { batch_size } => {
                let mut transport = self.inner.lock_transport().await;
                transport
                    .send(&encode_request("get_data_batch", Some(batch_size))?)
                    .await?;
                let reply = transport.recv(self.inner.command_timeout()).await?;
                let parsed = decode_response(&reply)?;
                if let Some(err) = parsed.error {
                    return Err(DeviceSessionError::Device(err));
                }
                let values = parsed
                    .values
                    .ok_or_else(|| DeviceSessionError::Device("response missing values".into()))?;
                let last = *values.last().unwrap_or(&0);
                Ok(CommandResponse {
                    result: OperationResult::Ok,
                    value: Some(last),
                    message: Some(format!("{} samples", values.len())),
                })
            }
            SensorOperation::StartContinuousSampling => self.start_continuous_sampling().await,
            SensorOperation::StopContinuousSampling => self.stop_continuous_sampling().await,
            SensorOperation::GetStatus => {
                let state = self.inner.state.read().await;
                let value = state.parameter(VALUE).map(|p| p.value).unwrap_or(0);
                Ok(CommandResponse::ok(value))
            }
        }
    }

    async fn start_continuous_sampling(self: &Arc<Self>) -> Result<CommandResponse, DeviceSessionError> {
        {
            let mut transport = self.inner.lock_transport().await;
            transport
                .send(&encode_request("start_continuous_sampling", None)?)
                .await?;
            let reply = transport.recv(self.inner.command_timeout()).await?;
            decode_response(&reply)?;
        }
        self.inner
            .set_session_state(crate::state::SessionState::Streaming)
            .await;

        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_for_task = cancel.clone();
        let session = self.clone();
        let task = tokio::spawn(async move {
            let mut transport = session.inner.lock_transport().await;
            let mut tracker = SeqTracker::new();
            loop {
                if cancel_for_task.load(Ordering::Relaxed) {
                    break;
                }
                let frame = match transport.recv(Duration::from_millis(250)).await {
                    Ok(frame) => frame,
                    Err(TransportError::Timeout) => continue,
                    Err(_) => break,
                };
                let parsed = match decode_response(&frame) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "dropping malformed sample frame");
                        continue;
                    }
                };
                let (Some(value), Some(seq)) = (parsed.value, parsed.seq) else {
                    continue;
                };
                if !tracker.accept(seq) {
                    warn!(seq, "dropping out-of-order or duplicate sample");
                    continue;
                }
                session.inner.publish(UpdateEvent::Sample {
                    name: VALUE.to_string(),
                    value,
                    seq,
                });
            }
        });

        *self.stream.lock().await = Some(StreamHandle { cancel, task });
        Ok(CommandResponse::ok(1))
    }

    async fn stop_continuous_sampling(&self) -> Result<CommandResponse, DeviceSessionError> {
        if let Some(handle) = self.stream.lock().await.take() {
            handle.cancel.store(true, Ordering::Relaxed);
            let _ = handle.task.await;
        }

        {
            let mut transport = self.inner.lock_transport().await;
            transport
                .send(&encode_request("stop_continuous_sampling", None)?)
                .await?;
            let reply = transport.recv(self.inner.command_timeout()).await?;
            decode_response(&reply)?;

            while transport.recv(Duration::from_millis(20)).await.is_ok() {
                // drain any burst frame still in flight before returning the
                // transport to ordinary command/response use.
            }
        }

        self.inner
            .set_session_state(crate::state::SessionState::Idle)
            .await;
        let value = self
            .inner
            .state
            .read()
            .await
            .parameter(VALUE)
            .map(|p| p.value)
            .unwrap_or(0);
        Ok(CommandResponse::ok(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_tracker_rejects_repeats_and_large_jumps() {
        let mut tracker = SeqTracker::new();
        assert!(tracker.accept(10));
        assert!(!tracker.accept(10));
        assert!(tracker.accept(11));
        assert!(!tracker.accept(5000));
    }
}
