//! Wire-level command and event shapes shared by the HTTP surface, the
//! persistent channel surface, and the client library.
//!
//! `original_source/linear_stage/generic/linear_stage.py`'s `stage_operation`
//! dispatches on `isinstance(target, int)` vs `isinstance(target, float)` at
//! runtime to decide whether a caller supplied a logical or a physical
//! target. Here a tagged enum decided at deserialization time replaces the
//! runtime type check, so an ambiguous or conflicting request (both a
//! logical and a physical target set) is rejected by `TargetRequest::resolve`
//! before it ever reaches a device session, rather than by an `isinstance`
//! fallthrough.

use serde::{Deserialize, Serialize};

use crate::error::OperationResult;
use crate::units::{PhysicalQuantity, Unit};

/// A command target expressed either as a raw logical step count or as a
/// physical quantity to be converted against the parameter's step size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Logical(i64),
    Physical(PhysicalQuantity),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TargetError {
    #[error("request supplied both a logical and a physical target for the same parameter")]
    ConflictingTargets,
    #[error("request supplied no target")]
    NoTarget,
}

/// The over-the-wire shape of a set-parameter request: `{ "logical": 12 }`
/// or `{ "physical": 1.2, "unit": "mm" }`, never both. This, not `Target`
/// directly, is what every `StageOperation` target field holds, so a
/// command carrying both fields is rejected by `resolve` before it ever
/// reaches a device session instead of one field silently winning the way
/// serde's externally tagged enum representation would if `Target` were
/// deserialized in its place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetRequest {
    pub logical: Option<i64>,
    pub physical: Option<f64>,
    pub unit: Option<Unit>,
}

impl TargetRequest {
    /// Resolve to exactly one `Target`, rejecting the simultaneous-fields
    /// case explicitly rather than letting one field silently win.
    pub fn resolve(self) -> Result<Target, TargetError> {
        match (self.logical, self.physical) {
            (Some(_), Some(_)) => Err(TargetError::ConflictingTargets),
            (Some(v), None) => Ok(Target::Logical(v)),
            (None, Some(v)) => {
                let unit = self.unit.ok_or(TargetError::NoTarget)?;
                Ok(Target::Physical(PhysicalQuantity::new(v, unit)))
            }
            (None, None) => Err(TargetError::NoTarget),
        }
    }
}

impl From<Target> for TargetRequest {
    fn from(target: Target) -> Self {
        match target {
            Target::Logical(v) => TargetRequest {
                logical: Some(v),
                physical: None,
                unit: None,
            },
            Target::Physical(q) => TargetRequest {
                logical: None,
                physical: Some(q.value),
                unit: Some(q.unit),
            },
        }
    }
}

/// Every operation a linear stage session accepts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum StageOperation {
    SetPosition { target: TargetRequest },
    SetVelocity { target: TargetRequest },
    SetAcceleration { target: TargetRequest },
    Stop,
    Home,
    GetStatus,
}

/// Every operation a sensor session accepts, including batch reads and
/// continuous-sampling control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SensorOperation {
    GetSample,
    GetDataBatch { batch_size: u32 },
    StartContinuousSampling,
    StopContinuousSampling,
    GetStatus,
}

/// Uniform reply to any command, over HTTP or the persistent channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub result: OperationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(value: i64) -> Self {
        Self {
            result: OperationResult::Ok,
            value: Some(value),
            message: None,
        }
    }

    pub fn warn_no_action(value: i64) -> Self {
        Self {
            result: OperationResult::WarnNoAction,
            value: Some(value),
            message: None,
        }
    }

    pub fn error(result: OperationResult, message: impl Into<String>) -> Self {
        Self {
            result,
            value: None,
            message: Some(message.into()),
        }
    }
}

/// A broadcast-worthy event pushed onto the update bus and fanned out to
/// every subscriber of a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UpdateEvent {
    ParameterChanged { name: String, value: i64 },
    PositionReached { value: i64 },
    Sample { name: String, value: i64, seq: u32 },
}

/// The single handshake message a persistent-channel client sends on
/// connect, before any command or broadcast frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelHandshake {
    pub token: String,
}

/// The server's reply to a successful handshake. A failed handshake closes
/// the socket with code 1008 instead of sending this.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelHandshakeAck {
    pub auth_result: &'static str,
}

impl ChannelHandshakeAck {
    pub fn success() -> Self {
        Self {
            auth_result: "success",
        }
    }
}

/// An inbound persistent-channel command, tagged with an optional
/// correlation id so the client can match a reply to the call that
/// produced it. `original_source/linear_stage/api/python/api.py`'s
/// `websocket_command` generates a `cid`, sends it alongside the command,
/// and blocks on a per-cid future until a matching ack arrives; `cid` is
/// `None` for fire-and-forget callers that only care about the broadcast
/// side effects.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelCommand<T> {
    pub cid: Option<u64>,
    #[serde(flatten)]
    pub operation: T,
}

/// The direct reply to a `ChannelCommand` that supplied a `cid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelCommandAck {
    pub cid: u64,
    #[serde(flatten)]
    pub response: CommandResponse,
}

/// Anything the server can push down a persistent channel: a fan-out
/// update meant for every subscriber, or a direct ack meant for the one
/// caller that attached a `cid` to its command. Untagged because the two
/// shapes are structurally distinct (`event` vs `cid`+`result`), which
/// keeps the wire format flat instead of wrapping every broadcast in an
/// extra envelope layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelMessage {
    Update(UpdateEvent),
    Ack(ChannelCommandAck),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_fields_are_rejected() {
        let req = TargetRequest {
            logical: Some(1),
            physical: Some(2.0),
            unit: Some(Unit::Millimeter),
        };
        assert_eq!(req.resolve().unwrap_err(), TargetError::ConflictingTargets);
    }

    #[test]
    fn logical_target_resolves() {
        let req = TargetRequest {
            logical: Some(42),
            ..Default::default()
        };
        assert_eq!(req.resolve().unwrap(), Target::Logical(42));
    }

    #[test]
    fn physical_target_requires_unit() {
        let req = TargetRequest {
            physical: Some(1.5),
            ..Default::default()
        };
        assert_eq!(req.resolve().unwrap_err(), TargetError::NoTarget);
    }

    #[test]
    fn physical_target_resolves_with_unit() {
        let req = TargetRequest {
            physical: Some(1.5),
            unit: Some(Unit::Millimeter),
            ..Default::default()
        };
        assert_eq!(
            req.resolve().unwrap(),
            Target::Physical(PhysicalQuantity::new(1.5, Unit::Millimeter))
        );
    }

    #[test]
    fn stage_operation_round_trips_through_json() {
        let op = StageOperation::SetPosition {
            target: TargetRequest {
                logical: Some(4200),
                ..Default::default()
            },
        };
        let s = serde_json::to_string(&op).unwrap();
        let back: StageOperation = serde_json::from_str(&s).unwrap();
        assert_eq!(op, back);
    }

    #[test]
    fn conflicting_target_fields_survive_into_a_stage_operation() {
        let op = StageOperation::SetPosition {
            target: TargetRequest {
                logical: Some(1),
                physical: Some(2.0),
                unit: Some(Unit::Millimeter),
            },
        };
        let TargetRequest { logical, physical, .. } = match op {
            StageOperation::SetPosition { target } => target,
            _ => unreachable!(),
        };
        assert!(logical.is_some() && physical.is_some());
    }
}
