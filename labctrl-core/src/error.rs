//! The cross-cutting result/error taxonomy shared by every device command.
//!
//! Grounded on `original_source/linear_stage/generic/linear_stage.py`'s
//! `StageOperationResult` enum and `sensor.py`'s mirror of it: one flat,
//! closed set of outcomes returned by every command path regardless of
//! device kind, serialized as the same snake_case strings the Python
//! original used so existing wire consumers are unaffected.

use serde::{Deserialize, Serialize};

/// The outcome of issuing a single command to a device session.
///
/// `Ok` and `WarnNoAction` are successes; everything else is a failure.
/// `is_ok` distinguishes the two tiers for callers that only care whether a
/// command is safe to consider "applied".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    /// Command accepted and applied.
    Ok,
    /// Target equals the parameter's current value; no command was sent to
    /// the device, but this is not an error.
    WarnNoAction,
    /// Requested target falls outside `ParameterSpec::{min,max}`.
    SoftLimitExceeded,
    /// The transport adapter's read or write failed.
    TransportRw,
    /// The command is structurally invalid (conflicting fields, unknown
    /// parameter name, wrong access level for the action).
    InvalidAction,
    /// The device replied, but the reply did not validate against the
    /// expected response shape.
    ResponseValidationFailure,
    /// The device reported an error condition of its own.
    DeviceError,
    /// Catch-all for failures that don't fit another variant.
    ErrorGeneric,
}

impl OperationResult {
    pub fn is_ok(self) -> bool {
        matches!(self, OperationResult::Ok | OperationResult::WarnNoAction)
    }
}

impl std::fmt::Display for OperationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationResult::Ok => "ok",
            OperationResult::WarnNoAction => "warn_no_action",
            OperationResult::SoftLimitExceeded => "soft_limit_exceeded",
            OperationResult::TransportRw => "transport_rw",
            OperationResult::InvalidAction => "invalid_action",
            OperationResult::ResponseValidationFailure => "response_validation_failure",
            OperationResult::DeviceError => "device_error",
            OperationResult::ErrorGeneric => "error_generic",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_strings_match_original_enum_values() {
        assert_eq!(
            serde_json::to_string(&OperationResult::SoftLimitExceeded).unwrap(),
            "\"soft_limit_exceeded\""
        );
        assert_eq!(
            serde_json::to_string(&OperationResult::WarnNoAction).unwrap(),
            "\"warn_no_action\""
        );
    }

    #[test]
    fn only_ok_and_warn_no_action_are_ok() {
        assert!(OperationResult::Ok.is_ok());
        assert!(OperationResult::WarnNoAction.is_ok());
        assert!(!OperationResult::SoftLimitExceeded.is_ok());
        assert!(!OperationResult::DeviceError.is_ok());
    }
}
