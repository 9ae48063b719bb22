//! Logical/physical quantity conversion and the per-parameter spec.
//!
//! Grounded on `original_source/linear_stage/generic/linear_stage.py`
//! (`set_position`/`get_absolute_position`) and `hardware_config.py`
//! (`StagePositionParameter` et al, generalized into one `ParameterSpec`).

use serde::{Deserialize, Serialize};

use crate::units::{convert, PhysicalQuantity, Unit, UnitError};

/// The step size, current value, default, and soft limits for one settable
/// device parameter.
///
/// Invariants upheld by every constructor and mutator in this module:
/// `min <= value <= max`, `min <= default <= max`, `step.value > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub step: PhysicalQuantity,
    pub value: i64,
    pub default: i64,
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParameterSpecError {
    #[error("step size must be positive, got {0}")]
    NonPositiveStep(f64),
    #[error("value {value} is outside [{min}, {max}]")]
    OutOfRange { value: i64, min: i64, max: i64 },
}

impl ParameterSpec {
    pub fn new(
        step: PhysicalQuantity,
        value: i64,
        default: i64,
        min: i64,
        max: i64,
    ) -> Result<Self, ParameterSpecError> {
        if step.value <= 0.0 {
            return Err(ParameterSpecError::NonPositiveStep(step.value));
        }
        if !(min..=max).contains(&value) {
            return Err(ParameterSpecError::OutOfRange { value, min, max });
        }
        if !(min..=max).contains(&default) {
            return Err(ParameterSpecError::OutOfRange {
                value: default,
                min,
                max,
            });
        }
        Ok(Self {
            step,
            value,
            default,
            min,
            max,
        })
    }

    pub fn within_limits(&self, candidate: i64) -> bool {
        candidate >= self.min && candidate <= self.max
    }

    /// The parameter's current value expressed as a physical quantity in
    /// `target_unit`.
    pub fn physical_value(&self, target_unit: Unit) -> Result<PhysicalQuantity, UnitError> {
        to_physical(self.value, self, target_unit)
    }
}

/// Truncate `x` toward zero — `to_logical`'s rounding rule.
fn truncate_toward_zero(x: f64) -> i64 {
    x.trunc() as i64
}

/// `to_logical(physical, spec) -> int`: convert into `spec.step.unit`,
/// divide by `spec.step.value`, truncate toward zero.
pub fn to_logical(physical: PhysicalQuantity, spec: &ParameterSpec) -> Result<i64, UnitError> {
    let in_step_unit = convert(physical.value, physical.unit, spec.step.unit)?;
    Ok(truncate_toward_zero(in_step_unit / spec.step.value))
}

/// `to_physical(v, spec, target_unit) -> PhysicalQuantity`.
pub fn to_physical(
    v: i64,
    spec: &ParameterSpec,
    target_unit: Unit,
) -> Result<PhysicalQuantity, UnitError> {
    let in_step_unit = v as f64 * spec.step.value;
    let value = convert(in_step_unit, spec.step.unit, target_unit)?;
    Ok(PhysicalQuantity::new(value, target_unit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;

    fn stage_position_spec() -> ParameterSpec {
        ParameterSpec::new(
            PhysicalQuantity::new(10.0, Unit::Micrometer),
            0,
            0,
            -1_000_000,
            1_000_000,
        )
        .unwrap()
    }

    #[test]
    fn physical_target_round_trips_through_logical_steps() {
        let spec = stage_position_spec();
        let logical = to_logical(PhysicalQuantity::new(12.5, Unit::Millimeter), &spec).unwrap();
        assert_eq!(logical, 1_250_000);
        let physical = to_physical(logical, &spec, Unit::Millimeter).unwrap();
        assert!((physical.value - 12.5).abs() < 1e-9);
    }

    #[test]
    fn sub_step_remainder_truncates_toward_zero() {
        let spec = stage_position_spec();
        let logical = to_logical(PhysicalQuantity::new(12.50004, Unit::Millimeter), &spec).unwrap();
        assert_eq!(logical, 1_250_000);
    }

    #[test]
    fn rejects_non_positive_step() {
        let err = ParameterSpec::new(
            PhysicalQuantity::new(0.0, Unit::Micrometer),
            0,
            0,
            -10,
            10,
        )
        .unwrap_err();
        assert!(matches!(err, ParameterSpecError::NonPositiveStep(_)));
    }

    #[test]
    fn rejects_value_outside_limits() {
        let err = ParameterSpec::new(
            PhysicalQuantity::new(1.0, Unit::Micrometer),
            100,
            0,
            -10,
            10,
        )
        .unwrap_err();
        assert!(matches!(err, ParameterSpecError::OutOfRange { .. }));
    }
}
