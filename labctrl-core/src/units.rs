//! Physical units and the conversion table behind them.
//!
//! Grounded on `original_source/linear_stage/generic/unit.py` and
//! `original_source/sensor/generic/unit.py`: a closed enum per dimension and
//! a flat `(from, to) -> factor` table, generalized here into one enum and
//! one table spanning every dimension a shared instrument session needs to
//! convert between, instead of one table per device. Cross-dimension
//! lookups are rejected at the type level by keying
//! the table on `(Unit, Unit)` and returning `UnitError::Mismatch` whenever
//! the two units are not in the same dimension.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Displacement,
    Velocity,
    Acceleration,
    Time,
    Temperature,
    Humidity,
}

/// A unit drawn from a closed, per-dimension enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    // displacement
    Nanometer,
    Micrometer,
    Millimeter,
    Meter,
    // velocity
    NanometerPerSecond,
    MicrometerPerSecond,
    MillimeterPerSecond,
    MeterPerSecond,
    // acceleration
    NanometerPerSecondSquared,
    MicrometerPerSecondSquared,
    MillimeterPerSecondSquared,
    MeterPerSecondSquared,
    // time
    Nanosecond,
    Microsecond,
    Millisecond,
    Second,
    // temperature
    Kelvin,
    Celsius,
    Fahrenheit,
    // humidity
    GramPerCubicMeter,
    RelativeHumidity,
    PercentRelativeHumidity,
}

impl Unit {
    pub fn dimension(self) -> Dimension {
        use Unit::*;
        match self {
            Nanometer | Micrometer | Millimeter | Meter => Dimension::Displacement,
            NanometerPerSecond | MicrometerPerSecond | MillimeterPerSecond | MeterPerSecond => {
                Dimension::Velocity
            }
            NanometerPerSecondSquared
            | MicrometerPerSecondSquared
            | MillimeterPerSecondSquared
            | MeterPerSecondSquared => Dimension::Acceleration,
            Nanosecond | Microsecond | Millisecond | Second => Dimension::Time,
            Kelvin | Celsius | Fahrenheit => Dimension::Temperature,
            GramPerCubicMeter | RelativeHumidity | PercentRelativeHumidity => Dimension::Humidity,
        }
    }

    /// Symbol as it appears on the wire (e.g. in `{"unit": "mm"}`).
    pub fn symbol(self) -> &'static str {
        use Unit::*;
        match self {
            Nanometer => "nm",
            Micrometer => "um",
            Millimeter => "mm",
            Meter => "m",
            NanometerPerSecond => "nm/s",
            MicrometerPerSecond => "um/s",
            MillimeterPerSecond => "mm/s",
            MeterPerSecond => "m/s",
            NanometerPerSecondSquared => "nm/s2",
            MicrometerPerSecondSquared => "um/s2",
            MillimeterPerSecondSquared => "mm/s2",
            MeterPerSecondSquared => "m/s2",
            Nanosecond => "ns",
            Microsecond => "us",
            Millisecond => "ms",
            Second => "s",
            Kelvin => "K",
            Celsius => "degC",
            Fahrenheit => "degF",
            GramPerCubicMeter => "g/m3",
            RelativeHumidity => "RH",
            PercentRelativeHumidity => "%RH",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum UnitError {
    #[error("cannot convert {from} to {to}: different physical dimensions")]
    Mismatch { from: Unit, to: Unit },
    #[error("conversion from {from} to {to} requires ambient conditions not supplied")]
    Unsupported { from: Unit, to: Unit },
}

/// A physical quantity: a real value tagged with its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalQuantity {
    pub value: f64,
    pub unit: Unit,
}

impl PhysicalQuantity {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }
}

// Metric-prefix factors, as exact powers of ten, relative to the base unit
// of each linear dimension (nm for displacement, nm/s for velocity, etc).
const METRIC_SCALE: &[(Unit, f64)] = &[
    (Unit::Nanometer, 1e0),
    (Unit::Micrometer, 1e3),
    (Unit::Millimeter, 1e6),
    (Unit::Meter, 1e9),
    (Unit::NanometerPerSecond, 1e0),
    (Unit::MicrometerPerSecond, 1e3),
    (Unit::MillimeterPerSecond, 1e6),
    (Unit::MeterPerSecond, 1e9),
    (Unit::NanometerPerSecondSquared, 1e0),
    (Unit::MicrometerPerSecondSquared, 1e3),
    (Unit::MillimeterPerSecondSquared, 1e6),
    (Unit::MeterPerSecondSquared, 1e9),
    (Unit::Nanosecond, 1e0),
    (Unit::Microsecond, 1e3),
    (Unit::Millisecond, 1e6),
    (Unit::Second, 1e9),
];

fn metric_scale(u: Unit) -> Option<f64> {
    METRIC_SCALE
        .iter()
        .find(|(unit, _)| *unit == u)
        .map(|(_, scale)| *scale)
}

/// `convert(x, from, to)` — the sole entry point for unit conversion.
///
/// Metric-prefixed dimensions (displacement, velocity, acceleration, time)
/// compose as exact ratios of powers of ten. Temperature follows the usual
/// affine rules. Humidity's `g/m3 <-> RH/%RH` legs require ambient
/// temperature and pressure this function does not take, and are refused as
/// `UnitError::Unsupported` rather than silently passed through — the
/// Python original stubs this conversion as a no-op, which is deliberately
/// not reproduced here.
pub fn convert(x: f64, from: Unit, to: Unit) -> Result<f64, UnitError> {
    if from.dimension() != to.dimension() {
        return Err(UnitError::Mismatch { from, to });
    }
    if let (Some(from_scale), Some(to_scale)) = (metric_scale(from), metric_scale(to)) {
        return Ok(x * (from_scale / to_scale));
    }
    match (from, to) {
        (Unit::Kelvin, Unit::Kelvin) => Ok(x),
        (Unit::Kelvin, Unit::Celsius) => Ok(x - 273.15),
        (Unit::Kelvin, Unit::Fahrenheit) => Ok((x - 273.15) * 9.0 / 5.0 + 32.0),
        (Unit::Celsius, Unit::Kelvin) => Ok(x + 273.15),
        (Unit::Celsius, Unit::Celsius) => Ok(x),
        (Unit::Celsius, Unit::Fahrenheit) => Ok(x * 9.0 / 5.0 + 32.0),
        (Unit::Fahrenheit, Unit::Kelvin) => Ok((x - 32.0) * 5.0 / 9.0 + 273.15),
        (Unit::Fahrenheit, Unit::Celsius) => Ok((x - 32.0) * 5.0 / 9.0),
        (Unit::Fahrenheit, Unit::Fahrenheit) => Ok(x),
        (Unit::RelativeHumidity, Unit::RelativeHumidity) => Ok(x),
        (Unit::PercentRelativeHumidity, Unit::PercentRelativeHumidity) => Ok(x),
        (Unit::GramPerCubicMeter, Unit::GramPerCubicMeter) => Ok(x),
        // RH <-> %RH is a trivial *100 scale with no ambient dependency.
        (Unit::RelativeHumidity, Unit::PercentRelativeHumidity) => Ok(x * 100.0),
        (Unit::PercentRelativeHumidity, Unit::RelativeHumidity) => Ok(x / 100.0),
        _ => Err(UnitError::Unsupported { from, to }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_round_trip() {
        let mm = convert(12.5, Unit::Millimeter, Unit::Micrometer).unwrap();
        assert!((mm - 12_500.0).abs() < 1e-6);
        let back = convert(mm, Unit::Micrometer, Unit::Millimeter).unwrap();
        assert!((back - 12.5).abs() < 1e-9);
    }

    #[test]
    fn temperature_round_trip() {
        let f = convert(23.0, Unit::Celsius, Unit::Fahrenheit).unwrap();
        assert!((f - 73.4).abs() < 1e-9);
        let c = convert(f, Unit::Fahrenheit, Unit::Celsius).unwrap();
        assert!((c - 23.0).abs() < 1e-9);
    }

    #[test]
    fn cross_dimension_is_mismatch() {
        let err = convert(1.0, Unit::Millimeter, Unit::Kelvin).unwrap_err();
        assert!(matches!(err, UnitError::Mismatch { .. }));
    }

    #[test]
    fn humidity_mass_concentration_is_unsupported() {
        let err = convert(1.0, Unit::GramPerCubicMeter, Unit::RelativeHumidity).unwrap_err();
        assert!(matches!(err, UnitError::Unsupported { .. }));
    }

    #[test]
    fn humidity_percent_scale_is_supported() {
        let pct = convert(0.55, Unit::RelativeHumidity, Unit::PercentRelativeHumidity).unwrap();
        assert!((pct - 55.0).abs() < 1e-9);
    }
}
