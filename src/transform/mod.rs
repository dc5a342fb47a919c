//! Signal transformation - calibration, deadzone and response curves
//!
//! Everything in here is pure: raw device units go in, values in [-1, 1]
//! come out. Range validation happens when a transform is constructed so
//! that per-sample evaluation never has to fail.

pub mod calibration;
pub mod curve;

pub use calibration::{
    axis_calibration, clamp, create_calibration_function, create_deadzone_function, deadzone,
    slider_calibration, Calibration, Deadzone,
};
pub use curve::{CubicBezierSpline, CubicSpline, CurveKind, ResponseCurve};

use log::warn;
use thiserror::Error;

/// Values whose magnitude exceeds 1 by more than this are reported as bad input
pub const RANGE_TOLERANCE: f64 = 0.001;

#[derive(Debug, Error, PartialEq)]
pub enum InputRangeError {
    #[error("Degenerate calibration range: minimum={minimum}, center={center}, maximum={maximum}")]
    DegenerateCalibration {
        minimum: f64,
        center: f64,
        maximum: f64,
    },

    #[error(
        "Invalid deadzone: need -1 <= low < low_center <= 0 <= high_center < high <= 1, \
         got low={low}, low_center={low_center}, high_center={high_center}, high={high}"
    )]
    InvalidDeadzone {
        low: f64,
        low_center: f64,
        high_center: f64,
        high: f64,
    },

    #[error("{kind} needs at least {required} control points, got {found}")]
    NotEnoughPoints {
        kind: CurveKind,
        required: usize,
        found: usize,
    },

    #[error("{kind} control point {index} does not increase along x")]
    UnorderedPoints { kind: CurveKind, index: usize },

    #[error("cubic-bezier-spline needs 3k+1 control points, got {found}")]
    BezierPointCount { found: usize },

    #[error("Control point {index} is not finite")]
    NonFinite { index: usize },
}

/// Runs an axis sample through the fixed write pipeline:
/// clamp -> deadzone -> response curve -> clamp.
pub fn process_axis(value: f64, deadzone: &Deadzone, curve: &ResponseCurve) -> f64 {
    if 1.0 - value.abs() < -RANGE_TOLERANCE {
        warn!(
            "Axis value has to be in [-1, 1], provided value was {:.2}",
            value
        );
    }

    let shaped = curve.evaluate(deadzone.apply(clamp(value, -1.0, 1.0)));
    clamp(shaped, -1.0, 1.0)
}
