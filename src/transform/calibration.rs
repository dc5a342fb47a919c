//! Calibration and deadzone mapping
//!
//! Maps raw device readings onto [-1, 1]. Two calibration styles exist:
//! a pivoted axis mapping (stick-like, distinct center) and a linear slider
//! mapping (throttle-like, center coincides with one end).

use super::InputRangeError;

/// Clamps `value` to the given range. Reversed bounds are swapped first.
pub fn clamp(value: f64, min_val: f64, max_val: f64) -> f64 {
    let (lo, hi) = if min_val > max_val {
        (max_val, min_val)
    } else {
        (min_val, max_val)
    };
    value.max(lo).min(hi)
}

/// Returns `value` mapped through the deadzone described by the four limits.
///
/// The limits must satisfy `-1 <= low < low_center <= 0 <= high_center < high <= 1`,
/// which [`Deadzone::new`] guarantees. Calling this directly with
/// `high == high_center` or `low == low_center` divides by zero.
pub fn deadzone(value: f64, low: f64, low_center: f64, high_center: f64, high: f64) -> f64 {
    if value >= 0.0 {
        ((value - high_center) / (high - high_center).abs()).max(0.0).min(1.0)
    } else {
        ((value - low_center) / (low - low_center).abs()).min(0.0).max(-1.0)
    }
}

/// Calibrated value for a normal style axis, pivoting at `center`.
pub fn axis_calibration(value: f64, minimum: f64, center: f64, maximum: f64) -> f64 {
    let value = clamp(value, minimum, maximum);
    if value < center {
        (value - center) / (center - minimum)
    } else {
        (value - center) / (maximum - center)
    }
}

/// Calibrated value for a slider type axis, linear over the whole range.
pub fn slider_calibration(value: f64, minimum: f64, maximum: f64) -> f64 {
    let value = clamp(value, minimum, maximum);
    (value - minimum) / (maximum - minimum) * 2.0 - 1.0
}

/// Calibration selected once per device axis and reused for every sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Calibration {
    /// Pivoted mapping, `minimum < center < maximum`
    Axis {
        minimum: f64,
        center: f64,
        maximum: f64,
    },
    /// Linear mapping, `minimum < maximum`
    Slider { minimum: f64, maximum: f64 },
}

impl Calibration {
    /// Picks slider calibration when the center sits on either end of the
    /// range, pivoted axis calibration otherwise.
    pub fn select(minimum: f64, center: f64, maximum: f64) -> Result<Self, InputRangeError> {
        let degenerate = || InputRangeError::DegenerateCalibration {
            minimum,
            center,
            maximum,
        };

        if !(minimum.is_finite() && center.is_finite() && maximum.is_finite()) {
            return Err(degenerate());
        }
        if minimum >= maximum || center < minimum || center > maximum {
            return Err(degenerate());
        }

        if center == minimum || center == maximum {
            Ok(Calibration::Slider { minimum, maximum })
        } else {
            Ok(Calibration::Axis {
                minimum,
                center,
                maximum,
            })
        }
    }

    /// Maps a raw reading to [-1, 1]
    pub fn apply(&self, raw: f64) -> f64 {
        match *self {
            Calibration::Axis {
                minimum,
                center,
                maximum,
            } => axis_calibration(raw, minimum, center, maximum),
            Calibration::Slider { minimum, maximum } => slider_calibration(raw, minimum, maximum),
        }
    }

    pub fn is_slider(&self) -> bool {
        matches!(self, Calibration::Slider { .. })
    }
}

/// Returns the calibration appropriate for the provided raw bounds
pub fn create_calibration_function(
    minimum: f64,
    center: f64,
    maximum: f64,
) -> Result<Calibration, InputRangeError> {
    Calibration::select(minimum, center, maximum)
}

/// Validated deadzone limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deadzone {
    low: f64,
    low_center: f64,
    high_center: f64,
    high: f64,
}

impl Deadzone {
    pub fn new(
        low: f64,
        low_center: f64,
        high_center: f64,
        high: f64,
    ) -> Result<Self, InputRangeError> {
        let ordered = -1.0 <= low
            && low < low_center
            && low_center <= 0.0
            && 0.0 <= high_center
            && high_center < high
            && high <= 1.0;

        if !ordered {
            return Err(InputRangeError::InvalidDeadzone {
                low,
                low_center,
                high_center,
                high,
            });
        }

        Ok(Self {
            low,
            low_center,
            high_center,
            high,
        })
    }

    pub fn apply(&self, value: f64) -> f64 {
        deadzone(value, self.low, self.low_center, self.high_center, self.high)
    }

    /// The four limits as `(low, low_center, high_center, high)`
    pub fn limits(&self) -> (f64, f64, f64, f64) {
        (self.low, self.low_center, self.high_center, self.high)
    }
}

impl Default for Deadzone {
    /// No deadzone at all
    fn default() -> Self {
        Self {
            low: -1.0,
            low_center: 0.0,
            high_center: 0.0,
            high: 1.0,
        }
    }
}

/// Returns a deadzone mapping for the given limits
pub fn create_deadzone_function(
    low: f64,
    low_center: f64,
    high_center: f64,
    high: f64,
) -> Result<Deadzone, InputRangeError> {
    Deadzone::new(low, low_center, high_center, high)
}
