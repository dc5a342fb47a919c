//! Response curves
//!
//! A response curve reshapes a value in [-1, 1]. Curves are built once from
//! a list of control points and then evaluated per sample.

use super::InputRangeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Iterations used to invert x(t) on a Bezier segment
const BEZIER_SEARCH_ITERATIONS: usize = 40;

/// Supported curve families, named as they appear in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CurveKind {
    CubicSpline,
    CubicBezierSpline,
}

impl fmt::Display for CurveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurveKind::CubicSpline => write!(f, "cubic-spline"),
            CurveKind::CubicBezierSpline => write!(f, "cubic-bezier-spline"),
        }
    }
}

/// Replaceable mapping `[-1, 1] -> [-1, 1]`
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResponseCurve {
    #[default]
    Identity,
    CubicSpline(CubicSpline),
    CubicBezierSpline(CubicBezierSpline),
}

impl ResponseCurve {
    pub fn from_points(kind: CurveKind, points: &[(f64, f64)]) -> Result<Self, InputRangeError> {
        match kind {
            CurveKind::CubicSpline => Ok(ResponseCurve::CubicSpline(CubicSpline::new(points)?)),
            CurveKind::CubicBezierSpline => Ok(ResponseCurve::CubicBezierSpline(
                CubicBezierSpline::new(points)?,
            )),
        }
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        match self {
            ResponseCurve::Identity => x,
            ResponseCurve::CubicSpline(spline) => spline.evaluate(x),
            ResponseCurve::CubicBezierSpline(spline) => spline.evaluate(x),
        }
    }
}

fn check_finite(points: &[(f64, f64)]) -> Result<(), InputRangeError> {
    match points
        .iter()
        .position(|(x, y)| !x.is_finite() || !y.is_finite())
    {
        Some(index) => Err(InputRangeError::NonFinite { index }),
        None => Ok(()),
    }
}

/// Natural cubic spline interpolating the control points
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivative at each knot
    z: Vec<f64>,
}

impl CubicSpline {
    /// Builds the spline. Points must be sorted by strictly increasing x.
    pub fn new(points: &[(f64, f64)]) -> Result<Self, InputRangeError> {
        if points.len() < 2 {
            return Err(InputRangeError::NotEnoughPoints {
                kind: CurveKind::CubicSpline,
                required: 2,
                found: points.len(),
            });
        }
        check_finite(points)?;
        if let Some(index) = (1..points.len()).find(|&i| points[i].0 <= points[i - 1].0) {
            return Err(InputRangeError::UnorderedPoints {
                kind: CurveKind::CubicSpline,
                index,
            });
        }

        let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
        let z = Self::second_derivatives(&xs, &ys);

        Ok(Self { xs, ys, z })
    }

    /// Solves the tridiagonal system for a natural spline (z = 0 at both ends)
    fn second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
        let n = xs.len();
        let mut z = vec![0.0; n];
        if n < 3 {
            return z;
        }

        let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
        let mut c_prime = vec![0.0; n];
        let mut d_prime = vec![0.0; n];

        for i in 1..n - 1 {
            let a = h[i - 1];
            let b = 2.0 * (h[i - 1] + h[i]);
            let c = h[i];
            let d = 6.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);

            let denom = b - a * c_prime[i - 1];
            c_prime[i] = c / denom;
            d_prime[i] = (d - a * d_prime[i - 1]) / denom;
        }

        for i in (1..n - 1).rev() {
            z[i] = d_prime[i] - c_prime[i] * z[i + 1];
        }
        z
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let last = self.xs.len() - 1;
        let x = x.max(self.xs[0]).min(self.xs[last]);

        // Segment i spans xs[i]..=xs[i + 1]
        let i = self.xs.partition_point(|&k| k <= x).saturating_sub(1).min(last - 1);

        let h = self.xs[i + 1] - self.xs[i];
        let a = (self.xs[i + 1] - x) / h;
        let b = (x - self.xs[i]) / h;

        a * self.ys[i]
            + b * self.ys[i + 1]
            + ((a * a * a - a) * self.z[i] + (b * b * b - b) * self.z[i + 1]) * h * h / 6.0
    }
}

/// Piecewise cubic Bezier curve
///
/// Control points are laid out as `knot, handle, handle, knot, handle, handle, knot, ...`
/// so consecutive segments share their end knot.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicBezierSpline {
    points: Vec<(f64, f64)>,
}

impl CubicBezierSpline {
    pub fn new(points: &[(f64, f64)]) -> Result<Self, InputRangeError> {
        if points.len() < 4 {
            return Err(InputRangeError::NotEnoughPoints {
                kind: CurveKind::CubicBezierSpline,
                required: 4,
                found: points.len(),
            });
        }
        if (points.len() - 1) % 3 != 0 {
            return Err(InputRangeError::BezierPointCount {
                found: points.len(),
            });
        }
        check_finite(points)?;

        // Knots must advance along x and handles must stay inside their segment,
        // otherwise x(t) is not invertible on that segment.
        for seg in 0..(points.len() - 1) / 3 {
            let base = seg * 3;
            let (start, end) = (points[base].0, points[base + 3].0);
            if end <= start {
                return Err(InputRangeError::UnorderedPoints {
                    kind: CurveKind::CubicBezierSpline,
                    index: base + 3,
                });
            }
            for offset in 1..=2 {
                let hx = points[base + offset].0;
                if hx < start || hx > end {
                    return Err(InputRangeError::UnorderedPoints {
                        kind: CurveKind::CubicBezierSpline,
                        index: base + offset,
                    });
                }
            }
        }

        Ok(Self {
            points: points.to_vec(),
        })
    }

    fn segment_count(&self) -> usize {
        (self.points.len() - 1) / 3
    }

    fn point_at(segment: &[(f64, f64)], t: f64) -> (f64, f64) {
        let mt = 1.0 - t;
        let w0 = mt * mt * mt;
        let w1 = 3.0 * mt * mt * t;
        let w2 = 3.0 * mt * t * t;
        let w3 = t * t * t;

        (
            w0 * segment[0].0 + w1 * segment[1].0 + w2 * segment[2].0 + w3 * segment[3].0,
            w0 * segment[0].1 + w1 * segment[1].1 + w2 * segment[2].1 + w3 * segment[3].1,
        )
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let first = self.points[0].0;
        let last = self.points[self.points.len() - 1].0;
        let x = x.max(first).min(last);

        let seg = (0..self.segment_count())
            .find(|&s| x <= self.points[s * 3 + 3].0)
            .unwrap_or(self.segment_count() - 1);
        let segment = &self.points[seg * 3..seg * 3 + 4];

        // Bisection on t, assumes x(t) is non-decreasing on the segment
        let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
        for _ in 0..BEZIER_SEARCH_ITERATIONS {
            let mid = 0.5 * (lo + hi);
            if Self::point_at(segment, mid).0 < x {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        Self::point_at(segment, 0.5 * (lo + hi)).1
    }
}
