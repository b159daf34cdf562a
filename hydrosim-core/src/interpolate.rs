//! Piecewise-linear relationships, used for reservoir curves.

use crate::errors::{HydroError, HydroResult};
use serde::{Deserialize, Serialize};

/// A relationship defined by ordered `(x, y)` pairs.
///
/// Values between two pairs are linearly interpolated. Outside of the provided range the
/// value of the nearest end is used, there is no extrapolation.
/// The pairs must be sorted by `x`; monotonicity of `y` is not required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseLinear {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl PiecewiseLinear {
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> HydroResult<Self> {
        if x.len() != y.len() {
            return Err(HydroError::Configuration(format!(
                "curve has {} x values but {} y values",
                x.len(),
                y.len()
            )));
        }
        if x.is_empty() {
            return Err(HydroError::Configuration(
                "curve requires at least one point".to_string(),
            ));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(HydroError::Configuration(
                "curve values must be finite".to_string(),
            ));
        }
        if x.windows(2).any(|w| w[1] < w[0]) {
            return Err(HydroError::Configuration(
                "curve x values must be sorted in ascending order".to_string(),
            ));
        }
        Ok(Self { x, y })
    }

    /// Swap the axes, e.g. to look up a level from a storage.
    pub fn inverted(&self) -> HydroResult<Self> {
        Self::new(self.y.clone(), self.x.clone())
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn min_x(&self) -> f64 {
        self.x[0]
    }

    pub fn max_x(&self) -> f64 {
        self.x[self.x.len() - 1]
    }

    pub fn max_y(&self) -> f64 {
        self.y.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Value at `x`, clamped at the ends of the curve.
    pub fn evaluate(&self, x: f64) -> f64 {
        let n = self.x.len();
        if x <= self.x[0] {
            return self.y[0];
        }
        if x >= self.x[n - 1] {
            return self.y[n - 1];
        }
        // First index with x[i] > x; bracketed by i - 1 and i
        let upper = self.x.partition_point(|&v| v <= x);
        let lower = upper - 1;
        let (x0, x1) = (self.x[lower], self.x[upper]);
        let (y0, y1) = (self.y[lower], self.y[upper]);
        if x1 == x0 {
            return y1;
        }
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn curve() -> PiecewiseLinear {
        PiecewiseLinear::new(vec![0.0, 10.0, 20.0], vec![0.0, 100.0, 400.0]).unwrap()
    }

    #[test]
    fn interpolates_between_points() {
        let c = curve();
        assert!(is_close!(c.evaluate(5.0), 50.0));
        assert!(is_close!(c.evaluate(15.0), 250.0));
        assert!(is_close!(c.evaluate(10.0), 100.0));
    }

    #[test]
    fn clamps_at_range_ends() {
        let c = curve();
        assert_eq!(c.evaluate(-3.0), 0.0);
        assert_eq!(c.evaluate(25.0), 400.0);
    }

    #[test]
    fn inverted_curve() {
        let inverse = curve().inverted().unwrap();
        assert!(is_close!(inverse.evaluate(250.0), 15.0));
    }

    #[test]
    fn invalid_curves() {
        assert!(PiecewiseLinear::new(vec![0.0, 1.0], vec![1.0]).is_err());
        assert!(PiecewiseLinear::new(vec![], vec![]).is_err());
        assert!(PiecewiseLinear::new(vec![1.0, 0.0], vec![1.0, 2.0]).is_err());
        assert!(PiecewiseLinear::new(vec![0.0, f64::NAN], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn single_point_curve_is_constant() {
        let c = PiecewiseLinear::new(vec![3.0], vec![7.0]).unwrap();
        assert_eq!(c.evaluate(-1.0), 7.0);
        assert_eq!(c.evaluate(10.0), 7.0);
    }
}
