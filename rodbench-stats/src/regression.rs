//! Streaming Linear Regression
//!
//! Ordinary least squares over `(x, y)` pairs without retaining them.
//! The running sums are kept centred (means plus co-moments) and updated
//! incrementally, which carries the same information as raw `Σx`, `Σy`,
//! `Σxy`, `Σx²`, `Σy²` without the cancellation of `Σx² - (Σx)²/n`.

use serde::{Deserialize, Serialize};

/// Running sums for a simple linear regression `y = intercept + slope * x`.
#[derive(Debug, Clone, Default)]
pub struct RegressionAccumulator {
    count: u64,
    mean_x: f64,
    mean_y: f64,
    /// Σ(x - x̄)²
    sxx: f64,
    /// Σ(y - ȳ)²
    syy: f64,
    /// Σ(x - x̄)(y - ȳ)
    sxy: f64,
}

/// Fitted coefficients with their standard errors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    /// Number of points
    pub count: u64,
    /// Slope
    pub slope: f64,
    /// Intercept
    pub intercept: f64,
    /// Coefficient of determination
    pub r_squared: f64,
    /// Standard error of the slope (`NaN` for fewer than 3 points)
    pub slope_std_err: f64,
    /// Standard error of the intercept (`NaN` for fewer than 3 points)
    pub intercept_std_err: f64,
}

impl RegressionAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one `(x, y)` pair in O(1).
    pub fn update(&mut self, x: f64, y: f64) {
        self.count += 1;
        let n = self.count as f64;

        let dx = x - self.mean_x;
        let dy = y - self.mean_y;
        self.mean_x += dx / n;
        self.mean_y += dy / n;

        // Second factor uses the updated mean.
        self.sxx += dx * (x - self.mean_x);
        self.syy += dy * (y - self.mean_y);
        self.sxy += dx * (y - self.mean_y);
    }

    /// Number of points so far
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Fewer than two points, or every x identical.
    pub fn is_degenerate(&self) -> bool {
        self.count < 2 || self.sxx <= 0.0
    }

    /// Least-squares slope, `NaN` when degenerate
    pub fn slope(&self) -> f64 {
        if self.is_degenerate() {
            return f64::NAN;
        }
        self.sxy / self.sxx
    }

    /// Least-squares intercept, `NaN` when degenerate
    pub fn intercept(&self) -> f64 {
        if self.is_degenerate() {
            return f64::NAN;
        }
        self.mean_y - self.slope() * self.mean_x
    }

    /// Coefficient of determination, `NaN` when degenerate.
    ///
    /// A constant `y` is fitted exactly by a flat line and reports 1.
    pub fn r_squared(&self) -> f64 {
        if self.is_degenerate() {
            return f64::NAN;
        }
        if self.syy <= 0.0 {
            return 1.0;
        }
        (self.sxy * self.sxy / (self.sxx * self.syy)).min(1.0)
    }

    /// Residual variance `SSE / (n - 2)`, `NaN` for n < 3 or degenerate input
    fn residual_variance(&self) -> f64 {
        if self.is_degenerate() || self.count < 3 {
            return f64::NAN;
        }
        let sse = (self.syy - self.slope() * self.sxy).max(0.0);
        sse / (self.count - 2) as f64
    }

    /// Standard error of the slope, `NaN` for n < 3 or degenerate input
    pub fn slope_std_err(&self) -> f64 {
        (self.residual_variance() / self.sxx).sqrt()
    }

    /// Standard error of the intercept, `NaN` for n < 3 or degenerate input
    pub fn intercept_std_err(&self) -> f64 {
        let n = self.count as f64;
        (self.residual_variance() * (1.0 / n + self.mean_x * self.mean_x / self.sxx)).sqrt()
    }

    /// Snapshot of every coefficient, `None` when degenerate
    pub fn fit(&self) -> Option<LinearFit> {
        if self.is_degenerate() {
            return None;
        }
        Some(LinearFit {
            count: self.count,
            slope: self.slope(),
            intercept: self.intercept(),
            r_squared: self.r_squared(),
            slope_std_err: self.slope_std_err(),
            intercept_std_err: self.intercept_std_err(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_linear_series() {
        let mut reg = RegressionAccumulator::new();
        for x in 1..=50 {
            let x = x as f64;
            reg.update(x, 3.0 * x + 7.0);
        }

        assert_eq!(reg.count(), 50);
        assert!((reg.slope() - 3.0).abs() < 1e-6);
        assert!((reg.intercept() - 7.0).abs() < 1e-6);
        assert!((reg.r_squared() - 1.0).abs() < 1e-6);
        assert!(reg.slope_std_err() < 1e-6);
        assert!(reg.intercept_std_err() < 1e-6);
    }

    #[test]
    fn test_noisy_series_standard_errors() {
        // Alternating +/-1 residuals around y = 2x + 1.
        let mut reg = RegressionAccumulator::new();
        for x in 0..100 {
            let noise = if x % 2 == 0 { 1.0 } else { -1.0 };
            reg.update(x as f64, 2.0 * x as f64 + 1.0 + noise);
        }

        let fit = reg.fit().unwrap();
        assert!((fit.slope - 2.0).abs() < 0.01);
        assert!((fit.intercept - 1.0).abs() < 0.5);
        assert!(fit.r_squared > 0.99 && fit.r_squared < 1.0);
        assert!(fit.slope_std_err > 0.0 && fit.slope_std_err < 0.05);
        assert!(fit.intercept_std_err > fit.slope_std_err);
    }

    #[test]
    fn test_single_point_is_degenerate() {
        let mut reg = RegressionAccumulator::new();
        assert!(reg.is_degenerate());
        reg.update(1.0, 2.0);
        assert!(reg.is_degenerate());
        assert!(reg.slope().is_nan());
        assert!(reg.intercept().is_nan());
        assert!(reg.r_squared().is_nan());
        assert!(reg.fit().is_none());
    }

    #[test]
    fn test_identical_x_is_degenerate() {
        let mut reg = RegressionAccumulator::new();
        for y in [1.0, 5.0, 9.0] {
            reg.update(4.0, y);
        }
        assert!(reg.is_degenerate());
        assert!(reg.slope().is_nan());
        assert!(reg.slope_std_err().is_nan());
    }

    #[test]
    fn test_two_points_have_no_standard_error() {
        let mut reg = RegressionAccumulator::new();
        reg.update(0.0, 1.0);
        reg.update(1.0, 3.0);
        assert!((reg.slope() - 2.0).abs() < 1e-12);
        assert!((reg.intercept() - 1.0).abs() < 1e-12);
        assert!(reg.slope_std_err().is_nan());
        assert!(reg.intercept_std_err().is_nan());
    }

    #[test]
    fn test_constant_y_fits_flat_line() {
        let mut reg = RegressionAccumulator::new();
        for x in 1..=10 {
            reg.update(x as f64, 5.0);
        }
        assert_eq!(reg.slope(), 0.0);
        assert!((reg.intercept() - 5.0).abs() < 1e-12);
        assert_eq!(reg.r_squared(), 1.0);
    }
}
