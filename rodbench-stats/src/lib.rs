#![warn(missing_docs)]
//! rodbench Statistical Engine
//!
//! Single-pass statistics over streams of benchmark observations:
//! - Moment accumulation (mean, variance, skewness, kurtosis)
//! - Simple linear regression with standard errors and R²
//!
//! Neither accumulator retains raw samples. Statistics that are undefined for
//! the current sample count are reported as `NaN` rather than a default.

mod moments;
mod regression;

pub use moments::{MomentAccumulator, MomentSummary};
pub use regression::{LinearFit, RegressionAccumulator};

/// Format a statistic for reports, keeping undefined values visible.
pub fn display_stat(value: f64, precision: usize) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else {
        format!("{:.*}", precision, value)
    }
}
