//! Streaming Moments
//!
//! Single-pass accumulation of the first four central moments.
//! Updates follow Welford's algorithm extended to third and fourth moments
//! (Terriberry), so no raw samples are retained and large sample counts do
//! not suffer from catastrophic cancellation.
//!
//! Accessors that are undefined for the current sample count return `NaN`
//! instead of a default. Callers are expected to propagate it.

use serde::{Deserialize, Serialize};

/// Running count, mean and central-moment sums of a stream of observations.
#[derive(Debug, Clone, Default)]
pub struct MomentAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
    m3: f64,
    m4: f64,
    min: f64,
    max: f64,
}

/// Point-in-time copy of the derived statistics of a [`MomentAccumulator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentSummary {
    /// Number of observations
    pub count: u64,
    /// Arithmetic mean
    pub mean: f64,
    /// Bessel-corrected variance
    pub variance: f64,
    /// Adjusted Fisher-Pearson skewness (G1)
    pub skew: f64,
    /// Bias-corrected excess kurtosis (G2)
    pub kurtosis: f64,
    /// Smallest observation
    pub min: f64,
    /// Largest observation
    pub max: f64,
}

impl MomentAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one observation in O(1).
    pub fn update(&mut self, x: f64) {
        let n1 = self.count as f64;
        self.count += 1;
        let n = self.count as f64;

        if self.count == 1 {
            self.min = x;
            self.max = x;
        } else {
            self.min = self.min.min(x);
            self.max = self.max.max(x);
        }

        let delta = x - self.mean;
        let delta_n = delta / n;
        let delta_n2 = delta_n * delta_n;
        let term1 = delta * delta_n * n1;

        self.mean += delta_n;
        // Order matters: m4 uses the old m3 and m2, m3 uses the old m2.
        self.m4 += term1 * delta_n2 * (n * n - 3.0 * n + 3.0) + 6.0 * delta_n2 * self.m2
            - 4.0 * delta_n * self.m3;
        self.m3 += term1 * delta_n * (n - 2.0) - 3.0 * delta_n * self.m2;
        self.m2 += term1;
    }

    /// Number of observations so far
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Arithmetic mean, `NaN` when empty
    pub fn mean(&self) -> f64 {
        if self.count == 0 { f64::NAN } else { self.mean }
    }

    /// Smallest observation, `NaN` when empty
    pub fn min(&self) -> f64 {
        if self.count == 0 { f64::NAN } else { self.min }
    }

    /// Largest observation, `NaN` when empty
    pub fn max(&self) -> f64 {
        if self.count == 0 { f64::NAN } else { self.max }
    }

    /// Population variance (divides by n), `NaN` when empty
    pub fn population_variance(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.m2 / self.count as f64
        }
    }

    /// Bessel-corrected sample variance, `NaN` for n < 2
    pub fn sample_variance(&self) -> f64 {
        if self.count < 2 {
            f64::NAN
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Sample standard deviation, `NaN` for n < 2
    pub fn sample_std_dev(&self) -> f64 {
        self.sample_variance().sqrt()
    }

    /// Adjusted Fisher-Pearson skewness, `NaN` for n < 3 or zero variance
    pub fn sample_skew(&self) -> f64 {
        if self.count < 3 {
            return f64::NAN;
        }
        let n = self.count as f64;
        let g1 = n.sqrt() * self.m3 / self.m2.powf(1.5);
        g1 * (n * (n - 1.0)).sqrt() / (n - 2.0)
    }

    /// Bias-corrected excess kurtosis, `NaN` for n < 4 or zero variance
    pub fn sample_kurtosis(&self) -> f64 {
        if self.count < 4 {
            return f64::NAN;
        }
        let n = self.count as f64;
        let g2 = n * self.m4 / (self.m2 * self.m2) - 3.0;
        ((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0))
    }

    /// Snapshot every derived statistic
    pub fn snapshot(&self) -> MomentSummary {
        MomentSummary {
            count: self.count,
            mean: self.mean(),
            variance: self.sample_variance(),
            skew: self.sample_skew(),
            kurtosis: self.sample_kurtosis(),
            min: self.min(),
            max: self.max(),
        }
    }
}

impl Extend<f64> for MomentAccumulator {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for x in iter {
            self.update(x);
        }
    }
}

impl FromIterator<f64> for MomentAccumulator {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = Self::new();
        acc.extend(iter);
        acc
    }
}
