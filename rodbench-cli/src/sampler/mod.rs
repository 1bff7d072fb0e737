//! Adaptive sampling
//!
//! Strategies that estimate a benchmark's per-iteration cost net of the
//! fixed per-run overhead, and recommend an iteration count at which that
//! overhead stays below a target fraction of the measured time.
//!
//! - [`RegressionStrategy`]: calibrate `N0`, then sample random counts in
//!   `[N0/1000 + 1, N0]` and fit lines through the observations.
//! - [`TwoPointStrategy`]: sample at 1 and `h` iterations; the difference of
//!   the mean run times is the per-iteration cost.

mod regression;
mod two_point;

pub use regression::RegressionStrategy;
pub use two_point::TwoPointStrategy;

use crate::client::{ClientError, HostClient};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rodbench_ipc::{BenchTarget, BenchmarkEntry, RunOutcome, RunRequest};
use rodbench_stats::{LinearFit, MomentAccumulator, MomentSummary};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Which estimator to run
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Random iteration counts, linear fit
    Regression,
    /// Runs of 1 and `h` iterations, mean difference
    #[default]
    TwoPoint,
}

impl StrategyKind {
    /// Instantiate the strategy
    pub fn build(self, params: SamplerParams) -> Box<dyn Strategy> {
        match self {
            StrategyKind::Regression => Box::new(RegressionStrategy::new(params)),
            StrategyKind::TwoPoint => Box::new(TwoPointStrategy::new(params)),
        }
    }
}

/// Validated sampler settings
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerParams {
    /// Trials per regime
    pub trials: usize,
    /// Second iteration count of the two-point strategy
    pub probe: u64,
    /// Largest acceptable overhead share of total time
    pub target: f64,
    /// Run-time budget for calibration
    pub calibration: Duration,
    /// Calibration never exceeds this count
    pub max_iterations: u64,
    /// Fixed RNG seed for reproducible schedules
    pub seed: Option<u64>,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            trials: 100,
            probe: 2,
            target: 0.01,
            calibration: Duration::from_secs(2),
            max_iterations: 1_000_000_000,
            seed: None,
        }
    }
}

impl SamplerParams {
    pub(crate) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Recommended iteration count, or why none can be given
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Recommendation {
    /// Overhead stays under the target at `iterations`
    Reliable {
        /// Recommended iteration count
        iterations: u64,
        /// Expected run time at that count
        duration_ns: f64,
    },
    /// Cost could not be resolved
    Unreliable {
        /// Why
        reason: String,
    },
}

impl Recommendation {
    /// Whether a count was produced
    pub fn is_reliable(&self) -> bool {
        matches!(self, Recommendation::Reliable { .. })
    }
}

/// Iteration count keeping `overhead_ns` under `target` of total time.
///
/// `N = ceil(overhead / (per_op * target))`, unreliable when the per-op cost
/// is not positive or either input is undefined.
pub fn recommend(overhead_ns: f64, per_op_ns: f64, target: f64) -> Recommendation {
    if !overhead_ns.is_finite() || !per_op_ns.is_finite() {
        return Recommendation::Unreliable {
            reason: "estimate is undefined".to_string(),
        };
    }
    if per_op_ns <= 0.0 {
        return Recommendation::Unreliable {
            reason: format!(
                "per-op cost {:.3}ns is not positive; noise dominates",
                per_op_ns
            ),
        };
    }
    if overhead_ns <= 0.0 {
        return Recommendation::Reliable {
            iterations: 1,
            duration_ns: per_op_ns,
        };
    }

    let n = (overhead_ns / (per_op_ns * target)).ceil();
    if !n.is_finite() || n > u64::MAX as f64 {
        return Recommendation::Unreliable {
            reason: "recommended count overflows".to_string(),
        };
    }
    let iterations = (n as u64).max(1);
    Recommendation::Reliable {
        iterations,
        duration_ns: iterations as f64 * per_op_ns,
    }
}

/// Running moments after one trial
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialSnapshot {
    /// 1-based trial number
    pub trial: usize,
    /// Iteration count of this trial
    pub iterations: u64,
    /// Running mean
    pub mean: f64,
    /// Running sample skew
    pub skew: f64,
    /// Running excess kurtosis
    pub kurtosis: f64,
}

impl TrialSnapshot {
    pub(crate) fn capture(trial: usize, iterations: u64, moments: &MomentAccumulator) -> Self {
        Self {
            trial,
            iterations,
            mean: moments.mean(),
            skew: moments.sample_skew(),
            kurtosis: moments.sample_kurtosis(),
        }
    }
}

/// Strategy-specific statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimateDetail {
    /// Regression strategy
    Regression {
        /// Calibrated baseline count `N0`
        calibrated_iterations: u64,
        /// Fit of ns/op against iteration count
        fit: Option<LinearFit>,
        /// Fit of total run time against iteration count
        total_fit: Option<LinearFit>,
        /// Moments of ns/op
        moments: MomentSummary,
    },
    /// Two-point strategy
    TwoPoint {
        /// Probe count `h`
        probe: u64,
        /// Moments of run time at 1 iteration
        single: MomentSummary,
        /// Moments of run time at `h` iterations
        probed: MomentSummary,
    },
}

/// Result of estimating one benchmark on one host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Benchmark name
    pub benchmark: String,
    /// Host label
    pub host: String,
    /// Strategy name
    pub strategy: String,
    /// Overhead-free cost per iteration (NaN when undefined)
    pub per_op_ns: f64,
    /// Fixed cost per run (NaN when undefined)
    pub overhead_ns: f64,
    /// Recommended iteration count
    pub recommendation: Recommendation,
    /// Strategy statistics; absent for failed estimates
    pub detail: Option<EstimateDetail>,
    /// Running moments per trial
    pub trials: Vec<TrialSnapshot>,
    /// Runs that failed and were discarded
    pub failed_runs: u64,
    /// Why the estimate failed, if it did
    pub failure: Option<String>,
}

impl Estimate {
    /// A failed estimate carrying no statistics
    pub fn failed(
        benchmark: &str,
        host: &str,
        strategy: &str,
        reason: impl Into<String>,
        failed_runs: u64,
    ) -> Self {
        let reason = reason.into();
        Self {
            benchmark: benchmark.to_string(),
            host: host.to_string(),
            strategy: strategy.to_string(),
            per_op_ns: f64::NAN,
            overhead_ns: f64::NAN,
            recommendation: Recommendation::Unreliable {
                reason: "benchmark failed".to_string(),
            },
            detail: None,
            trials: Vec::new(),
            failed_runs,
            failure: Some(reason),
        }
    }

    /// Whether the benchmark failed
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// An estimator of per-op cost and recommended N
pub trait Strategy: Send + Sync {
    /// Short name used in reports
    fn name(&self) -> &'static str;

    /// Estimate `bench` on `host`.
    ///
    /// Benchmark failures produce a failed [`Estimate`]; only channel and
    /// command errors are returned as `Err`.
    fn estimate(
        &self,
        host: &mut dyn HostClient,
        bench: &BenchmarkEntry,
    ) -> Result<Estimate, ClientError>;
}

/// Why sampling stopped early
#[derive(Debug)]
pub(crate) enum Abort {
    Client(ClientError),
    Failed(String),
}

impl From<ClientError> for Abort {
    fn from(e: ClientError) -> Self {
        Abort::Client(e)
    }
}

/// Run `bench` for `iterations` on its host-local index.
pub(crate) fn run_at(
    host: &mut dyn HostClient,
    bench: &BenchmarkEntry,
    iterations: u64,
) -> Result<RunOutcome, ClientError> {
    host.run(&RunRequest::new(BenchTarget::Index(bench.index), iterations))
}

/// Find the iteration count that fills the calibration budget.
///
/// Starting from one iteration, each run predicts the next count from the
/// measured ns/op: 1.2x the prediction, at most 100x the previous count and
/// at least one more, never above `max_iterations`.
pub fn calibrate(
    host: &mut dyn HostClient,
    bench: &BenchmarkEntry,
    params: &SamplerParams,
) -> Result<Result<u64, String>, ClientError> {
    let budget = params.calibration.as_nanos() as f64;
    let max = params.max_iterations.max(1);
    let mut n: u64 = 1;

    loop {
        let outcome = run_at(host, bench, n)?;
        if outcome.failed {
            let reason = outcome.failure.unwrap_or_else(|| "failed".to_string());
            return Ok(Err(reason));
        }
        let elapsed = outcome.elapsed_ns as f64;
        if elapsed >= budget || n >= max {
            debug!(benchmark = %bench.name, iterations = n, elapsed_ns = outcome.elapsed_ns, "calibrated");
            return Ok(Ok(n));
        }

        let prev = n as f64;
        let per_op = elapsed / prev;
        let predicted = if per_op > 0.0 {
            budget / per_op * 1.2
        } else {
            max as f64
        };
        let next = predicted.min(prev * 100.0).max(prev + 1.0).min(max as f64);
        n = next as u64;
    }
}
