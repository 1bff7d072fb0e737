//! Regression strategy

use super::{
    Abort, Estimate, EstimateDetail, SamplerParams, Strategy, TrialSnapshot, calibrate, recommend,
    run_at,
};
use crate::client::{ClientError, HostClient};
use rand::Rng;
use rodbench_ipc::BenchmarkEntry;
use rodbench_stats::{MomentAccumulator, RegressionAccumulator};
use tracing::{debug, warn};

/// Calibrate `N0`, then run random counts in `[N0/1000 + 1, N0]`.
///
/// Each trial's ns/op feeds the moments and a fit against the count; total
/// run time feeds a second fit whose slope is the per-op cost and whose
/// intercept is the overhead.
#[derive(Debug, Clone)]
pub struct RegressionStrategy {
    params: SamplerParams,
}

impl RegressionStrategy {
    /// Strategy with the given settings
    pub fn new(params: SamplerParams) -> Self {
        Self { params }
    }

    fn sample(
        &self,
        host: &mut dyn HostClient,
        bench: &BenchmarkEntry,
        failed_runs: &mut u64,
    ) -> Result<Estimate, Abort> {
        let n0 = calibrate(host, bench, &self.params)?.map_err(Abort::Failed)?;
        let lo = n0 / 1000 + 1;
        let hi = n0.max(lo);

        let mut rng = self.params.rng();
        let mut moments = MomentAccumulator::new();
        let mut per_op_fit = RegressionAccumulator::new();
        let mut total_fit = RegressionAccumulator::new();
        let mut trials = Vec::with_capacity(self.params.trials);
        let mut last_failure = None;

        for trial in 1..=self.params.trials {
            let n = rng.gen_range(lo..=hi);
            let outcome = run_at(host, bench, n)?;
            if outcome.failed {
                *failed_runs += 1;
                warn!(benchmark = %bench.name, trial, "run failed, discarding sample");
                last_failure = outcome.failure;
                continue;
            }
            let ns_per_op = outcome.ns_per_op();
            moments.update(ns_per_op);
            per_op_fit.update(n as f64, ns_per_op);
            total_fit.update(n as f64, outcome.elapsed_ns as f64);
            trials.push(TrialSnapshot::capture(trial, n, &moments));
        }

        if moments.count() == 0 {
            return Err(Abort::Failed(
                last_failure.unwrap_or_else(|| "every trial failed".to_string()),
            ));
        }

        let total = total_fit.fit();
        let (per_op_ns, overhead_ns) = total
            .map(|fit| (fit.slope, fit.intercept))
            .unwrap_or((f64::NAN, f64::NAN));
        debug!(benchmark = %bench.name, n0, per_op_ns, overhead_ns, "regression estimate");

        Ok(Estimate {
            benchmark: bench.name.clone(),
            host: host.label().to_string(),
            strategy: self.name().to_string(),
            per_op_ns,
            overhead_ns,
            recommendation: recommend(overhead_ns, per_op_ns, self.params.target),
            detail: Some(EstimateDetail::Regression {
                calibrated_iterations: n0,
                fit: per_op_fit.fit(),
                total_fit: total,
                moments: moments.snapshot(),
            }),
            trials,
            failed_runs: *failed_runs,
            failure: None,
        })
    }
}

impl Strategy for RegressionStrategy {
    fn name(&self) -> &'static str {
        "regression"
    }

    fn estimate(
        &self,
        host: &mut dyn HostClient,
        bench: &BenchmarkEntry,
    ) -> Result<Estimate, ClientError> {
        let mut failed_runs = 0;
        match self.sample(host, bench, &mut failed_runs) {
            Ok(estimate) => Ok(estimate),
            Err(Abort::Failed(reason)) => Ok(Estimate::failed(
                &bench.name,
                host.label(),
                self.name(),
                reason,
                failed_runs,
            )),
            Err(Abort::Client(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::Recommendation;
    use crate::sampler::tests::{LinearHost, entry};
    use std::time::Duration;

    fn params() -> SamplerParams {
        SamplerParams {
            trials: 50,
            calibration: Duration::from_millis(1),
            seed: Some(7),
            ..SamplerParams::default()
        }
    }

    #[test]
    fn test_schedule_stays_in_range() {
        let mut host = LinearHost::new(100, 10);
        let estimate = RegressionStrategy::new(params())
            .estimate(&mut host, &entry())
            .unwrap();

        let Some(EstimateDetail::Regression {
            calibrated_iterations,
            ..
        }) = estimate.detail
        else {
            panic!("missing regression detail");
        };
        let trial_runs = &host.runs[host.runs.len() - 50..];
        for &n in trial_runs {
            assert!(n >= calibrated_iterations / 1000 + 1);
            assert!(n <= calibrated_iterations);
        }
        assert_eq!(estimate.trials.len(), 50);
        assert_eq!(estimate.trials[49].trial, 50);
    }

    #[test]
    fn test_total_time_fit_recovers_cost_and_overhead() {
        let mut host = LinearHost::new(100, 10);
        let estimate = RegressionStrategy::new(params())
            .estimate(&mut host, &entry())
            .unwrap();

        assert!((estimate.per_op_ns - 10.0).abs() < 1e-6);
        assert!((estimate.overhead_ns - 100.0).abs() < 1e-3);
        assert!(matches!(
            estimate.recommendation,
            Recommendation::Reliable { iterations: 1000, .. }
        ));

        let Some(EstimateDetail::Regression { fit, total_fit, .. }) = estimate.detail else {
            panic!("missing regression detail");
        };
        // ns/op = 10 + 100/n falls with n.
        assert!(fit.unwrap().slope <= 0.0);
        assert!((total_fit.unwrap().r_squared - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let mut a = LinearHost::new(100, 10);
        let mut b = LinearHost::new(100, 10);
        let strategy = RegressionStrategy::new(params());
        strategy.estimate(&mut a, &entry()).unwrap();
        strategy.estimate(&mut b, &entry()).unwrap();
        assert_eq!(a.runs, b.runs);
    }

    #[test]
    fn test_failed_calibration_fails_estimate() {
        let mut host = LinearHost::new(100, 10);
        host.fail_when = Some(1);
        let estimate = RegressionStrategy::new(params())
            .estimate(&mut host, &entry())
            .unwrap();
        assert!(estimate.is_failed());
        assert_eq!(estimate.failure.as_deref(), Some("boom"));
        assert!(estimate.per_op_ns.is_nan());
    }
}
