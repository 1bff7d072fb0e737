use super::{
    Abort, Estimate, EstimateDetail, SamplerParams, Strategy, TrialSnapshot, recommend, run_at,
};
use crate::client::{ClientError, HostClient};
use rodbench_ipc::BenchmarkEntry;
use rodbench_stats::MomentAccumulator;
use tracing::{debug, warn};

/// Sample total run time at 1 and `h` iterations.
///
/// With `t(n) = overhead + n * cost`, the per-op cost is
/// `(mean(t(h)) - mean(t(1))) / (h - 1)` and the overhead is what remains of
/// `mean(t(1))`.
#[derive(Debug, Clone)]
pub struct TwoPointStrategy {
    params: SamplerParams,
}

impl TwoPointStrategy {
    /// Strategy with the given settings; probes below 2 are raised to 2
    pub fn new(params: SamplerParams) -> Self {
        Self { params }
    }

    fn probe(&self) -> u64 {
        self.params.probe.max(2)
    }

    /// `trials` runs at `n`; failures are counted and skipped.
    fn collect(
        &self,
        host: &mut dyn HostClient,
        bench: &BenchmarkEntry,
        n: u64,
        failed_runs: &mut u64,
        trials: &mut Vec<TrialSnapshot>,
    ) -> Result<MomentAccumulator, Abort> {
        let mut moments = MomentAccumulator::new();
        let mut last_failure = None;
        for _ in 0..self.params.trials {
            let outcome = run_at(host, bench, n)?;
            if outcome.failed {
                *failed_runs += 1;
                warn!(benchmark = %bench.name, iterations = n, "run failed, discarding sample");
                last_failure = outcome.failure;
                continue;
            }
            moments.update(outcome.elapsed_ns as f64);
            trials.push(TrialSnapshot::capture(trials.len() + 1, n, &moments));
        }
        if moments.count() == 0 {
            return Err(Abort::Failed(last_failure.unwrap_or_else(|| {
                format!("every run at {} iterations failed", n)
            })));
        }
        Ok(moments)
    }

    fn sample(
        &self,
        host: &mut dyn HostClient,
        bench: &BenchmarkEntry,
        failed_runs: &mut u64,
    ) -> Result<Estimate, Abort> {
        let h = self.probe();
        let mut trials = Vec::with_capacity(self.params.trials * 2);
        let single = self.collect(host, bench, 1, failed_runs, &mut trials)?;
        let probed = self.collect(host, bench, h, failed_runs, &mut trials)?;

        let per_op_ns = (probed.mean() - single.mean()) / (h - 1) as f64;
        let overhead_ns = single.mean() - per_op_ns;
        debug!(benchmark = %bench.name, h, per_op_ns, overhead_ns, "two-point estimate");

        Ok(Estimate {
            benchmark: bench.name.clone(),
            host: host.label().to_string(),
            strategy: self.name().to_string(),
            per_op_ns,
            overhead_ns,
            recommendation: recommend(overhead_ns, per_op_ns, self.params.target),
            detail: Some(EstimateDetail::TwoPoint {
                probe: h,
                single: single.snapshot(),
                probed: probed.snapshot(),
            }),
            trials,
            failed_runs: *failed_runs,
            failure: None,
        })
    }
}

impl Strategy for TwoPointStrategy {
    fn name(&self) -> &'static str {
        "two-point"
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
