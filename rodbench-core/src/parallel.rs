//! Parallel fan-out: run N iterations across P workers, then barrier-join.

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

/// Build a pool with exactly `workers` threads.
pub fn build_pool(workers: usize) -> Result<ThreadPool, ThreadPoolBuildError> {
    ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("rodbench-worker-{}", i))
        .build()
}

/// Iterations assigned to worker `index` of `workers` when splitting `total`.
/// Shares differ by at most one and sum to `total`.
pub fn share(total: u64, workers: usize, index: usize) -> u64 {
    let workers = workers.max(1) as u64;
    let index = index as u64;
    total / workers + u64::from(index < total % workers)
}

/// Run `body(share)` once on every pool thread and return when all are done.
///
/// A panic in any worker is resumed on the calling thread after the join.
pub fn fan_out<F>(pool: &ThreadPool, iterations: u64, body: F)
where
    F: Fn(u64) + Sync,
{
    pool.broadcast(|ctx| body(share(iterations, ctx.num_threads(), ctx.index())));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_shares_sum_to_total() {
        for total in [0u64, 1, 7, 100, 1001] {
            for workers in 1..=9 {
                let sum: u64 = (0..workers).map(|i| share(total, workers, i)).sum();
                assert_eq!(sum, total, "total={} workers={}", total, workers);
                let max = (0..workers).map(|i| share(total, workers, i)).max().unwrap();
                let min = (0..workers).map(|i| share(total, workers, i)).min().unwrap();
                assert!(max - min <= 1);
            }
        }
    }

    #[test]
    fn test_fan_out_runs_every_iteration() {
        let pool = build_pool(4).unwrap();
        let count = AtomicU64::new(0);
        fan_out(&pool, 1003, |n| {
            for _ in 0..n {
                count.fetch_add(1, Ordering::Relaxed);
            }
        });
        assert_eq!(count.load(Ordering::Relaxed), 1003);
    }

    #[test]
    fn test_fan_out_propagates_panic() {
        let pool = build_pool(2).unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            fan_out(&pool, 10, |_| panic!("worker failed"));
        }));
        assert!(result.is_err());
    }
}
