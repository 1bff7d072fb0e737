//! Bencher - The Benchmark Iteration API
//!
//! The handle a benchmark body receives. The host starts the timer right
//! before calling the body and stops it as soon as the body returns; the body
//! executes [`Bencher::iterations`] iterations and may pause the timer around
//! one-time setup.
//!
//! ```ignore
//! fn parse(b: &mut Bencher) {
//!     b.stop_timer();
//!     let input = load_fixture();
//!     b.set_bytes(input.len() as i64);
//!     b.start_timer();
//!     b.iter(|| parse_document(&input));
//! }
//! ```

use crate::allocator::AllocationTotals;
use crate::measure::Stopwatch;
use crate::parallel::{build_pool, fan_out};
use rayon::{ThreadPool, ThreadPoolBuildError};
use std::hint::black_box;
use std::time::Duration;

/// Iteration control and timer handle for one run
pub struct Bencher {
    iterations: u64,
    parallelism: u32,
    stopwatch: Stopwatch,
    pool: Option<ThreadPool>,
    bytes: i64,
    show_allocs: bool,
    failure: Option<String>,
}

/// What a finished run measured
#[derive(Debug, Clone)]
pub(crate) struct Measurement {
    pub elapsed: Duration,
    pub allocations: AllocationTotals,
    pub bytes: i64,
    pub show_allocs: bool,
    pub parallelism: u32,
    pub failure: Option<String>,
}

impl Bencher {
    /// A bencher for `iterations` iterations over `parallelism` workers.
    /// The timer starts stopped.
    pub fn new(iterations: u64, parallelism: u32) -> Self {
        Self {
            iterations,
            parallelism: parallelism.max(1),
            stopwatch: Stopwatch::new(),
            pool: None,
            bytes: 0,
            show_allocs: false,
            failure: None,
        }
    }

    /// Number of iterations the body must execute
    #[inline]
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Worker count `iter` distributes iterations over
    #[inline]
    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    /// Resume timing (and allocation counting)
    #[inline]
    pub fn start_timer(&mut self) {
        self.stopwatch.start();
    }

    /// Pause timing (and allocation counting)
    #[inline]
    pub fn stop_timer(&mut self) {
        self.stopwatch.stop();
    }

    /// Discard time and allocations accumulated so far, without changing
    /// whether the timer is running
    pub fn reset_timer(&mut self) {
        self.stopwatch.reset();
    }

    /// Declare bytes processed per iteration, reported as MB/s
    pub fn set_bytes(&mut self, bytes: i64) {
        self.bytes = bytes;
    }

    /// Report `B/op` and `allocs/op` for this benchmark even when the host
    /// is not configured to
    pub fn report_allocs(&mut self) {
        self.show_allocs = true;
    }

    /// Mark the run failed. The first reason is kept; later `iter` calls do nothing.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.failure.is_none() {
            self.failure = Some(reason.into());
        }
    }

    /// Whether [`Bencher::fail`] was called
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Change the worker count used by later `iter` calls.
    ///
    /// The host reports a warning if the body returns without restoring
    /// the count it was started with.
    pub fn set_parallelism(&mut self, parallelism: u32) {
        self.parallelism = parallelism.max(1);
    }

    /// Run `f` for every iteration, spread across the configured workers.
    #[inline]
    pub fn iter<T, F>(&mut self, f: F)
    where
        F: Fn() -> T + Sync,
    {
        if self.is_failed() {
            return;
        }
        let n = self.iterations;

        if self.parallelism <= 1 {
            for _ in 0..n {
                black_box(f());
            }
            return;
        }

        if let Err(e) = self.ensure_pool() {
            self.fail(format!("cannot start {} workers: {}", self.parallelism, e));
            return;
        }
        if let Some(pool) = &self.pool {
            fan_out(pool, n, |share| {
                for _ in 0..share {
                    black_box(f());
                }
            });
        }
    }

    /// Run `routine` for every iteration, with a fresh input from `setup`
    /// produced while the timer is paused. Always sequential.
    #[inline]
    pub fn iter_with_setup<I, R, S, F>(&mut self, mut setup: S, mut routine: F)
    where
        S: FnMut() -> I,
        F: FnMut(I) -> R,
    {
        if self.is_failed() {
            return;
        }
        let timed = self.stopwatch.is_running();
        for _ in 0..self.iterations {
            self.stopwatch.stop();
            let input = setup();
            if timed {
                self.stopwatch.start();
            }
            black_box(routine(input));
        }
    }

    /// Build (or rebuild) the worker pool for the current parallelism.
    /// Pool construction is never timed.
    pub(crate) fn ensure_pool(&mut self) -> Result<(), ThreadPoolBuildError> {
        let workers = self.parallelism as usize;
        if self
            .pool
            .as_ref()
            .is_some_and(|pool| pool.current_num_threads() == workers)
        {
            return Ok(());
        }

        let timed = self.stopwatch.is_running();
        self.stopwatch.stop();
        self.pool = None;
        let built = build_pool(workers);
        if timed {
            self.stopwatch.start();
        }
        self.pool = Some(built?);
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Measurement {
        self.stopwatch.stop();
        Measurement {
            elapsed: self.stopwatch.elapsed(),
            allocations: self.stopwatch.allocations(),
            bytes: self.bytes,
            show_allocs: self.show_allocs,
            parallelism: self.parallelism,
            failure: self.failure,
        }
    }
}
