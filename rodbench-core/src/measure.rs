//! Timing and Memory Quiescence
//!
//! The stopwatch behind `Bencher::{start,stop,reset}_timer`. It accumulates
//! wall-clock time and allocation deltas only while running, so a benchmark
//! can pause it around setup work inside its own body.

use crate::allocator::{AllocationTotals, allocation_totals};
use std::time::{Duration, Instant};

/// Pausable accumulator of elapsed time and allocations
#[derive(Debug, Default)]
pub struct Stopwatch {
    started: Option<(Instant, AllocationTotals)>,
    elapsed: Duration,
    allocations: AllocationTotals,
}

impl Stopwatch {
    /// A stopped stopwatch with nothing accumulated
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accumulating. No-op while already running.
    #[inline]
    pub fn start(&mut self) {
        if self.started.is_none() {
            let allocs = allocation_totals();
            self.started = Some((Instant::now(), allocs));
        }
    }

    /// Stop accumulating. No-op while stopped.
    #[inline]
    pub fn stop(&mut self) {
        if let Some((since, allocs)) = self.started.take() {
            self.elapsed += since.elapsed();
            self.allocations = self.allocations.add(allocation_totals().since(allocs));
        }
    }

    /// Discard everything accumulated. A running stopwatch keeps running
    /// from this instant.
    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
        self.allocations = AllocationTotals::default();
        if self.started.is_some() {
            self.started = Some((Instant::now(), allocation_totals()));
        }
    }

    /// Whether the stopwatch is running
    pub fn is_running(&self) -> bool {
        self.started.is_some()
    }

    /// Accumulated time, excluding any in-progress interval
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Accumulated allocations, excluding any in-progress interval
    pub fn allocations(&self) -> AllocationTotals {
        self.allocations
    }
}

/// Bring the process to a comparable memory state before a timed run.
///
/// Returns freed heap pages to the OS where the allocator supports it, then
/// fences and yields so prior work settles before the timer starts.
pub fn quiesce() {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    // SAFETY: malloc_trim only walks glibc's own arenas.
    unsafe {
        libc::malloc_trim(0);
    }
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
    std::thread::yield_now();
}
