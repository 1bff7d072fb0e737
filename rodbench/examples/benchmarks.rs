//! rodbench Demo Host
//!
//! A host program registering a handful of benchmarks. Build it, then point
//! the orchestrator at the binary:
//!
//!   cargo build --release --example demo_host
//!   rodbench target/release/examples/demo_host                 # sample everything
//!   rodbench target/release/examples/demo_host -b Sort --list  # list matches
//!   target/release/examples/demo_host --rod-listen 127.0.0.1:7878
//!   rodbench tcp://127.0.0.1:7878 --strategy regression

use rodbench::{Bencher, TrackingAllocator, benchmark};
use std::collections::HashMap;
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;

// ============================================================================
// Basic Benchmarks
// ============================================================================

fn addition(b: &mut Bencher) {
    let x = 42u64;
    let y = 17u64;
    b.iter(|| black_box(black_box(x) + black_box(y)));
}

fn vector_sum(b: &mut Bencher) {
    let data: Vec<i64> = (0..1000).collect();
    b.iter(|| black_box(data.iter().sum::<i64>()));
}

benchmark!("BenchmarkAddition", addition);
benchmark!("BenchmarkVectorSum", vector_sum);

// ============================================================================
// Setup Excluded From Timing
// ============================================================================

fn sort_small(b: &mut Bencher) {
    b.iter_with_setup(
        || (0..100u32).rev().collect::<Vec<_>>(),
        |mut data| {
            data.sort();
            data
        },
    );
}

fn hashmap_lookup(b: &mut Bencher) {
    // Built before the timer restarts.
    b.stop_timer();
    let map: HashMap<u64, u64> = (0..10_000).map(|i| (i, i * 2)).collect();
    b.reset_timer();
    b.start_timer();

    let mut key = 0u64;
    for _ in 0..b.iterations() {
        key = (key + 7919) % 10_000;
        black_box(map.get(&key));
    }
}

benchmark!("BenchmarkSortSmall", sort_small);
benchmark!("BenchmarkHashmapLookup", hashmap_lookup);

// ============================================================================
// Throughput And Allocations
// ============================================================================

fn checksum(b: &mut Bencher) {
    let data = vec![0xA5u8; 4096];
    b.set_bytes(data.len() as i64);
    b.iter(|| {
        data.iter()
            .fold(0u32, |acc, &byte| acc.rotate_left(5) ^ byte as u32)
    });
}

fn string_concat(b: &mut Bencher) {
    b.report_allocs();
    b.iter(|| {
        let mut s = String::new();
        for i in 0..10 {
            s.push_str(&i.to_string());
        }
        s
    });
}

benchmark!("BenchmarkChecksum", checksum);
benchmark!("BenchmarkStringConcat", string_concat);

// ============================================================================
// Parallel Fan-Out
// ============================================================================

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn atomic_increment(b: &mut Bencher) {
    // Run as `#idx-4` (or `set parallelism 4`) to spread over four workers.
    b.iter(|| COUNTER.fetch_add(1, Ordering::Relaxed));
}

benchmark!("BenchmarkAtomicIncrement", atomic_increment);

// ============================================================================
// Failures
// ============================================================================

fn explicit_failure(b: &mut Bencher) {
    if b.iterations() > 1_000 {
        b.fail("input too large for this benchmark");
        return;
    }
    b.iter(|| black_box(1));
}

benchmark!("BenchmarkExplicitFailure", explicit_failure);
benchmark!("BenchmarkWillPanic", |b| {
    if b.iterations() > 100 {
        panic!("intentional panic at N={}", b.iterations());
    }
    b.iter(|| black_box(()));
});

fn main() {
    rodbench::host_main();
}
