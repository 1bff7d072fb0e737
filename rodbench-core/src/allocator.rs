//! Allocation Counting
//!
//! A `GlobalAlloc` wrapper over the system allocator. Counters are
//! process-wide so allocations made by parallel workers are included.
//! Host binaries opt in with:
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOC: rodbench::TrackingAllocator = rodbench::TrackingAllocator;
//! ```

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicU64, Ordering};

static ALLOC_COUNT: AtomicU64 = AtomicU64::new(0);
static ALLOC_BYTES: AtomicU64 = AtomicU64::new(0);

/// Global allocator that counts allocations and allocated bytes.
pub struct TrackingAllocator;

impl TrackingAllocator {
    #[inline(always)]
    fn record(size: usize) {
        ALLOC_COUNT.fetch_add(1, Ordering::Relaxed);
        ALLOC_BYTES.fetch_add(size as u64, Ordering::Relaxed);
    }
}

// SAFETY: every call forwards to `System` with the caller's layout; counting
// touches only atomics and never allocates.
unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        Self::record(layout.size());
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        Self::record(layout.size());
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }

    // A reallocation is a fresh allocation of the new size.
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        Self::record(new_size);
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

/// Cumulative allocation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationTotals {
    /// Number of allocations
    pub count: u64,
    /// Bytes allocated
    pub bytes: u64,
}

impl AllocationTotals {
    /// Counters accumulated since `earlier`
    pub fn since(self, earlier: AllocationTotals) -> AllocationTotals {
        AllocationTotals {
            count: self.count.saturating_sub(earlier.count),
            bytes: self.bytes.saturating_sub(earlier.bytes),
        }
    }

    /// Component-wise sum
    pub fn add(self, other: AllocationTotals) -> AllocationTotals {
        AllocationTotals {
            count: self.count + other.count,
            bytes: self.bytes + other.bytes,
        }
    }
}

/// Read the process-wide counters. Always zero unless [`TrackingAllocator`]
/// is installed as the global allocator.
#[inline]
pub fn allocation_totals() -> AllocationTotals {
    AllocationTotals {
        count: ALLOC_COUNT.load(Ordering::Relaxed),
        bytes: ALLOC_BYTES.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since_saturates() {
        let later = AllocationTotals { count: 5, bytes: 100 };
        let earlier = AllocationTotals { count: 2, bytes: 40 };
        assert_eq!(later.since(earlier), AllocationTotals { count: 3, bytes: 60 });
        assert_eq!(earlier.since(later), AllocationTotals::default());
    }

    #[test]
    fn test_direct_calls_are_counted() {
        let before = allocation_totals();
        let layout = Layout::from_size_align(64, 8).unwrap();
        unsafe {
            let ptr = TrackingAllocator.alloc(layout);
            assert!(!ptr.is_null());
            let ptr = TrackingAllocator.realloc(ptr, layout, 128);
            assert!(!ptr.is_null());
            TrackingAllocator.dealloc(ptr, Layout::from_size_align(128, 8).unwrap());
        }
        // Not installed as the global allocator here, so only these calls count.
        let delta = allocation_totals().since(before);
        assert_eq!(delta, AllocationTotals { count: 2, bytes: 192 });
    }
}
