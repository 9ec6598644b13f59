//! Per-thread counter block and aggregated totals.
//!
//! A `CounterBlock` is written by exactly one thread. Counters are atomics
//! only so the block can be shared with the registry; increments are a
//! relaxed load followed by a relaxed store, which compiles to a plain add
//! on x86-64. No read-modify-write atomics on the hot path.
//!
//! The block is aligned to 64 bytes so two threads' blocks never share a
//! cache line.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use opcount_isa::{Bucket, NUM_BUCKETS, NUM_SIMD_BUCKETS, SummaryFamily};

/// Cache line size assumed for padding.
pub const CACHE_LINE_SIZE: usize = 64;

/// One thread's counters, indexed by [`Bucket::index`].
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct CounterBlock {
    /// Instruction counts per bucket.
    counts: [AtomicU64; NUM_BUCKETS],
    /// Lane-op counts per SIMD bucket, indexed by [`Bucket::lane_index`].
    lane_ops: [AtomicU64; NUM_SIMD_BUCKETS],
}

#[inline(always)]
fn bump(counter: &AtomicU64, n: u64) {
    // Single writer: load/store is enough and avoids a locked add.
    let value = counter.load(Ordering::Relaxed);
    counter.store(value.wrapping_add(n), Ordering::Relaxed);
}

impl CounterBlock {
    /// Create a zeroed block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one instruction in `bucket`.
    #[inline(always)]
    pub fn add(&self, bucket: Bucket) {
        bump(&self.counts[bucket.index()], 1);
    }

    /// Count one instruction in a SIMD bucket plus `lanes` lane-ops.
    #[inline(always)]
    pub fn add_lanes(&self, bucket: Bucket, lanes: u32) {
        bump(&self.counts[bucket.index()], 1);
        if let Some(i) = bucket.lane_index() {
            bump(&self.lane_ops[i], u64::from(lanes));
        }
    }

    /// Current instruction count for `bucket`.
    #[must_use]
    pub fn count(&self, bucket: Bucket) -> u64 {
        self.counts[bucket.index()].load(Ordering::Relaxed)
    }

    /// Current lane-op count for a SIMD bucket (0 for others).
    #[must_use]
    pub fn lane_ops(&self, bucket: Bucket) -> u64 {
        bucket
            .lane_index()
            .map_or(0, |i| self.lane_ops[i].load(Ordering::Relaxed))
    }

    /// Copy the block into plain totals.
    #[must_use]
    pub fn snapshot(&self) -> CounterTotals {
        let mut totals = CounterTotals::default();
        totals.merge_block(self);
        totals
    }
}

/// Summed counters across threads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterTotals {
    pub counts: [u64; NUM_BUCKETS],
    pub lane_ops: [u64; NUM_SIMD_BUCKETS],
}

impl CounterTotals {
    /// Add one block's counters.
    pub fn merge_block(&mut self, block: &CounterBlock) {
        for (total, counter) in self.counts.iter_mut().zip(&block.counts) {
            *total = total.wrapping_add(counter.load(Ordering::Relaxed));
        }
        for (total, counter) in self.lane_ops.iter_mut().zip(&block.lane_ops) {
            *total = total.wrapping_add(counter.load(Ordering::Relaxed));
        }
    }

    /// Add another set of totals.
    pub fn merge(&mut self, other: &Self) {
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a = a.wrapping_add(*b);
        }
        for (a, b) in self.lane_ops.iter_mut().zip(&other.lane_ops) {
            *a = a.wrapping_add(*b);
        }
    }

    #[must_use]
    pub const fn count(&self, bucket: Bucket) -> u64 {
        self.counts[bucket.index()]
    }

    #[must_use]
    pub fn lane_ops(&self, bucket: Bucket) -> u64 {
        bucket.lane_index().map_or(0, |i| self.lane_ops[i])
    }

    /// Total of a compact-report family across both localities.
    #[must_use]
    pub fn family_total(&self, family: SummaryFamily) -> u64 {
        Bucket::all()
            .filter_map(|bucket| match bucket {
                Bucket::Scalar { family: f, .. } if f.summary() == family => {
                    Some(self.count(bucket))
                }
                _ => None,
            })
            .fold(0u64, u64::wrapping_add)
    }

    /// True if every counter is zero.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.iter().chain(&self.lane_ops).all(|&c| c == 0)
    }
}

impl fmt::Display for CounterTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bucket in Bucket::all() {
            let count = self.count(bucket);
            if count > 0 {
                writeln!(f, "{bucket}: {count}")?;
            }
        }
        Ok(())
    }
}
