//! Thread identity and per-thread state.

use std::fmt;
use std::sync::Arc;

use opcount_isa::Bucket;

use crate::{CounterBlock, RegionAction, RegionGate};

/// Thread identity as assigned by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State owned by one observed thread: its counter block and region gate.
///
/// Only the owning thread mutates it. The counter block is shared with the
/// registry, which reads it after the thread has stopped.
#[derive(Debug)]
pub struct ThreadState {
    tid: ThreadId,
    counters: Arc<CounterBlock>,
    gate: RegionGate,
}

impl ThreadState {
    #[must_use]
    pub const fn new(tid: ThreadId, counters: Arc<CounterBlock>, gate: RegionGate) -> Self {
        Self {
            tid,
            counters,
            gate,
        }
    }

    #[must_use]
    pub const fn tid(&self) -> ThreadId {
        self.tid
    }

    #[must_use]
    pub const fn gate(&self) -> RegionGate {
        self.gate
    }

    #[must_use]
    pub fn counters(&self) -> &CounterBlock {
        &self.counters
    }

    #[inline(always)]
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.gate.is_active()
    }

    /// Apply a region transition to this thread's gate.
    pub fn apply(&mut self, action: RegionAction) -> bool {
        let changed = self.gate.apply(action);
        if changed {
            tracing::trace!(
                tid = %self.tid,
                ?action,
                active = self.gate.is_active(),
                "region toggled"
            );
        }
        changed
    }

    #[inline(always)]
    pub fn add(&mut self, bucket: Bucket) {
        self.counters.add(bucket);
    }

    #[inline(always)]
    pub fn add_lanes(&mut self, bucket: Bucket, lanes: u32) {
        self.counters.add_lanes(bucket, lanes);
    }
}
