//! Process-wide registry of counter blocks.
//!
//! Blocks are appended under a lock when a thread is created and never
//! removed while the program runs. At shutdown, after every counting thread
//! has stopped, the registry is consumed and its blocks summed.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::{CounterBlock, CounterTotals, StateError, ThreadId};

#[derive(Default)]
struct Entries {
    tids: FxHashSet<ThreadId>,
    blocks: Vec<Arc<CounterBlock>>,
}

/// Registry of every thread's counter block.
#[derive(Default)]
pub struct Registry {
    entries: Mutex<Entries>,
}

/// Result of summing the registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Aggregate {
    pub threads: usize,
    pub totals: CounterTotals,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zeroed block for `tid` and append it.
    ///
    /// # Errors
    ///
    /// Returns an error if `tid` is already registered or the registry
    /// cannot grow.
    pub fn register(&self, tid: ThreadId) -> Result<Arc<CounterBlock>, StateError> {
        let block = Arc::new(CounterBlock::new());

        let mut entries = self.entries.lock();
        if entries.tids.contains(&tid) {
            return Err(StateError::DuplicateThread(tid));
        }
        entries
            .blocks
            .try_reserve(1)
            .map_err(|source| StateError::CounterAllocation { thread: tid, source })?;
        entries.tids.insert(tid);
        entries.blocks.push(Arc::clone(&block));
        drop(entries);

        Ok(block)
    }

    /// Number of registered threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum every block and release the registry's references.
    ///
    /// Must run only after all counting threads have stopped.
    #[must_use]
    pub fn aggregate(self) -> Aggregate {
        let entries = self.entries.into_inner();
        let mut totals = CounterTotals::default();
        for block in &entries.blocks {
            totals.merge_block(block);
        }
        Aggregate {
            threads: entries.blocks.len(),
            totals,
        }
    }
}
