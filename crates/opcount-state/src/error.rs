use std::collections::TryReserveError;

use thiserror::Error;

use crate::ThreadId;

/// Runtime state errors.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to allocate counter block for thread {thread}")]
    CounterAllocation {
        thread: ThreadId,
        #[source]
        source: TryReserveError,
    },

    #[error("thread {0} registered twice")]
    DuplicateThread(ThreadId),
}
