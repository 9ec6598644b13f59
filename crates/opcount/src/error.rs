use thiserror::Error;

use opcount_isa::decode::DecodeError;
use opcount_state::{StateError, ThreadId};

/// Profiler errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    #[error("trace line {line}: {message}")]
    Trace { line: usize, message: String },
    #[error("trace line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: DecodeError,
    },
    #[error("thread {tid} executed unknown instruction at {address:#x}")]
    UnknownInstruction { tid: ThreadId, address: u64 },
    #[error("thread {tid} entered or left unknown routine at {address:#x}")]
    UnknownRoutine { tid: ThreadId, address: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
