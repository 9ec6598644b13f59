//! Runtime state for the counting engine.
//!
//! - [`CounterBlock`]: one thread's counters, cache-line aligned.
//! - [`RegionGate`]: one thread's region activation state.
//! - [`ThreadState`]: the two together, owned by the observed thread.
//! - [`Registry`]: every thread's block, summed at shutdown.

mod counters;
mod error;
mod region;
mod registry;
mod thread;

pub use counters::{CACHE_LINE_SIZE, CounterBlock, CounterTotals};
pub use error::StateError;
pub use region::{GateKind, RegionAction, RegionGate};
pub use registry::{Aggregate, Registry};
pub use thread::{ThreadId, ThreadState};
