//! Instruction model and classifier for 64-bit integer arithmetic counting.
//!
//! - [`InstrDescriptor`]: static facts about one instruction.
//! - [`Bucket`]: the fixed set of counting categories.
//! - [`classify`]: descriptor to at most one bucket, as a [`Probe`].
//! - [`decode`]: descriptors from raw x86-64 bytes (feature `x86`).

mod bucket;
mod classify;
#[cfg(feature = "x86")]
pub mod decode;
mod types;

pub use bucket::*;
pub use classify::*;
pub use types::*;
