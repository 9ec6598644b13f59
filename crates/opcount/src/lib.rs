//! Dynamic counter of 64-bit integer arithmetic.
//!
//! The engine observes retired instructions and tallies, per bucket, how
//! many scalar and packed 64-bit add/sub/mul/div operations ran inside a
//! configurable region of the program.
//!
//! # Example
//!
//! ```
//! use opcount::{Profiler, ProfilerConfig, dispatch};
//! use opcount_isa::{Access, InstrDescriptor, OpcodeFamily, Reg, SummaryFamily};
//! use opcount_state::ThreadId;
//!
//! let profiler = Profiler::new(ProfilerConfig::new());
//! let add = InstrDescriptor::new(OpcodeFamily::Add, 0x1000)
//!     .with_reg(Reg::gpr(0), Access::ReadWrite)
//!     .with_reg(Reg::gpr(3), Access::Read);
//! let analyses = profiler.instrument_instruction(&add);
//!
//! let mut thread = profiler.register_thread(ThreadId(0)).unwrap();
//! dispatch::run_all(&mut thread, &analyses, None);
//! drop(thread);
//!
//! let report = profiler.finalize();
//! assert_eq!(report.family_total(SummaryFamily::Add), 1);
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
mod error;
pub mod host;
pub mod metrics;
pub mod replay;
pub mod report;

pub use config::{AddressGate, ProfilerConfig, RegionMode, ReportStyle};
pub use engine::{Analysis, Diagnostic, Profiler, RoutineHooks};
pub use error::{Error, Result};
pub use host::{Routine, RoutineTable, SymbolResolver};
pub use replay::{ReplayMode, Trace, replay};
pub use report::Report;
