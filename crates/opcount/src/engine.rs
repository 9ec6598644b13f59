//! The counting engine.
//!
//! [`Profiler`] is the process-wide context. The host drives it through
//! its lifecycle:
//!
//! 1. [`Profiler::resolve`] once at startup, against the program's symbols.
//! 2. [`Profiler::instrument_instruction`] once per static instruction and
//!    [`Profiler::instrument_routine`] once per routine. The returned
//!    analysis is attached to the instruction/routine by the host and run
//!    through [`crate::dispatch`] on every execution.
//! 3. [`Profiler::register_thread`] when a thread is created.
//! 4. [`Profiler::finalize`] after every counting thread has stopped.

use std::fmt;

use tracing::{debug, warn};

use opcount_isa::{InstrDescriptor, Probe, classify};
use opcount_state::{GateKind, RegionAction, RegionGate, Registry, ThreadId, ThreadState};

use crate::config::{AddressGate, ProfilerConfig, RegionMode};
use crate::host::{Routine, SymbolResolver};
use crate::report::Report;
use crate::Result;

/// Non-fatal configuration problem found at startup.
///
/// The affected region never activates; gated buckets report zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// A marker routine is not in the program.
    UnresolvedMarker { name: String },
    /// No routine encloses the depth-form target address.
    UnboundTarget { address: u64 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedMarker { name } => {
                write!(f, "marker routine '{name}' not found; region will never activate")
            }
            Self::UnboundTarget { address } => write!(
                f,
                "no routine encloses target {address:#x}; region will never activate"
            ),
        }
    }
}

/// Work attached to one static instruction, run in order on each execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Analysis {
    Region(RegionAction),
    Count(Probe),
}

/// Region transitions attached to a routine's boundaries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoutineHooks {
    /// Run first on entry.
    pub entry: Option<RegionAction>,
    /// Run last before return.
    pub exit: Option<RegionAction>,
}

impl RoutineHooks {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entry.is_none() && self.exit.is_none()
    }
}

/// Process-wide counting context.
pub struct Profiler {
    config: ProfilerConfig,
    gate: GateKind,
    registry: Registry,
    diagnostics: Vec<Diagnostic>,
}

impl Profiler {
    #[must_use]
    pub fn new(config: ProfilerConfig) -> Self {
        let gate = config.region.gate_kind();
        match &config.region {
            RegionMode::WholeProgram => debug!("counting whole program"),
            RegionMode::Address { target, gate } => {
                debug!(address = format_args!("{target:#x}"), ?gate, "counting from address");
            }
            RegionMode::Marker { start, stop } => {
                debug!(%start, %stop, "counting between markers");
            }
        }
        Self {
            config,
            gate,
            registry: Registry::new(),
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Check the configured region against the program's symbols.
    ///
    /// Unresolved names are recorded as diagnostics, never errors.
    pub fn resolve(&mut self, resolver: &dyn SymbolResolver) {
        match &self.config.region {
            RegionMode::WholeProgram
            | RegionMode::Address {
                gate: AddressGate::FirstReturn,
                ..
            } => {}
            RegionMode::Address {
                target,
                gate: AddressGate::Depth,
            } => match resolver.routine_at(*target) {
                Some(routine) => {
                    debug!(
                        routine = %routine.name,
                        start = format_args!("{:#x}", routine.start),
                        "bound target routine"
                    );
                }
                None => {
                    let diag = Diagnostic::UnboundTarget { address: *target };
                    warn!("{diag}");
                    self.diagnostics.push(diag);
                }
            },
            RegionMode::Marker { start, stop } => {
                for name in [start, stop] {
                    if let Some(address) = resolver.address_of(name) {
                        debug!(
                            marker = %name,
                            address = format_args!("{address:#x}"),
                            "resolved marker"
                        );
                    } else {
                        let diag = Diagnostic::UnresolvedMarker { name: name.clone() };
                        warn!("{diag}");
                        self.diagnostics.push(diag);
                    }
                }
            }
        }
    }

    /// Analysis for one static instruction.
    ///
    /// Region transitions come before the count, so the target instruction
    /// of an address region is itself counted.
    #[must_use]
    pub fn instrument_instruction(&self, desc: &InstrDescriptor) -> Vec<Analysis> {
        let mut analyses = Vec::new();
        if let RegionMode::Address {
            target,
            gate: AddressGate::FirstReturn,
        } = self.config.region
        {
            // A return at the target opens and closes in one step.
            if desc.address == target {
                analyses.push(Analysis::Region(RegionAction::Activate));
            }
            if desc.is_return {
                analyses.push(Analysis::Region(RegionAction::Deactivate));
            }
        }
        if let Some(probe) = classify(desc, &self.config.policy) {
            analyses.push(Analysis::Count(probe));
        }
        analyses
    }

    /// Boundary hooks for one routine.
    #[must_use]
    pub fn instrument_routine(&self, routine: &Routine) -> RoutineHooks {
        match &self.config.region {
            RegionMode::WholeProgram
            | RegionMode::Address {
                gate: AddressGate::FirstReturn,
                ..
            } => RoutineHooks::default(),
            RegionMode::Address {
                target,
                gate: AddressGate::Depth,
            } => {
                if routine.contains(*target) {
                    RoutineHooks {
                        entry: Some(RegionAction::Enter),
                        exit: Some(RegionAction::Exit),
                    }
                } else {
                    RoutineHooks::default()
                }
            }
            RegionMode::Marker { start, stop } => RoutineHooks {
                entry: (routine.name == *start).then_some(RegionAction::Activate),
                exit: (routine.name == *stop).then_some(RegionAction::Deactivate),
            },
        }
    }

    /// Allocate counters and a fresh gate for a new thread.
    ///
    /// Allocation failure is fatal for the run.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::State`] if `tid` is already registered or its
    /// counters cannot be allocated.
    pub fn register_thread(&self, tid: ThreadId) -> Result<ThreadState> {
        let counters = self.registry.register(tid)?;
        debug!(%tid, "thread registered");
        Ok(ThreadState::new(tid, counters, RegionGate::new(self.gate)))
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Sum every thread's counters into a report.
    ///
    /// All [`ThreadState`]s must have been dropped or stopped.
    #[must_use]
    pub fn finalize(self) -> Report {
        let aggregate = self.registry.aggregate();
        debug!(threads = aggregate.threads, "aggregated counters");
        Report {
            threads: aggregate.threads,
            totals: aggregate.totals,
            style: self.config.report,
            immediate_sanity: self.config.policy.immediate_sanity,
            diagnostics: self.diagnostics,
        }
    }
}
