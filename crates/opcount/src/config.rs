//! Profiler configuration.
//!
//! Region selection follows the knob precedence of the command line: a
//! start marker wins, then a non-zero target address, otherwise the whole
//! program is counted. Address `0` is the "disabled" sentinel.

use opcount_isa::ClassifyPolicy;
use opcount_state::GateKind;

use crate::{Error, Result};

/// Stop marker used when the start marker has no recognized prefix.
pub const DEFAULT_STOP_MARKER: &str = "stop_profiling";

/// How an address-triggered region closes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AddressGate {
    /// Bind the routine containing the address; active while it is on the
    /// call stack. Nesting-safe.
    #[default]
    Depth,
    /// Open when the address executes, close on the next return anywhere.
    ///
    /// Known limitation: a nested call that returns first closes the region
    /// early.
    FirstReturn,
}

/// Which part of the execution is counted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RegionMode {
    #[default]
    WholeProgram,
    Address { target: u64, gate: AddressGate },
    Marker { start: String, stop: String },
}

impl RegionMode {
    /// Build from the raw knob values.
    ///
    /// `stop` defaults to [`derive_stop_marker`] of `start`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if `addr` does not parse.
    pub fn from_knobs(
        addr: Option<&str>,
        start: Option<&str>,
        stop: Option<&str>,
        gate: AddressGate,
    ) -> Result<Self> {
        if let Some(start) = start.filter(|s| !s.is_empty()) {
            let stop = stop
                .filter(|s| !s.is_empty())
                .map_or_else(|| derive_stop_marker(start), str::to_string);
            return Ok(Self::Marker {
                start: start.to_string(),
                stop,
            });
        }

        match addr.map(parse_address).transpose()? {
            Some(target) if target != 0 => Ok(Self::Address { target, gate }),
            _ => Ok(Self::WholeProgram),
        }
    }

    /// Gate kind each thread starts with.
    #[must_use]
    pub const fn gate_kind(&self) -> GateKind {
        match self {
            Self::WholeProgram => GateKind::Open,
            Self::Address {
                gate: AddressGate::Depth,
                ..
            } => GateKind::Depth,
            Self::Address {
                gate: AddressGate::FirstReturn,
                ..
            }
            | Self::Marker { .. } => GateKind::Flag,
        }
    }
}

/// Derive the stop marker name from the start marker.
///
/// `start_*` becomes `stop_*`, `begin_*` becomes `end_*`, anything else
/// falls back to [`DEFAULT_STOP_MARKER`].
#[must_use]
pub fn derive_stop_marker(start: &str) -> String {
    if let Some(rest) = start.strip_prefix("start_") {
        format!("stop_{rest}")
    } else if let Some(rest) = start.strip_prefix("begin_") {
        format!("end_{rest}")
    } else {
        DEFAULT_STOP_MARKER.to_string()
    }
}

/// Parse a hex (`0x` prefix) or decimal address.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] if `text` is not a valid number.
pub fn parse_address(text: &str) -> Result<u64> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed.map_err(|_| Error::InvalidAddress(text.to_string()))
}

/// Report layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReportStyle {
    /// Four family totals.
    #[default]
    Compact,
    /// Every bucket, SIMD instruction/lane-op pairs, immediate-sanity count.
    Verbose,
}

/// Complete profiler configuration.
#[derive(Clone, Debug, Default)]
pub struct ProfilerConfig {
    pub region: RegionMode,
    pub policy: ClassifyPolicy,
    pub report: ReportStyle,
}

impl ProfilerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_region(mut self, region: RegionMode) -> Self {
        self.region = region;
        self
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: ClassifyPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn with_report(mut self, report: ReportStyle) -> Self {
        self.report = report;
        self
    }
}
