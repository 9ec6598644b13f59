//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use opcount::{AddressGate, ReportStyle};
use opcount_isa::ClassifyPolicy;

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "opcount")]
#[command(about = "Count 64-bit integer arithmetic in an execution trace")]
#[command(version)]
pub struct Cli {
    /// Show metrics summary after execution
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Replay a trace and report counts
    Run {
        /// Trace file (`.zst` for compressed)
        #[arg(value_name = "TRACE")]
        trace: PathBuf,

        /// Start counting at this address (0 = whole program)
        #[arg(long, value_name = "ADDR")]
        addr: Option<String>,

        /// Routine whose entry starts counting (overrides --addr)
        #[arg(long, value_name = "NAME")]
        start: Option<String>,

        /// Routine whose return stops counting (derived from --start if absent)
        #[arg(long, value_name = "NAME", requires = "start")]
        stop: Option<String>,

        /// How an --addr region closes
        #[arg(long, value_enum, default_value = "depth")]
        gate: GateArg,

        /// Report every bucket instead of four family totals
        #[arg(short, long)]
        detailed: bool,

        #[command(flatten)]
        policy: PolicyArgs,

        /// Replay all threads on one worker, in trace order
        #[arg(long)]
        serial: bool,
    },

    /// Classify one hex-encoded x86-64 instruction
    Classify {
        /// Instruction bytes, e.g. "4801d8"
        #[arg(value_name = "HEX")]
        hex: String,

        /// Address the instruction is located at
        #[arg(long, default_value = "0")]
        addr: String,

        #[command(flatten)]
        policy: PolicyArgs,
    },

    /// List counting buckets
    Buckets,
}

/// Classification policy switches.
#[derive(Args, Clone, Copy, Debug, Default)]
pub struct PolicyArgs {
    /// Count instructions with an immediate operand
    #[arg(long)]
    pub keep_immediates: bool,

    /// Count instructions touching the stack
    #[arg(long)]
    pub keep_stack: bool,

    /// Do not count read-modify-write to memory as reg/mem
    #[arg(long)]
    pub no_rmw: bool,

    /// Count excluded immediate forms in a separate bucket
    #[arg(long)]
    pub imm_sanity: bool,
}

impl From<PolicyArgs> for ClassifyPolicy {
    fn from(args: PolicyArgs) -> Self {
        Self::default()
            .with_exclude_immediates(!args.keep_immediates)
            .with_exclude_stack(!args.keep_stack)
            .with_mem_dest_rmw(!args.no_rmw)
            .with_immediate_sanity(args.imm_sanity)
    }
}

/// How an address region closes.
#[derive(Clone, Copy, Debug, ValueEnum, Default)]
pub enum GateArg {
    /// Active while the routine holding the address is on the call stack
    #[default]
    Depth,
    /// Active from the address until the next return (legacy)
    FirstReturn,
}

impl From<GateArg> for AddressGate {
    fn from(arg: GateArg) -> Self {
        match arg {
            GateArg::Depth => Self::Depth,
            GateArg::FirstReturn => Self::FirstReturn,
        }
    }
}

/// Map the `--detailed` flag to a report style.
pub const fn report_style(detailed: bool) -> ReportStyle {
    if detailed {
        ReportStyle::Verbose
    } else {
        ReportStyle::Compact
    }
}
