//! Run command.

use std::path::Path;
use std::time::Instant;

use tracing::{error, info};

use opcount::{
    AddressGate, Profiler, ProfilerConfig, RegionMode, ReplayMode, ReportStyle, Trace, replay,
};
use opcount_isa::ClassifyPolicy;

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal::{self, Spinner};

/// Resolved arguments of the `run` command.
pub struct RunArgs<'a> {
    pub trace: &'a Path,
    pub addr: Option<&'a str>,
    pub start: Option<&'a str>,
    pub stop: Option<&'a str>,
    pub gate: AddressGate,
    pub report: ReportStyle,
    pub policy: ClassifyPolicy,
    pub serial: bool,
    pub quiet: bool,
}

/// Handle the `run` command.
pub fn cmd_run(args: &RunArgs<'_>) -> i32 {
    let region = match RegionMode::from_knobs(args.addr, args.start, args.stop, args.gate) {
        Ok(region) => region,
        Err(e) => {
            error!(error = %e, "invalid region");
            return EXIT_FAILURE;
        }
    };
    let config = ProfilerConfig::new()
        .with_region(region)
        .with_policy(args.policy)
        .with_report(args.report);

    let spinner = (!args.quiet).then(|| Spinner::new(format!("Loading {}", args.trace.display())));
    let trace = match Trace::load(args.trace) {
        Ok(trace) => trace,
        Err(e) => {
            if let Some(spinner) = &spinner {
                spinner.finish_with_failure("Failed to load trace");
            }
            error!(error = %e, path = %args.trace.display(), "failed to load trace");
            return EXIT_FAILURE;
        }
    };
    if let Some(spinner) = &spinner {
        spinner.set_message(format!("Replaying {} events", trace.events().len()));
    }

    let mode = if args.serial {
        ReplayMode::Serial
    } else {
        ReplayMode::Parallel
    };
    let started = Instant::now();
    let report = match replay(Profiler::new(config), &trace, mode) {
        Ok(report) => report,
        Err(e) => {
            if let Some(spinner) = &spinner {
                spinner.finish_with_failure("Replay failed");
            }
            error!(error = %e, "replay failed");
            return EXIT_FAILURE;
        }
    };
    let elapsed = started.elapsed().as_secs_f64();
    if let Some(spinner) = &spinner {
        spinner.finish_with_success(&format!("Replayed in {elapsed:.3}s"));
    }
    info!(threads = report.threads, secs = elapsed, "counted");

    for diagnostic in &report.diagnostics {
        terminal::warning(&diagnostic.to_string());
    }

    opcount::metrics::record_report(&report);
    opcount::metrics::record_replay_time(elapsed);

    print!("{report}");
    EXIT_SUCCESS
}
