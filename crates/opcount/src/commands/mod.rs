//! Command implementations.

mod classify;
mod run;

use crate::cli::{Cli, Commands, report_style};

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Run { .. } => handle_run(cli),
        Commands::Classify { hex, addr, policy } => {
            classify::cmd_classify(hex, addr, (*policy).into())
        }
        Commands::Buckets => classify::cmd_buckets(),
    }
}

fn handle_run(cli: &Cli) -> i32 {
    let Commands::Run {
        trace,
        addr,
        start,
        stop,
        gate,
        detailed,
        policy,
        serial,
    } = &cli.command
    else {
        unreachable!("run command variant mismatch");
    };

    run::cmd_run(&run::RunArgs {
        trace,
        addr: addr.as_deref(),
        start: start.as_deref(),
        stop: stop.as_deref(),
        gate: (*gate).into(),
        report: report_style(*detailed),
        policy: (*policy).into(),
        serial: *serial,
        quiet: cli.silent,
    })
}
