mod cli;
mod context;

use clap::Parser;
use eyre::{bail, Result};
use gatesync_core::orchestrator::{RootState, TaskReport};
use gatesync_core::probe::PingProbe;
use gatesync_core::session::SshConnector;
use gatesync_core::transfer::RsyncTool;
use gatesync_core::{RunSummary, SyncOrchestrator, TaskOutcome};
use std::sync::Arc;

use crate::cli::Cli;
use crate::context::AppContext;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let ctx = AppContext::load(&cli)?;
    init_logging(ctx.debug);
    log::debug!("loaded configuration from {}", ctx.config_path.display());

    let tool = match RsyncTool::locate() {
        Ok(tool) => tool,
        Err(err) if ctx.options.dry_run => {
            log::warn!("{err:#}; continuing since nothing will be transferred");
            RsyncTool::with_program("rsync")
        }
        Err(err) => return Err(err),
    };
    log::debug!("using {}", tool.program().display());

    let orchestrator = SyncOrchestrator::new(
        ctx.config,
        ctx.options,
        Arc::new(PingProbe::default()),
        Arc::new(SshConnector::new()),
        Box::new(tool),
    );
    let summary = orchestrator.run()?;
    print_summary(&summary);

    if summary.failed() > 0 {
        bail!("{} directory transfer(s) failed", summary.failed());
    }
    Ok(())
}

fn init_logging(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    // RUST_LOG, when set, refines the level chosen above.
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{}{} via {}",
        if summary.dry_run { "[dry run] " } else { "" },
        summary.direction,
        summary.hostname
    );
    if summary.root_state == RootState::Missing {
        println!("  destination root does not exist yet and would be created");
    }
    for report in &summary.reports {
        println!("  {}", describe(report));
    }
    println!(
        "{} synced, {} skipped, {} failed",
        summary.transferred(),
        summary.skipped(),
        summary.failed()
    );
}

fn describe(report: &TaskReport) -> String {
    let directory = report.task.directory.display();
    match &report.outcome {
        TaskOutcome::Transferred => format!("{directory}: synced"),
        TaskOutcome::Previewed => format!("{directory}: would run {}", report.command_line),
        TaskOutcome::Skipped { verdict } => format!(
            "{directory}: skipped, remote copy is {}M but at least {}M is required",
            verdict.actual_mib(),
            verdict.required_mib()
        ),
        TaskOutcome::Blocked { reason } => format!("{directory}: not attempted ({reason})"),
        TaskOutcome::Failed { reason } => format!("{directory}: failed ({reason})"),
    }
}
