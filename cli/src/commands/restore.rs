//! `stationctl restore SNAPSHOT`: swap in a data volume restored from a backup.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::domain::SnapshotId;
use crate::output::human::HumanRenderer;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Arguments for the restore command.
#[derive(Args)]
pub struct RestoreArgs {
    /// Snapshot name, as listed by `stationctl snapshots`
    pub snapshot: String,
}

/// Run `stationctl restore`.
///
/// # Errors
///
/// Returns an error if the volume cannot be created or swapped.
pub async fn run(app: &AppContext, args: &RestoreArgs) -> Result<ExitCode> {
    if !app.output.quiet {
        println!();
        println!("The workstation will be stopped and its data volume replaced.");
        println!("The current data volume is detached and kept.");
        println!();
    }
    if !app.confirm_destructive("Continue?")? {
        app.output.info("Cancelled.");
        return Ok(ExitCode::SUCCESS);
    }
    let config = app.load_config()?;
    let infra = app.infra(&config).await?;
    let reporter = TerminalReporter::new(&app.output);
    let report = app
        .lifecycle(&config, &infra, &reporter)
        .restore(&SnapshotId(args.snapshot.clone()))
        .await?;
    drop(reporter);
    if app.is_json() {
        json::print(&report)?;
    } else {
        HumanRenderer::new(&app.output).render_restore(&report);
    }
    Ok(ExitCode::SUCCESS)
}
