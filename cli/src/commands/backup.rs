//! `stationctl backup`, `stationctl snapshots`, `stationctl snapshot-delete`.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::domain::SnapshotId;
use crate::output::human::HumanRenderer;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Arguments for the backup command.
#[derive(Args)]
pub struct BackupArgs {
    /// Free-form note stored with the snapshot
    #[arg(short, long)]
    pub description: Option<String>,
}

/// Arguments for the snapshot-delete command.
#[derive(Args)]
pub struct SnapshotDeleteArgs {
    /// Snapshot name, as listed by `stationctl snapshots`
    pub snapshot: String,
}

/// Snapshot the data volume.
///
/// # Errors
///
/// Returns an error if no data volume is known or snapshotting fails.
pub async fn backup(app: &AppContext, args: &BackupArgs) -> Result<ExitCode> {
    let config = app.load_config()?;
    let infra = app.infra(&config).await?;
    let reporter = TerminalReporter::new(&app.output);
    let snapshot = app
        .lifecycle(&config, &infra, &reporter)
        .backup(args.description.as_deref())
        .await?;
    if app.is_json() {
        json::print(&snapshot)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// List backups, newest first.
///
/// # Errors
///
/// Returns an error if the platform cannot be queried.
pub async fn list(app: &AppContext) -> Result<ExitCode> {
    let config = app.load_config()?;
    let infra = app.infra(&config).await?;
    let reporter = TerminalReporter::new(&app.output);
    let snapshots = app.lifecycle(&config, &infra, &reporter).snapshots().await?;
    if app.is_json() {
        json::print(&snapshots)?;
    } else {
        HumanRenderer::new(&app.output).render_snapshots(&snapshots);
    }
    Ok(ExitCode::SUCCESS)
}

/// Delete one backup after confirmation.
///
/// # Errors
///
/// Returns an error if the deletion fails.
pub async fn delete(app: &AppContext, args: &SnapshotDeleteArgs) -> Result<ExitCode> {
    if !app.confirm_destructive(&format!("Delete backup {}?", args.snapshot))? {
        app.output.info("Cancelled.");
        return Ok(ExitCode::SUCCESS);
    }
    let config = app.load_config()?;
    let infra = app.infra(&config).await?;
    let reporter = TerminalReporter::new(&app.output);
    let id = SnapshotId(args.snapshot.clone());
    app.lifecycle(&config, &infra, &reporter)
        .delete_snapshot(&id)
        .await?;
    if app.is_json() {
        json::print(&serde_json::json!({ "deleted": id }))?;
    }
    Ok(ExitCode::SUCCESS)
}
