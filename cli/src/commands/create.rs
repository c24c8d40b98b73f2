//! `stationctl create [--fresh]`: build the workstation end to end.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::output::human::HumanRenderer;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Arguments for the create command.
#[derive(Args)]
pub struct CreateArgs {
    /// Start from an empty data volume instead of a snapshot of `source.disk`
    #[arg(long)]
    pub fresh: bool,
}

/// Run `stationctl create`.
///
/// # Errors
///
/// Returns a `PipelineError` naming the failed stage. Snapshots and volumes
/// created before the failure are kept.
pub async fn run(app: &AppContext, args: &CreateArgs) -> Result<ExitCode> {
    let config = app.load_config()?;
    let infra = app.infra(&config).await?;

    let reporter = TerminalReporter::new(&app.output);
    let report = app
        .lifecycle(&config, &infra, &reporter)
        .create(args.fresh)
        .await?;
    drop(reporter);

    if app.is_json() {
        json::print(&report)?;
    } else {
        HumanRenderer::new(&app.output).render_create(&report);
    }
    Ok(ExitCode::SUCCESS)
}
