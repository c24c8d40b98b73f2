//! `stationctl repair`: re-run the idempotent setup steps.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::output::human::HumanRenderer;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Run `stationctl repair`.
///
/// # Errors
///
/// Returns an error if the instance is not running or a step fails.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let config = app.load_config()?;
    let infra = app.infra(&config).await?;
    let reporter = TerminalReporter::new(&app.output);
    let report = app.lifecycle(&config, &infra, &reporter).repair().await?;
    drop(reporter);
    if app.is_json() {
        json::print(&report)?;
    } else {
        HumanRenderer::new(&app.output).render_bootstrap(&report);
    }
    Ok(ExitCode::SUCCESS)
}
