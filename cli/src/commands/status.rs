//! `stationctl status`: reconcile and show the workstation state.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::output::human::HumanRenderer;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Run `stationctl status`.
///
/// # Errors
///
/// Returns an error if the platform cannot be queried.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let config = app.load_config()?;
    let infra = app.infra(&config).await?;
    let reporter = TerminalReporter::new(&app.output);
    let status = app.lifecycle(&config, &infra, &reporter).status().await?;
    if app.is_json() {
        json::print(&status)?;
    } else {
        HumanRenderer::new(&app.output).render_status(&status);
    }
    Ok(ExitCode::SUCCESS)
}
