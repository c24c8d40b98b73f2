//! `stationctl start`: boot a stopped workstation.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Run `stationctl start`.
///
/// # Errors
///
/// Returns an error if the instance is missing or never accepts sessions.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let config = app.load_config()?;
    let infra = app.infra(&config).await?;
    let reporter = TerminalReporter::new(&app.output);
    let attempts = app.lifecycle(&config, &infra, &reporter).start().await?;
    if app.is_json() {
        json::print(&serde_json::json!({
            "name": config.instance.name,
            "status": "ready",
            "readiness_attempts": attempts,
        }))?;
    }
    Ok(ExitCode::SUCCESS)
}
