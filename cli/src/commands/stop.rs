//! `stationctl stop`: power off, keeping every volume.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Run `stationctl stop`.
///
/// # Errors
///
/// Returns an error if the instance is missing or the stop request fails.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let config = app.load_config()?;
    let infra = app.infra(&config).await?;
    let reporter = TerminalReporter::new(&app.output);
    app.lifecycle(&config, &infra, &reporter).stop().await?;
    if app.is_json() {
        json::print(&serde_json::json!({ "name": config.instance.name, "status": "stopped" }))?;
    }
    Ok(ExitCode::SUCCESS)
}
