//! `stationctl logs`: tail a service journal on the workstation.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use station_common::config::MONITOR_UNIT;

use crate::app::AppContext;
use crate::application::ports::RemoteExecutor;
use crate::domain::RemoteError;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Arguments for the logs command.
#[derive(Args)]
pub struct LogsArgs {
    /// systemd unit to read
    #[arg(short, long, default_value = MONITOR_UNIT)]
    pub unit: String,

    /// Number of lines to show
    #[arg(short = 'n', long, default_value_t = 50)]
    pub lines: u32,
}

/// Run `stationctl logs`.
///
/// # Errors
///
/// Returns an error if the instance is not running or journalctl fails.
pub async fn run(app: &AppContext, args: &LogsArgs) -> Result<ExitCode> {
    anyhow::ensure!(
        args.unit
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@')),
        "invalid unit name: {}",
        args.unit
    );
    let config = app.load_config()?;
    let infra = app.infra(&config).await?;
    let reporter = TerminalReporter::new(&app.output);
    let target = app
        .lifecycle(&config, &infra, &reporter)
        .session_target()
        .await?;
    let cmd = format!(
        "sudo journalctl -u {} -n {} --no-pager -o short-iso",
        args.unit, args.lines
    );
    let output = match infra.remote.exec(&target, &cmd).await {
        Ok(out) => out,
        Err(RemoteError::Command { stderr, .. }) => {
            anyhow::bail!("journalctl failed: {}", stderr.trim())
        }
        Err(e) => return Err(e.into()),
    };
    if app.is_json() {
        let lines: Vec<&str> = output.stdout.lines().collect();
        json::print(&serde_json::json!({ "unit": args.unit, "lines": lines }))?;
    } else {
        print!("{}", output.stdout);
    }
    Ok(ExitCode::SUCCESS)
}
