//! `stationctl delete [--data]`: tear the workstation down.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::output::human::HumanRenderer;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Arguments for the delete command.
#[derive(Args)]
pub struct DeleteArgs {
    /// Also delete the data volume (backups are never deleted)
    #[arg(long)]
    pub data: bool,
}

/// Run `stationctl delete`.
///
/// # Errors
///
/// Returns an error listing whatever could not be removed.
pub async fn run(app: &AppContext, args: &DeleteArgs) -> Result<ExitCode> {
    if !app.output.quiet {
        println!();
        println!("This will delete the instance and its boot volume.");
        if args.data {
            println!("The data volume will be deleted too. Backups are kept.");
        } else {
            println!("The data volume is kept.");
        }
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
        .delete(args.data)
        .await?;
    drop(reporter);
    if app.is_json() {
        json::print(&report)?;
    } else {
        HumanRenderer::new(&app.output).render_delete(&report);
    }
    Ok(ExitCode::SUCCESS)
}
