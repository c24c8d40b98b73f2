//! `stationctl ssh [COMMAND]` and `stationctl tunnel`: interactive access.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::output::reporter::TerminalReporter;

/// Arguments for the ssh command.
#[derive(Args)]
pub struct SshArgs {
    /// Command to run instead of a login shell
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Arguments for the tunnel command.
#[derive(Args)]
pub struct TunnelArgs {
    /// Local port to listen on (defaults to `editor.port`)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Open a shell (or run one command) on the workstation.
///
/// # Errors
///
/// Returns an error if the instance is not running or ssh cannot start.
pub async fn ssh(app: &AppContext, args: &SshArgs) -> Result<ExitCode> {
    let config = app.load_config()?;
    let infra = app.infra(&config).await?;
    let reporter = TerminalReporter::new(&app.output);
    let target = app
        .lifecycle(&config, &infra, &reporter)
        .session_target()
        .await?;
    let command = (!args.command.is_empty()).then(|| args.command.join(" "));
    let code = infra.remote.interactive(&target, command.as_deref()).await?;
    Ok(exit_code(code))
}

/// Forward the editor port to localhost until interrupted.
///
/// # Errors
///
/// Returns an error if the instance is not running or the forwarder cannot start.
pub async fn tunnel(app: &AppContext, args: &TunnelArgs) -> Result<ExitCode> {
    let config = app.load_config()?;
    let infra = app.infra(&config).await?;
    let reporter = TerminalReporter::new(&app.output);
    let target = app
        .lifecycle(&config, &infra, &reporter)
        .session_target()
        .await?;
    let remote_port = config.editor.port;
    let local_port = args.port.unwrap_or(remote_port);
    app.output
        .info(&format!("Editor available at http://localhost:{local_port} (Ctrl-C to stop)"));
    let code = infra.remote.tunnel(&target, local_port, remote_port).await?;
    Ok(exit_code(code))
}

pub(crate) fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
