//! stationctl - provision, monitor and tear down a remote development workstation

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use stationctl::cli::Cli;
use stationctl::domain::{ConfigError, PipelineError};
use stationctl::output::json;

/// Exit status for invalid configuration or arguments.
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose());
    let json_errors = cli.json();

    match cli.run().await {
        Ok(code) => code,
        Err(e) => report(&e, json_errors),
    }
}

/// Diagnostics go to stderr; `STATIONCTL_LOG` overrides the level.
fn init_tracing(verbose: bool) {
    let default = if verbose { "stationctl=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("STATIONCTL_LOG").unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report(e: &anyhow::Error, as_json: bool) -> ExitCode {
    let (code, label, stage) = if let Some(p) = e.downcast_ref::<PipelineError>() {
        let stage = p.stage.to_string();
        (
            u8::try_from(p.exit_code()).unwrap_or(1),
            p.kind.to_string(),
            Some(stage),
        )
    } else if e.downcast_ref::<ConfigError>().is_some() {
        (EXIT_CONFIG, "config".to_string(), None)
    } else {
        (1, "error".to_string(), None)
    };

    let message = format!("{e:#}");
    if as_json {
        match json::format_error(&message, &label, stage.as_deref()) {
            Ok(doc) => println!("{doc}"),
            Err(_) => eprintln!("Error: {message}"),
        }
    } else {
        eprintln!("Error: {message}");
    }
    ExitCode::from(code)
}
