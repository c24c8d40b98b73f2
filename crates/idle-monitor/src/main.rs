//! station-idle-monitor entry point.
//!
//! Initialises tracing, loads configuration from `STATION_IDLE_*`
//! environment variables and runs the sampling loop until the idle threshold
//! powers the host off or the service manager stops us.

use anyhow::{Context, Result};
use station_common::IdleMonitorConfig;
use station_common::config::ENV_PREFIX;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::EnvFilter;

use station_idle_monitor::{DryRunShutdown, HostActivityProbe, Monitor, SystemShutdown};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .without_time() // journald stamps every line
        .init();

    let config: IdleMonitorConfig = envy::prefixed(ENV_PREFIX)
        .from_env()
        .context("failed to load config from STATION_IDLE_* env vars")?;
    config.validate().context("invalid idle monitor configuration")?;

    tracing::info!(
        interval_minutes = config.interval_minutes,
        threshold_minutes = config.threshold_minutes,
        samples_to_terminate = config.samples_to_terminate(),
        editor_port = config.editor_port,
        status_file = %config.status_file.display(),
        dry_run = config.dry_run,
        "station-idle-monitor starting with a fresh idle counter",
    );

    let probe = HostActivityProbe::new(config.editor_port);
    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;

    let summary = if config.dry_run {
        let monitor = Monitor::new(&config, probe, DryRunShutdown);
        tokio::select! {
            result = monitor.run() => Some(result?),
            _ = terminate.recv() => None,
            _ = tokio::signal::ctrl_c() => None,
        }
    } else {
        let monitor = Monitor::new(&config, probe, SystemShutdown);
        tokio::select! {
            result = monitor.run() => Some(result?),
            _ = terminate.recv() => None,
            _ = tokio::signal::ctrl_c() => None,
        }
    };

    match summary {
        Some(s) => {
            tracing::info!(samples = s.samples, terminated = s.terminated, "monitor finished");
        }
        None => tracing::info!("received stop signal, exiting"),
    }
    Ok(())
}
