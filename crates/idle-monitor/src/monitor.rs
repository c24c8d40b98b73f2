//! Fixed-interval sampling loop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use station_common::{Decision, IdleMonitorConfig, IdleStatus, IdleTracker, Sample};

use crate::probe::ActivityProbe;
use crate::shutdown::ShutdownAction;

/// How a finished run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Samples taken by this process.
    pub samples: u32,
    /// Whether the terminate action was issued.
    pub terminated: bool,
}

/// Single-threaded idle monitor.
///
/// Each instance owns a fresh [`IdleTracker`]; constructing a new `Monitor`
/// (which is what a service restart does) always starts from zero idle
/// minutes.
pub struct Monitor<P: ActivityProbe, S: ShutdownAction> {
    probe: P,
    shutdown: S,
    tracker: IdleTracker,
    sample_period: Duration,
    status_file: Option<PathBuf>,
    started_at: DateTime<Utc>,
    samples: u32,
}

impl<P: ActivityProbe, S: ShutdownAction> Monitor<P, S> {
    #[must_use]
    pub fn new(cfg: &IdleMonitorConfig, probe: P, shutdown: S) -> Self {
        Self {
            probe,
            shutdown,
            tracker: IdleTracker::from_config(cfg),
            sample_period: Duration::from_secs(u64::from(cfg.interval_minutes) * 60),
            status_file: Some(cfg.status_file.clone()),
            started_at: Utc::now(),
            samples: 0,
        }
    }

    /// Override the wall-clock wait between samples. The idle arithmetic
    /// still advances by the configured interval per sample.
    #[must_use]
    pub fn with_sample_period(mut self, period: Duration) -> Self {
        self.sample_period = period;
        self
    }

    /// Disable status file writes.
    #[must_use]
    pub fn without_status_file(mut self) -> Self {
        self.status_file = None;
        self
    }

    #[must_use]
    pub fn tracker(&self) -> &IdleTracker {
        &self.tracker
    }

    /// Take one sample and advance the countdown.
    ///
    /// Probe failures count as activity so an uncertain reading never powers
    /// the host off.
    pub async fn sample_once(&mut self) -> Decision {
        let sample = match self.probe.active_sessions().await {
            Ok(n) => Sample::Sessions(n),
            Err(e) => {
                tracing::warn!(error = %e, "session probe failed, assuming active");
                Sample::Unknown
            }
        };
        self.samples += 1;
        let decision = self.tracker.observe(sample);
        tracing::info!(
            sample = self.samples,
            active = ?self.tracker.last_sessions(),
            idle_minutes = self.tracker.idle_minutes(),
            threshold_minutes = self.tracker.threshold_minutes(),
            phase = ?self.tracker.phase(),
            "idle sample",
        );
        decision
    }

    /// Sample every period until the threshold is crossed, then issue the
    /// terminate action exactly once and return.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminate action fails. The service manager
    /// restarts the monitor, which begins a fresh countdown.
    pub async fn run(mut self) -> Result<RunSummary> {
        self.publish().await;
        loop {
            tokio::time::sleep(self.sample_period).await;
            let decision = self.sample_once().await;
            self.publish().await;
            match decision {
                Decision::Continue => {}
                Decision::Terminate => {
                    tracing::warn!(
                        idle_minutes = self.tracker.idle_minutes(),
                        "idle threshold reached, shutting down host",
                    );
                    self.shutdown
                        .shutdown()
                        .await
                        .context("issuing host shutdown")?;
                    return Ok(RunSummary {
                        samples: self.samples,
                        terminated: true,
                    });
                }
                Decision::Halted => {
                    return Ok(RunSummary {
                        samples: self.samples,
                        terminated: false,
                    });
                }
            }
        }
    }

    async fn publish(&self) {
        let Some(path) = &self.status_file else {
            return;
        };
        let status = IdleStatus::from_tracker(&self.tracker, self.started_at, Utc::now());
        if let Err(e) = write_status(path, &status).await {
            tracing::warn!(error = %e, path = %path.display(), "could not write status file");
        }
    }
}

/// Atomically replace the status file (temp file + rename).
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub async fn write_status(path: &Path, status: &IdleStatus) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let content = serde_json::to_vec_pretty(status).context("serializing idle status")?;
    let temp = path.with_extension("json.tmp");
    tokio::fs::write(&temp, content)
        .await
        .with_context(|| format!("writing {}", temp.display()))?;
    tokio::fs::rename(&temp, path)
        .await
        .with_context(|| format!("finalizing {}", path.display()))?;
    Ok(())
}
