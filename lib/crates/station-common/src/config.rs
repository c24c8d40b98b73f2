use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Environment prefix the idle monitor reads its settings from.
pub const ENV_PREFIX: &str = "STATION_IDLE_";

pub const ENV_INTERVAL_MINUTES: &str = "STATION_IDLE_INTERVAL_MINUTES";
pub const ENV_THRESHOLD_MINUTES: &str = "STATION_IDLE_THRESHOLD_MINUTES";
pub const ENV_EDITOR_PORT: &str = "STATION_IDLE_EDITOR_PORT";
pub const ENV_STATUS_FILE: &str = "STATION_IDLE_STATUS_FILE";
pub const ENV_DRY_RUN: &str = "STATION_IDLE_DRY_RUN";

pub const DEFAULT_INTERVAL_MINUTES: u32 = 5;
pub const DEFAULT_THRESHOLD_MINUTES: u32 = 120;
pub const DEFAULT_EDITOR_PORT: u16 = 8080;

/// Status file location on the instance. Lives on tmpfs so a reboot or a
/// monitor restart never resurrects old idle progress.
pub const DEFAULT_STATUS_FILE: &str = "/run/station-idle/status.json";

/// systemd unit name of the idle monitor on the instance.
pub const MONITOR_UNIT: &str = "station-idle-monitor.service";

/// Install path of the idle monitor binary on the instance.
pub const MONITOR_BIN_PATH: &str = "/usr/local/bin/station-idle-monitor";

/// Idle monitor configuration.
///
/// Deserialized by the monitor from `STATION_IDLE_*` variables and rendered by
/// the orchestrator into the unit file, so both sides agree on names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleMonitorConfig {
    /// Minutes between two samples.
    #[serde(default = "default_interval")]
    pub interval_minutes: u32,

    /// Accumulated idle minutes that trigger a shutdown.
    #[serde(default = "default_threshold")]
    pub threshold_minutes: u32,

    /// Port of the loopback-bound editor service.
    #[serde(default = "default_editor_port")]
    pub editor_port: u16,

    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,

    /// Log the terminate decision instead of powering off.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_interval() -> u32 {
    DEFAULT_INTERVAL_MINUTES
}

fn default_threshold() -> u32 {
    DEFAULT_THRESHOLD_MINUTES
}

fn default_editor_port() -> u16 {
    DEFAULT_EDITOR_PORT
}

fn default_status_file() -> PathBuf {
    PathBuf::from(DEFAULT_STATUS_FILE)
}

impl Default for IdleMonitorConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval(),
            threshold_minutes: default_threshold(),
            editor_port: default_editor_port(),
            status_file: default_status_file(),
            dry_run: false,
        }
    }
}

/// Invalid idle monitor settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sample interval must be at least one minute")]
    ZeroInterval,

    #[error("idle threshold ({threshold}m) must be at least one sample interval ({interval}m)")]
    ThresholdBelowInterval { threshold: u32, interval: u32 },
}

impl IdleMonitorConfig {
    /// Check the interval/threshold pair.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_minutes == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.threshold_minutes < self.interval_minutes {
            return Err(ConfigError::ThresholdBelowInterval {
                threshold: self.threshold_minutes,
                interval: self.interval_minutes,
            });
        }
        Ok(())
    }

    /// `(NAME, value)` pairs for the systemd `Environment=` lines.
    #[must_use]
    pub fn env_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_INTERVAL_MINUTES, self.interval_minutes.to_string()),
            (ENV_THRESHOLD_MINUTES, self.threshold_minutes.to_string()),
            (ENV_EDITOR_PORT, self.editor_port.to_string()),
            (ENV_STATUS_FILE, self.status_file.display().to_string()),
            (ENV_DRY_RUN, self.dry_run.to_string()),
        ]
    }

    /// Number of consecutive idle samples before the shutdown fires.
    #[must_use]
    pub fn samples_to_terminate(&self) -> u32 {
        self.threshold_minutes.div_ceil(self.interval_minutes.max(1))
    }
}
