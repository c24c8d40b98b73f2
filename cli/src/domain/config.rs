//! Domain types and validators for stationctl configuration.
//!
//! Pure functions only: no I/O, no async, no filesystem access.

use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use station_common::IdleMonitorConfig;

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

pub const VALID_CONFIG_KEYS: &[&str] = &[
    "instance.name",
    "instance.zone",
    "instance.project",
    "instance.machine_type",
    "instance.image_family",
    "instance.image_project",
    "instance.boot_disk_gb",
    "instance.data_disk_gb",
    "instance.external_ip",
    "source.disk",
    "source.zone",
    "ssh.mode",
    "ssh.user",
    "ssh.host",
    "ssh.key_file",
    "ssh.port",
    "ssh.connect_timeout_secs",
    "ssh.command_timeout_secs",
    "readiness.max_attempts",
    "readiness.delay_secs",
    "idle.interval_minutes",
    "idle.threshold_minutes",
    "idle.dry_run",
    "editor.port",
    "editor.user",
];

const NUMERIC_KEYS: &[&str] = &[
    "instance.boot_disk_gb",
    "instance.data_disk_gb",
    "ssh.connect_timeout_secs",
    "ssh.command_timeout_secs",
    "readiness.max_attempts",
    "readiness.delay_secs",
    "idle.interval_minutes",
    "idle.threshold_minutes",
];

const PORT_KEYS: &[&str] = &["ssh.port", "editor.port"];
const BOOL_KEYS: &[&str] = &["instance.external_ip", "idle.dry_run"];

static INSTANCE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // literal pattern
    Regex::new(r"^[a-z][a-z0-9-]{0,62}$").expect("valid regex")
});

static ZONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // literal pattern
    Regex::new(r"^[a-z]+(-[a-z0-9]+)+-[a-z]$").expect("valid regex")
});

static USER_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)] // literal pattern
    Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").expect("valid regex")
});

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.stationctl/config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StationConfig {
    pub instance: InstanceConfig,
    pub source: SourceConfig,
    pub ssh: SshConfig,
    pub readiness: ReadinessConfig,
    pub idle: IdleConfig,
    pub editor: EditorConfig,
}

/// The managed instance and its volumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstanceConfig {
    pub name: String,
    pub zone: String,
    /// Cloud project; `None` uses the gcloud default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub machine_type: String,
    pub image_family: String,
    pub image_project: String,
    pub boot_disk_gb: u64,
    pub data_disk_gb: u64,
    pub tags: Vec<String>,
    /// Give the instance a public address (required for direct SSH).
    pub external_ip: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: "station".to_string(),
            zone: "us-central1-a".to_string(),
            project: None,
            machine_type: "e2-standard-4".to_string(),
            image_family: "ubuntu-2404-lts-amd64".to_string(),
            image_project: "ubuntu-os-cloud".to_string(),
            boot_disk_gb: 50,
            data_disk_gb: 200,
            tags: Vec::new(),
            external_ip: false,
        }
    }
}

/// Source volume that `create` snapshots to seed the data volume.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SourceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,
    /// Zone of the source disk; defaults to the instance zone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

/// How remote sessions are opened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SshMode {
    /// `gcloud compute ssh --tunnel-through-iap`.
    #[default]
    Iap,
    /// Plain `ssh` to `host` (or the external address).
    Direct,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SshConfig {
    pub mode: SshMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    pub port: u16,
    /// Fail fast on an unreachable host.
    pub connect_timeout_secs: u64,
    /// Generous: package installation can take minutes.
    pub command_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            mode: SshMode::Iap,
            user: None,
            host: None,
            key_file: None,
            port: 22,
            connect_timeout_secs: 10,
            command_timeout_secs: 900,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReadinessConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            delay_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IdleConfig {
    pub interval_minutes: u32,
    pub threshold_minutes: u32,
    /// Log the shutdown decision without powering off.
    pub dry_run: bool,
}

impl Default for IdleConfig {
    fn default() -> Self {
        let d = IdleMonitorConfig::default();
        Self {
            interval_minutes: d.interval_minutes,
            threshold_minutes: d.threshold_minutes,
            dry_run: d.dry_run,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EditorConfig {
    pub port: u16,
    /// Account that owns the data volume and runs the editor.
    pub user: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            port: IdleMonitorConfig::default().editor_port,
            user: "dev".to_string(),
        }
    }
}

impl StationConfig {
    /// Settings handed to the idle monitor on the instance.
    #[must_use]
    pub fn idle_monitor(&self) -> IdleMonitorConfig {
        IdleMonitorConfig {
            interval_minutes: self.idle.interval_minutes,
            threshold_minutes: self.idle.threshold_minutes,
            editor_port: self.editor.port,
            dry_run: self.idle.dry_run,
            ..IdleMonitorConfig::default()
        }
    }

    /// Whole-config checks that cannot be done per key.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        validate_config_value("instance.name", &self.instance.name)?;
        validate_config_value("instance.zone", &self.instance.zone)?;
        validate_config_value("editor.user", &self.editor.user)?;
        if self.ssh.mode == SshMode::Direct
            && self.ssh.host.is_none()
            && !self.instance.external_ip
        {
            return Err(ConfigError::InvalidValue {
                key: "ssh.mode".to_string(),
                value: "direct".to_string(),
                expected: "ssh.host or instance.external_ip=true when using direct SSH".to_string(),
            }
            .into());
        }
        self.idle_monitor().validate().map_err(|e| ConfigError::InvalidValue {
            key: "idle.threshold_minutes".to_string(),
            value: self.idle.threshold_minutes.to_string(),
            expected: e.to_string(),
        })?;
        Ok(())
    }

    /// Read a dotted key as a display string. Unset optional values are `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a known setting.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        validate_config_key(key)?;
        let v = match key {
            "instance.name" => Some(self.instance.name.clone()),
            "instance.zone" => Some(self.instance.zone.clone()),
            "instance.project" => self.instance.project.clone(),
            "instance.machine_type" => Some(self.instance.machine_type.clone()),
            "instance.image_family" => Some(self.instance.image_family.clone()),
            "instance.image_project" => Some(self.instance.image_project.clone()),
            "instance.boot_disk_gb" => Some(self.instance.boot_disk_gb.to_string()),
            "instance.data_disk_gb" => Some(self.instance.data_disk_gb.to_string()),
            "instance.external_ip" => Some(self.instance.external_ip.to_string()),
            "source.disk" => self.source.disk.clone(),
            "source.zone" => self.source.zone.clone(),
            "ssh.mode" => Some(
                match self.ssh.mode {
                    SshMode::Iap => "iap",
                    SshMode::Direct => "direct",
                }
                .to_string(),
            ),
            "ssh.user" => self.ssh.user.clone(),
            "ssh.host" => self.ssh.host.clone(),
            "ssh.key_file" => self.ssh.key_file.as_ref().map(|p| p.display().to_string()),
            "ssh.port" => Some(self.ssh.port.to_string()),
            "ssh.connect_timeout_secs" => Some(self.ssh.connect_timeout_secs.to_string()),
            "ssh.command_timeout_secs" => Some(self.ssh.command_timeout_secs.to_string()),
            "readiness.max_attempts" => Some(self.readiness.max_attempts.to_string()),
            "readiness.delay_secs" => Some(self.readiness.delay_secs.to_string()),
            "idle.interval_minutes" => Some(self.idle.interval_minutes.to_string()),
            "idle.threshold_minutes" => Some(self.idle.threshold_minutes.to_string()),
            "idle.dry_run" => Some(self.idle.dry_run.to_string()),
            "editor.port" => Some(self.editor.port.to_string()),
            "editor.user" => Some(self.editor.user.clone()),
            _ => None,
        };
        Ok(v)
    }

    /// Validate and assign a dotted key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value is invalid for it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_config_key(key)?;
        validate_config_value(key, value)?;
        let s = value.to_string();
        match key {
            "instance.name" => self.instance.name = s,
            "instance.zone" => self.instance.zone = s,
            "instance.project" => self.instance.project = Some(s),
            "instance.machine_type" => self.instance.machine_type = s,
            "instance.image_family" => self.instance.image_family = s,
            "instance.image_project" => self.instance.image_project = s,
            "instance.boot_disk_gb" => self.instance.boot_disk_gb = value.parse()?,
            "instance.data_disk_gb" => self.instance.data_disk_gb = value.parse()?,
            "instance.external_ip" => self.instance.external_ip = value.parse()?,
            "source.disk" => self.source.disk = Some(s),
            "source.zone" => self.source.zone = Some(s),
            "ssh.mode" => {
                self.ssh.mode = if value == "direct" {
                    SshMode::Direct
                } else {
                    SshMode::Iap
                };
            }
            "ssh.user" => self.ssh.user = Some(s),
            "ssh.host" => self.ssh.host = Some(s),
            "ssh.key_file" => self.ssh.key_file = Some(PathBuf::from(s)),
            "ssh.port" => self.ssh.port = value.parse()?,
            "ssh.connect_timeout_secs" => self.ssh.connect_timeout_secs = value.parse()?,
            "ssh.command_timeout_secs" => self.ssh.command_timeout_secs = value.parse()?,
            "readiness.max_attempts" => self.readiness.max_attempts = value.parse()?,
            "readiness.delay_secs" => self.readiness.delay_secs = value.parse()?,
            "idle.interval_minutes" => self.idle.interval_minutes = value.parse()?,
            "idle.threshold_minutes" => self.idle.threshold_minutes = value.parse()?,
            "idle.dry_run" => self.idle.dry_run = value.parse()?,
            "editor.port" => self.editor.port = value.parse()?,
            "editor.user" => self.editor.user = s,
            _ => anyhow::bail!("Unknown setting: {key}"),
        }
        Ok(())
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Instance names: lowercase letter first, then `[a-z0-9-]`, at most 63 chars.
#[must_use]
pub fn is_valid_instance_name(name: &str) -> bool {
    INSTANCE_NAME_RE.is_match(name) && !name.ends_with('-')
}

/// Zones look like `region-zone-letter`, e.g. `us-central1-a`.
#[must_use]
pub fn is_valid_zone(zone: &str) -> bool {
    ZONE_RE.is_match(zone)
}

/// Validates a configuration key against the whitelist.
///
/// # Errors
///
/// Returns an error if the key is not in the allowed list.
pub fn validate_config_key(key: &str) -> Result<()> {
    if !VALID_CONFIG_KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey {
            key: key.to_string(),
            valid: VALID_CONFIG_KEYS.join(", "),
        }
        .into());
    }
    Ok(())
}

/// Validates a configuration value for the given key.
///
/// # Errors
///
/// Returns an error if the value is not valid for the key.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    let expected = match key {
        "instance.name" | "source.disk" if !is_valid_instance_name(value) => {
            Some("lowercase letter first, then a-z, 0-9 or '-', at most 63 characters")
        }
        "instance.zone" | "source.zone" if !is_valid_zone(value) => {
            Some("a zone such as us-central1-a")
        }
        "ssh.mode" if !matches!(value, "iap" | "direct") => Some("iap, direct"),
        "ssh.user" | "editor.user" if !USER_RE.is_match(value) => Some("a POSIX user name"),
        k if NUMERIC_KEYS.contains(&k) && !matches!(value.parse::<u64>(), Ok(n) if n > 0) => {
            Some("a positive integer")
        }
        k if PORT_KEYS.contains(&k) && !matches!(value.parse::<u16>(), Ok(n) if n > 0) => {
            Some("a port number between 1 and 65535")
        }
        k if BOOL_KEYS.contains(&k) && value.parse::<bool>().is_err() => Some("true, false"),
        _ if value.trim().is_empty() => Some("a non-empty value"),
        _ => None,
    };
    if let Some(expected) = expected {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
        .into());
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
