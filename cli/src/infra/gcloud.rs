//! Infrastructure implementation of the `InstanceApi` and `DiskApi` ports.
//!
//! `GcloudApi<R>` routes every control-plane call through the `gcloud` CLI
//! via a `CommandRunner`, asking for JSON output where there is any to read.
//! Failures are classified from gcloud's stderr into [`InfraError`] kinds.

use std::io::Write as _;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::application::ports::{
    AttachedDisk, CommandRunner, DiskApi, DiskInfo, DiskSpec, InstanceApi, InstanceInfo,
    InstanceSpec, SnapshotInfo, SnapshotState,
};
use crate::domain::{InfraError, SnapshotId, VolumeId, VolumeSource};

/// Oldest gcloud release whose flags and JSON shapes are relied on.
pub const MIN_GCLOUD_VERSION: &str = "400.0.0";

/// Adapter over the `gcloud compute` command family.
pub struct GcloudApi<R: CommandRunner> {
    runner: R,
    project: Option<String>,
}

impl<R: CommandRunner> GcloudApi<R> {
    pub fn new(runner: R, project: Option<String>) -> Self {
        Self { runner, project }
    }

    /// Run `gcloud compute <args>` and return stdout, classifying failures.
    async fn compute(&self, args: &[&str]) -> Result<String, InfraError> {
        let project_flag = self.project.as_ref().map(|p| format!("--project={p}"));
        let mut full = Vec::with_capacity(args.len() + 3);
        full.push("compute");
        full.extend_from_slice(args);
        full.push("--quiet");
        if let Some(flag) = &project_flag {
            full.push(flag);
        }
        let output = self
            .runner
            .run("gcloud", &full)
            .await
            .map_err(|e| InfraError::Transient(format!("{e:#}")))?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let resource = args.iter().take(3).copied().collect::<Vec<_>>().join(" ");
        Err(classify(&resource, &stderr))
    }

    async fn compute_json<T: for<'de> Deserialize<'de>>(
        &self,
        args: &[&str],
    ) -> Result<T, InfraError> {
        let mut with_format = args.to_vec();
        with_format.push("--format=json");
        let stdout = self.compute(&with_format).await?;
        serde_json::from_str(&stdout)
            .map_err(|e| InfraError::Permanent(format!("unexpected gcloud output: {e}")))
    }

    /// Installed gcloud version.
    ///
    /// # Errors
    ///
    /// Returns an error if gcloud is missing, unparseable, or older than
    /// [`MIN_GCLOUD_VERSION`].
    pub async fn check_version(&self) -> Result<semver::Version> {
        let output = self
            .runner
            .run("gcloud", &["version", "--format=json"])
            .await
            .context("gcloud not found; install the Google Cloud SDK")?;
        anyhow::ensure!(output.status.success(), "gcloud version failed");
        let parsed: serde_json::Value =
            serde_json::from_slice(&output.stdout).context("parsing gcloud version")?;
        let raw = parsed
            .get("Google Cloud SDK")
            .and_then(serde_json::Value::as_str)
            .context("gcloud version output has no SDK version")?;
        let version = semver::Version::parse(raw).with_context(|| format!("parsing {raw}"))?;
        let min = semver::Version::parse(MIN_GCLOUD_VERSION).context("parsing minimum version")?;
        anyhow::ensure!(
            version >= min,
            "gcloud {version} is too old; {MIN_GCLOUD_VERSION} or newer is required"
        );
        Ok(version)
    }
}

/// Map gcloud stderr to an error kind.
pub(crate) fn classify(resource: &str, stderr: &str) -> InfraError {
    let lower = stderr.to_lowercase();
    let message = stderr.trim().to_string();
    if lower.contains("already exists") {
        InfraError::Conflict {
            resource: resource.to_string(),
        }
    } else if lower.contains("not found") || lower.contains("notfound") {
        InfraError::NotFound {
            resource: resource.to_string(),
        }
    } else if lower.contains("quota") || lower.contains("invalid") || lower.contains("permission") {
        InfraError::Permanent(message)
    } else if [
        "timed out",
        "timeout",
        "unavailable",
        "503",
        "connection",
        "resource_not_ready",
        "try again",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
    {
        InfraError::Transient(message)
    } else {
        InfraError::Permanent(message)
    }
}

/// Last path segment of a resource URL.
fn basename(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

// gcloud reports sizes as decimal strings.
fn parse_gb(s: &str) -> u64 {
    s.parse().unwrap_or_default()
}

// ── JSON shapes ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceJson {
    name: String,
    status: String,
    #[serde(default)]
    machine_type: String,
    #[serde(default)]
    network_interfaces: Vec<NicJson>,
    #[serde(default)]
    disks: Vec<AttachedDiskJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NicJson {
    #[serde(rename = "networkIP")]
    network_ip: Option<String>,
    #[serde(default)]
    access_configs: Vec<AccessConfigJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessConfigJson {
    #[serde(rename = "natIP")]
    nat_ip: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachedDiskJson {
    #[serde(default)]
    device_name: String,
    source: String,
    #[serde(default)]
    boot: bool,
}

impl From<InstanceJson> for InstanceInfo {
    fn from(j: InstanceJson) -> Self {
        let nic = j.network_interfaces.into_iter().next();
        let internal_ip = nic.as_ref().and_then(|n| n.network_ip.clone());
        let external_ip = nic.and_then(|n| n.access_configs.into_iter().find_map(|a| a.nat_ip));
        Self {
            name: j.name,
            status: j.status,
            machine_type: basename(&j.machine_type).to_string(),
            external_ip,
            internal_ip,
            disks: j
                .disks
                .into_iter()
                .map(|d| AttachedDisk {
                    device_name: d.device_name,
                    volume: VolumeId(basename(&d.source).to_string()),
                    boot: d.boot,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiskJson {
    name: String,
    #[serde(default)]
    size_gb: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    users: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotJson {
    name: String,
    #[serde(default)]
    source_disk: String,
    creation_timestamp: DateTime<chrono::FixedOffset>,
    #[serde(default)]
    storage_locations: Vec<String>,
    #[serde(default)]
    disk_size_gb: String,
    status: String,
    description: Option<String>,
}

impl From<SnapshotJson> for SnapshotInfo {
    fn from(j: SnapshotJson) -> Self {
        let state = match j.status.as_str() {
            "READY" => SnapshotState::Ready,
            "FAILED" => SnapshotState::Failed,
            _ => SnapshotState::Creating,
        };
        Self {
            id: SnapshotId(j.name),
            source_volume: VolumeId(basename(&j.source_disk).to_string()),
            created_at: j.creation_timestamp.with_timezone(&Utc),
            storage_locations: j.storage_locations,
            size_gb: parse_gb(&j.disk_size_gb),
            state,
            description: j.description.filter(|d| !d.is_empty()),
        }
    }
}

// ── Port implementations ─────────────────────────────────────────────────────

impl<R: CommandRunner> InstanceApi for GcloudApi<R> {
    async fn create_instance(&self, spec: &InstanceSpec<'_>) -> Result<(), InfraError> {
        let zone = format!("--zone={}", spec.zone);
        let machine = format!("--machine-type={}", spec.machine_type);
        let family = format!("--image-family={}", spec.image_family);
        let image_project = format!("--image-project={}", spec.image_project);
        let boot_size = format!("--boot-disk-size={}GB", spec.boot_disk_gb);
        let tags = format!("--tags={}", spec.tags.join(","));
        let mut args = vec![
            "instances",
            "create",
            spec.name,
            zone.as_str(),
            machine.as_str(),
            family.as_str(),
            image_project.as_str(),
            boot_size.as_str(),
            "--no-boot-disk-auto-delete",
        ];
        if !spec.tags.is_empty() {
            args.push(&tags);
        }
        if !spec.external_ip {
            args.push("--no-address");
        }
        self.compute(&args).await.map(drop)
    }

    async fn describe_instance(&self, name: &str, zone: &str) -> Result<InstanceInfo, InfraError> {
        let zone = format!("--zone={zone}");
        let json: InstanceJson = self
            .compute_json(&["instances", "describe", name, &zone])
            .await?;
        Ok(json.into())
    }

    async fn start_instance(&self, name: &str, zone: &str) -> Result<(), InfraError> {
        let zone = format!("--zone={zone}");
        self.compute(&["instances", "start", name, &zone]).await.map(drop)
    }

    async fn stop_instance(&self, name: &str, zone: &str) -> Result<(), InfraError> {
        let zone = format!("--zone={zone}");
        self.compute(&["instances", "stop", name, &zone]).await.map(drop)
    }

    async fn reset_instance(&self, name: &str, zone: &str) -> Result<(), InfraError> {
        let zone = format!("--zone={zone}");
        self.compute(&["instances", "reset", name, &zone]).await.map(drop)
    }

    async fn delete_instance(&self, name: &str, zone: &str) -> Result<(), InfraError> {
        let zone = format!("--zone={zone}");
        self.compute(&["instances", "delete", name, &zone]).await.map(drop)
    }

    async fn attach_disk(
        &self,
        name: &str,
        zone: &str,
        disk: &VolumeId,
        device_name: &str,
    ) -> Result<(), InfraError> {
        let zone = format!("--zone={zone}");
        let disk = format!("--disk={disk}");
        let device = format!("--device-name={device_name}");
        self.compute(&["instances", "attach-disk", name, &disk, &device, &zone])
            .await
            .map(drop)
    }

    async fn detach_disk(&self, name: &str, zone: &str, disk: &VolumeId) -> Result<(), InfraError> {
        let zone = format!("--zone={zone}");
        let disk = format!("--disk={disk}");
        self.compute(&["instances", "detach-disk", name, &disk, &zone])
            .await
            .map(drop)
    }

    async fn set_startup_script(
        &self,
        name: &str,
        zone: &str,
        script: &str,
    ) -> Result<(), InfraError> {
        // Passed as a file: inline --metadata splits values on commas.
        let mut file = tempfile::NamedTempFile::new()
            .map_err(|e| InfraError::Permanent(format!("cannot create temp file: {e}")))?;
        file.write_all(script.as_bytes())
            .map_err(|e| InfraError::Permanent(format!("cannot write temp file: {e}")))?;
        let zone = format!("--zone={zone}");
        let metadata = format!("--metadata-from-file=startup-script={}", file.path().display());
        self.compute(&["instances", "add-metadata", name, &metadata, &zone])
            .await
            .map(drop)
    }
}

impl<R: CommandRunner> DiskApi for GcloudApi<R> {
    async fn create_snapshot(
        &self,
        disk: &VolumeId,
        zone: &str,
        id: &SnapshotId,
        description: Option<&str>,
    ) -> Result<(), InfraError> {
        let zone = format!("--zone={zone}");
        let names = format!("--snapshot-names={id}");
        let description = description.map(|d| format!("--description={d}"));
        let mut args = vec![
            "disks",
            "snapshot",
            disk.0.as_str(),
            names.as_str(),
            zone.as_str(),
            "--async",
        ];
        if let Some(d) = &description {
            args.push(d);
        }
        self.compute(&args).await.map(drop)
    }

    async fn describe_snapshot(&self, id: &SnapshotId) -> Result<SnapshotInfo, InfraError> {
        let json: SnapshotJson = self.compute_json(&["snapshots", "describe", &id.0]).await?;
        Ok(json.into())
    }

    async fn list_snapshots(&self, prefix: &str) -> Result<Vec<SnapshotInfo>, InfraError> {
        let filter = format!("--filter=name~^{prefix}");
        let json: Vec<SnapshotJson> = self.compute_json(&["snapshots", "list", &filter]).await?;
        Ok(json.into_iter().map(Into::into).collect())
    }

    async fn delete_snapshot(&self, id: &SnapshotId) -> Result<(), InfraError> {
        self.compute(&["snapshots", "delete", &id.0]).await.map(drop)
    }

    async fn create_disk(&self, spec: &DiskSpec<'_>) -> Result<(), InfraError> {
        let zone = format!("--zone={}", spec.zone);
        let size = format!("--size={}GB", spec.size_gb);
        let source = match spec.source {
            VolumeSource::Snapshot(snap) => Some(format!("--source-snapshot={snap}")),
            VolumeSource::Empty => None,
        };
        let mut args = vec!["disks", "create", spec.id.0.as_str(), zone.as_str(), size.as_str()];
        if let Some(s) = &source {
            args.push(s);
        }
        self.compute(&args).await.map(drop)
    }

    async fn describe_disk(&self, id: &VolumeId, zone: &str) -> Result<DiskInfo, InfraError> {
        let zone = format!("--zone={zone}");
        let json: DiskJson = self.compute_json(&["disks", "describe", &id.0, &zone]).await?;
        Ok(DiskInfo {
            id: VolumeId(json.name),
            size_gb: parse_gb(&json.size_gb),
            status: json.status,
            users: json.users.iter().map(|u| basename(u).to_string()).collect(),
        })
    }

    async fn delete_disk(&self, id: &VolumeId, zone: &str) -> Result<(), InfraError> {
        let zone = format!("--zone={zone}");
        self.compute(&["disks", "delete", &id.0, &zone]).await.map(drop)
    }
}
