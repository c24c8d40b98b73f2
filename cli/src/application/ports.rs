//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`, never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::Output;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::domain::{
    InfraError, RemoteError, Snapshot, SnapshotId, StationConfig, StationState, VolumeId,
    VolumeSource,
};

// ── Value Types ───────────────────────────────────────────────────────────────

/// Parameters for creating the compute instance.
pub struct InstanceSpec<'a> {
    pub name: &'a str,
    pub zone: &'a str,
    pub machine_type: &'a str,
    pub image_family: &'a str,
    pub image_project: &'a str,
    pub boot_disk_gb: u64,
    pub tags: &'a [String],
    pub external_ip: bool,
}

/// A disk attached to an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedDisk {
    pub device_name: String,
    pub volume: VolumeId,
    pub boot: bool,
}

/// What describe-instance reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub name: String,
    /// Platform status string, e.g. `RUNNING`, `TERMINATED`.
    pub status: String,
    pub machine_type: String,
    pub external_ip: Option<String>,
    pub internal_ip: Option<String>,
    pub disks: Vec<AttachedDisk>,
}

impl InstanceInfo {
    #[must_use]
    pub fn boot_volume(&self) -> Option<&VolumeId> {
        self.disks.iter().find(|d| d.boot).map(|d| &d.volume)
    }

    #[must_use]
    pub fn disk_on_device(&self, device_name: &str) -> Option<&VolumeId> {
        self.disks
            .iter()
            .find(|d| d.device_name == device_name)
            .map(|d| &d.volume)
    }
}

/// Parameters for creating a volume.
pub struct DiskSpec<'a> {
    pub id: &'a VolumeId,
    pub zone: &'a str,
    pub size_gb: u64,
    pub source: &'a VolumeSource,
}

/// What describe-disk reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInfo {
    pub id: VolumeId,
    pub size_gb: u64,
    pub status: String,
    /// Instances the disk is attached to.
    pub users: Vec<String>,
}

/// Snapshot readiness as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    Creating,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub id: SnapshotId,
    pub source_volume: VolumeId,
    pub created_at: DateTime<Utc>,
    pub storage_locations: Vec<String>,
    pub size_gb: u64,
    pub state: SnapshotState,
    pub description: Option<String>,
}

impl SnapshotInfo {
    #[must_use]
    pub fn into_snapshot(self) -> Snapshot {
        Snapshot {
            id: self.id,
            source_volume: self.source_volume,
            created_at: self.created_at,
            storage_location: self.storage_locations.into_iter().next(),
            size_gb: self.size_gb,
            description: self.description,
        }
    }
}

/// Which host a remote session goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub instance: String,
    pub zone: String,
    /// Reachable address for direct sessions.
    pub address: Option<String>,
}

impl std::fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.address {
            Some(addr) => write!(f, "{} ({addr})", self.instance),
            None => write!(f, "{}", self.instance),
        }
    }
}

/// Captured output of a successful remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

// ── Infrastructure API Ports ──────────────────────────────────────────────────

/// Compute instance operations.
#[allow(async_fn_in_trait)]
pub trait InstanceApi {
    /// Create the instance. Its boot disk is not auto-deleted with it.
    async fn create_instance(&self, spec: &InstanceSpec<'_>) -> Result<(), InfraError>;
    async fn describe_instance(&self, name: &str, zone: &str) -> Result<InstanceInfo, InfraError>;
    async fn start_instance(&self, name: &str, zone: &str) -> Result<(), InfraError>;
    async fn stop_instance(&self, name: &str, zone: &str) -> Result<(), InfraError>;
    /// Hard reset; the platform reruns its startup metadata on boot.
    async fn reset_instance(&self, name: &str, zone: &str) -> Result<(), InfraError>;
    async fn delete_instance(&self, name: &str, zone: &str) -> Result<(), InfraError>;
    async fn attach_disk(
        &self,
        name: &str,
        zone: &str,
        disk: &VolumeId,
        device_name: &str,
    ) -> Result<(), InfraError>;
    async fn detach_disk(&self, name: &str, zone: &str, disk: &VolumeId) -> Result<(), InfraError>;
    /// Set the script the platform runs at every boot.
    async fn set_startup_script(&self, name: &str, zone: &str, script: &str)
    -> Result<(), InfraError>;
}

/// Volume and snapshot operations.
#[allow(async_fn_in_trait)]
pub trait DiskApi {
    /// Start a snapshot of `disk`. Returns once the request is accepted.
    async fn create_snapshot(
        &self,
        disk: &VolumeId,
        zone: &str,
        id: &SnapshotId,
        description: Option<&str>,
    ) -> Result<(), InfraError>;
    async fn describe_snapshot(&self, id: &SnapshotId) -> Result<SnapshotInfo, InfraError>;
    /// Snapshots whose name starts with `prefix`.
    async fn list_snapshots(&self, prefix: &str) -> Result<Vec<SnapshotInfo>, InfraError>;
    async fn delete_snapshot(&self, id: &SnapshotId) -> Result<(), InfraError>;
    async fn create_disk(&self, spec: &DiskSpec<'_>) -> Result<(), InfraError>;
    async fn describe_disk(&self, id: &VolumeId, zone: &str) -> Result<DiskInfo, InfraError>;
    async fn delete_disk(&self, id: &VolumeId, zone: &str) -> Result<(), InfraError>;
}

/// Composite trait: any type implementing both sub-traits is an `InfraApi`.
pub trait InfraApi: InstanceApi + DiskApi {}

/// Blanket implementation: any type implementing both sub-traits is an `InfraApi`.
impl<T> InfraApi for T where T: InstanceApi + DiskApi {}

// ── Remote Session Ports ──────────────────────────────────────────────────────

/// Command execution on the instance.
///
/// Implementations tear the session down on every exit path, including
/// cancellation of the returned future.
#[allow(async_fn_in_trait)]
pub trait RemoteExecutor {
    /// Run a command line. A non-zero exit is [`RemoteError::Command`].
    async fn exec(&self, target: &RemoteTarget, command: &str) -> Result<RemoteOutput, RemoteError>;
    /// Run a multi-line shell script fed through stdin.
    async fn run_script(&self, target: &RemoteTarget, script: &str)
    -> Result<RemoteOutput, RemoteError>;
}

/// Host-to-instance file transfer.
#[allow(async_fn_in_trait)]
pub trait FileTransfer {
    async fn upload(&self, target: &RemoteTarget, local: &Path, remote: &str)
    -> Result<(), RemoteError>;
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: std::time::Duration,
    ) -> Result<Output>;
    /// Run a program with stdin piped from `stdin`, bounded by `timeout`.
    async fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        stdin: &[u8],
        timeout: std::time::Duration,
    ) -> Result<Output>;
    /// Run a program with inherited stdio and return only its exit status.
    async fn run_status(&self, program: &str, args: &[&str]) -> Result<std::process::ExitStatus>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait, no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── State and Config Ports ────────────────────────────────────────────────────

/// Abstracts orchestrator state persistence (load/save).
#[allow(async_fn_in_trait)]
pub trait StationStateStore {
    /// Load the saved state, returning `None` if no state exists.
    async fn load_async(&self) -> Result<Option<StationState>>;
    /// Persist the given state.
    async fn save_async(&self, state: &StationState) -> Result<()>;
}

/// Abstracts configuration file access.
pub trait ConfigStore {
    /// Load configuration, falling back to defaults when no file exists.
    fn load(&self) -> Result<StationConfig>;
    /// Persist configuration.
    fn save(&self, config: &StationConfig) -> Result<()>;
    /// Location of the configuration file.
    fn path(&self) -> Result<PathBuf>;
}
