//! In-memory stand-ins for the cloud API, the remote host and the state file.
//!
//! `FakeCloud` keeps instances, disks and snapshots in maps and behaves like
//! the platform does for the calls the orchestrator makes: deleting an
//! instance leaves its disks behind, deleting an absent resource is
//! `NotFound`. Every call is appended to a log so tests can assert ordering.

#![allow(dead_code, clippy::expect_used)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use station_common::IdleStatus;
use stationctl::application::ports::{
    AttachedDisk, DiskApi, DiskInfo, DiskSpec, FileTransfer, InstanceApi, InstanceInfo,
    InstanceSpec, ProgressReporter, RemoteExecutor, RemoteOutput, RemoteTarget, SnapshotInfo,
    SnapshotState, StationStateStore,
};
use stationctl::application::services::readiness::PollPolicy;
use stationctl::domain::{
    InfraError, RemoteError, SnapshotId, StationConfig, StationState, VolumeId,
};

pub const ZONE: &str = "us-central1-a";
pub const SOURCE_DISK: &str = "workstation-home";

/// Platform polling used by every scenario: no waiting between checks.
pub fn fast_polling() -> PollPolicy {
    PollPolicy::new(3, Duration::ZERO)
}

/// Configuration for an instance named `dev` seeded from [`SOURCE_DISK`].
pub fn config() -> StationConfig {
    let mut cfg = StationConfig::default();
    cfg.instance.name = "dev".to_string();
    cfg.instance.zone = ZONE.to_string();
    cfg.source.disk = Some(SOURCE_DISK.to_string());
    cfg.readiness.max_attempts = 5;
    cfg.readiness.delay_secs = 0;
    cfg
}

fn not_found(resource: String) -> InfraError {
    InfraError::NotFound { resource }
}

// ── Cloud ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeCloud {
    pub calls: RefCell<Vec<String>>,
    pub instances: RefCell<BTreeMap<String, InstanceInfo>>,
    pub disks: RefCell<BTreeMap<String, DiskInfo>>,
    pub snapshots: RefCell<BTreeMap<String, SnapshotInfo>>,
    /// Makes `attach_disk` fail with a permanent error.
    pub reject_attach: Cell<bool>,
}

impl FakeCloud {
    /// A project holding only the source disk.
    pub fn with_source_disk() -> Self {
        let cloud = Self::default();
        cloud.add_disk(SOURCE_DISK, 150);
        cloud
    }

    pub fn add_disk(&self, name: &str, size_gb: u64) {
        self.disks.borrow_mut().insert(
            name.to_string(),
            DiskInfo {
                id: VolumeId::from(name),
                size_gb,
                status: "READY".to_string(),
                users: Vec::new(),
            },
        );
    }

    pub fn has_disk(&self, name: &str) -> bool {
        self.disks.borrow().contains_key(name)
    }

    pub fn has_instance(&self, name: &str) -> bool {
        self.instances.borrow().contains_key(name)
    }

    /// Overwrite the platform status, e.g. after the idle monitor powered off.
    pub fn set_status(&self, name: &str, status: &str) {
        if let Some(info) = self.instances.borrow_mut().get_mut(name) {
            info.status = status.to_string();
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Calls whose verb starts with `prefix`, in order.
    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls.borrow().iter().position(|c| c == call)
    }

    pub fn forget_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn log(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl InstanceApi for FakeCloud {
    async fn create_instance(&self, spec: &InstanceSpec<'_>) -> Result<(), InfraError> {
        self.log(format!("create_instance {}", spec.name));
        if self.has_instance(spec.name) {
            return Err(InfraError::Conflict {
                resource: format!("instance {}", spec.name),
            });
        }
        // The boot disk takes the instance name and outlives the instance.
        self.add_disk(spec.name, spec.boot_disk_gb);
        if let Some(boot) = self.disks.borrow_mut().get_mut(spec.name) {
            boot.users.push(spec.name.to_string());
        }
        self.instances.borrow_mut().insert(
            spec.name.to_string(),
            InstanceInfo {
                name: spec.name.to_string(),
                status: "RUNNING".to_string(),
                machine_type: spec.machine_type.to_string(),
                external_ip: spec.external_ip.then(|| "203.0.113.10".to_string()),
                internal_ip: Some("10.128.0.7".to_string()),
                disks: vec![AttachedDisk {
                    device_name: "persistent-disk-0".to_string(),
                    volume: VolumeId::from(spec.name),
                    boot: true,
                }],
            },
        );
        Ok(())
    }

    async fn describe_instance(&self, name: &str, _: &str) -> Result<InstanceInfo, InfraError> {
        self.log(format!("describe_instance {name}"));
        self.instances
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(format!("instance {name}")))
    }

    async fn start_instance(&self, name: &str, _: &str) -> Result<(), InfraError> {
        self.log(format!("start_instance {name}"));
        self.instances
            .borrow_mut()
            .get_mut(name)
            .map(|i| i.status = "RUNNING".to_string())
            .ok_or_else(|| not_found(format!("instance {name}")))
    }

    async fn stop_instance(&self, name: &str, _: &str) -> Result<(), InfraError> {
        self.log(format!("stop_instance {name}"));
        self.instances
            .borrow_mut()
            .get_mut(name)
            .map(|i| i.status = "TERMINATED".to_string())
            .ok_or_else(|| not_found(format!("instance {name}")))
    }

    async fn reset_instance(&self, name: &str, _: &str) -> Result<(), InfraError> {
        self.log(format!("reset_instance {name}"));
        Ok(())
    }

    async fn delete_instance(&self, name: &str, _: &str) -> Result<(), InfraError> {
        self.log(format!("delete_instance {name}"));
        if self.instances.borrow_mut().remove(name).is_none() {
            return Err(not_found(format!("instance {name}")));
        }
        for disk in self.disks.borrow_mut().values_mut() {
            disk.users.retain(|u| u != name);
        }
        Ok(())
    }

    async fn attach_disk(
        &self,
        name: &str,
        _: &str,
        disk: &VolumeId,
        device_name: &str,
    ) -> Result<(), InfraError> {
        self.log(format!("attach_disk {disk}"));
        if self.reject_attach.get() {
            return Err(InfraError::Permanent("device slot in use".to_string()));
        }
        let mut disks = self.disks.borrow_mut();
        let info = disks
            .get_mut(&disk.0)
            .ok_or_else(|| not_found(format!("disk {disk}")))?;
        info.users.push(name.to_string());
        self.instances
            .borrow_mut()
            .get_mut(name)
            .ok_or_else(|| not_found(format!("instance {name}")))?
            .disks
            .push(AttachedDisk {
                device_name: device_name.to_string(),
                volume: disk.clone(),
                boot: false,
            });
        Ok(())
    }

    async fn detach_disk(&self, name: &str, _: &str, disk: &VolumeId) -> Result<(), InfraError> {
        self.log(format!("detach_disk {disk}"));
        if let Some(info) = self.disks.borrow_mut().get_mut(&disk.0) {
            info.users.retain(|u| u != name);
        }
        if let Some(instance) = self.instances.borrow_mut().get_mut(name) {
            instance.disks.retain(|d| &d.volume != disk);
        }
        Ok(())
    }

    async fn set_startup_script(&self, name: &str, _: &str, _: &str) -> Result<(), InfraError> {
        self.log(format!("set_startup_script {name}"));
        Ok(())
    }
}

impl DiskApi for FakeCloud {
    async fn create_snapshot(
        &self,
        disk: &VolumeId,
        _: &str,
        id: &SnapshotId,
        description: Option<&str>,
    ) -> Result<(), InfraError> {
        self.log(format!("create_snapshot {id}"));
        let size_gb = self
            .disks
            .borrow()
            .get(&disk.0)
            .map(|d| d.size_gb)
            .ok_or_else(|| not_found(format!("disk {disk}")))?;
        self.snapshots.borrow_mut().insert(
            id.0.clone(),
            SnapshotInfo {
                id: id.clone(),
                source_volume: disk.clone(),
                created_at: Utc::now(),
                storage_locations: vec!["us".to_string()],
                size_gb,
                state: SnapshotState::Ready,
                description: description.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn describe_snapshot(&self, id: &SnapshotId) -> Result<SnapshotInfo, InfraError> {
        self.log(format!("describe_snapshot {id}"));
        self.snapshots
            .borrow()
            .get(&id.0)
            .cloned()
            .ok_or_else(|| not_found(format!("snapshot {id}")))
    }

    async fn list_snapshots(&self, prefix: &str) -> Result<Vec<SnapshotInfo>, InfraError> {
        self.log(format!("list_snapshots {prefix}"));
        Ok(self
            .snapshots
            .borrow()
            .values()
            .filter(|s| s.id.0.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_snapshot(&self, id: &SnapshotId) -> Result<(), InfraError> {
        self.log(format!("delete_snapshot {id}"));
        self.snapshots
            .borrow_mut()
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| not_found(format!("snapshot {id}")))
    }

    async fn create_disk(&self, spec: &DiskSpec<'_>) -> Result<(), InfraError> {
        self.log(format!("create_disk {}", spec.id));
        if self.has_disk(&spec.id.0) {
            return Err(InfraError::Conflict {
                resource: format!("disk {}", spec.id),
            });
        }
        self.add_disk(&spec.id.0, spec.size_gb);
        Ok(())
    }

    async fn describe_disk(&self, id: &VolumeId, _: &str) -> Result<DiskInfo, InfraError> {
        self.log(format!("describe_disk {id}"));
        self.disks
            .borrow()
            .get(&id.0)
            .cloned()
            .ok_or_else(|| not_found(format!("disk {id}")))
    }

    async fn delete_disk(&self, id: &VolumeId, _: &str) -> Result<(), InfraError> {
        self.log(format!("delete_disk {id}"));
        self.disks
            .borrow_mut()
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| not_found(format!("disk {id}")))
    }
}

// ── Remote host ───────────────────────────────────────────────────────────────

/// A remote host that refuses sessions for the first `unreachable_for`
/// readiness probes and runs every script successfully.
#[derive(Default)]
pub struct FakeHost {
    pub calls: RefCell<Vec<String>>,
    pub unreachable_for: Cell<u32>,
    /// Verification probes containing this text exit non-zero.
    pub failing_probe: RefCell<Option<String>>,
    /// Served as the idle monitor's status file; `None` means no file.
    pub idle: RefCell<Option<IdleStatus>>,
}

impl FakeHost {
    pub fn unreachable_for(attempts: u32) -> Self {
        let host = Self::default();
        host.unreachable_for.set(attempts);
        host
    }

    pub fn fail_probe_containing(&self, needle: &str) {
        *self.failing_probe.borrow_mut() = Some(needle.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl RemoteExecutor for FakeHost {
    async fn exec(
        &self,
        target: &RemoteTarget,
        command: &str,
    ) -> Result<RemoteOutput, RemoteError> {
        self.calls.borrow_mut().push(format!("exec {command}"));
        if command == "true" {
            let left = self.unreachable_for.get();
            if left > 0 {
                self.unreachable_for.set(left - 1);
                return Err(RemoteError::Connection {
                    target: target.to_string(),
                    reason: "Connection refused".to_string(),
                });
            }
            return Ok(RemoteOutput::default());
        }
        if command.starts_with("cat ") {
            return match &*self.idle.borrow() {
                Some(status) => Ok(RemoteOutput {
                    exit_code: 0,
                    stdout: serde_json::to_string(status).expect("serialize idle status"),
                    stderr: String::new(),
                }),
                None => Err(RemoteError::Command {
                    code: 1,
                    stdout: String::new(),
                    stderr: "No such file or directory".to_string(),
                }),
            };
        }
        let failing = self
            .failing_probe
            .borrow()
            .as_deref()
            .is_some_and(|needle| command.contains(needle));
        if failing {
            return Err(RemoteError::Command {
                code: 3,
                stdout: String::new(),
                stderr: "inactive".to_string(),
            });
        }
        Ok(RemoteOutput::default())
    }

    async fn run_script(&self, _: &RemoteTarget, _: &str) -> Result<RemoteOutput, RemoteError> {
        self.calls.borrow_mut().push("script".to_string());
        Ok(RemoteOutput::default())
    }
}

impl FileTransfer for FakeHost {
    async fn upload(&self, _: &RemoteTarget, _: &Path, remote: &str) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push(format!("upload {remote}"));
        Ok(())
    }
}

// ── State and progress ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemState {
    pub saved: RefCell<Option<StationState>>,
}

impl MemState {
    pub fn current(&self) -> StationState {
        self.saved.borrow().clone().unwrap_or_default()
    }
}

impl StationStateStore for MemState {
    async fn load_async(&self) -> Result<Option<StationState>> {
        Ok(self.saved.borrow().clone())
    }
    async fn save_async(&self, state: &StationState) -> Result<()> {
        *self.saved.borrow_mut() = Some(state.clone());
        Ok(())
    }
}

pub struct Quiet;

impl ProgressReporter for Quiet {
    fn step(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warn(&self, _: &str) {}
}
