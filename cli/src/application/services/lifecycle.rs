//! Lifecycle orchestrator: `create`, `start`, `stop`, `backup`, `restore`,
//! `delete`, `status` and `repair` composed from the disk, provisioning,
//! readiness and bootstrap services.
//!
//! Every failure is returned as a [`PipelineError`] naming the stage it came
//! from. Nothing is rolled back across stages: a snapshot or volume created
//! before a later failure stays in place for diagnosis and retry.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use station_common::IdleStatus;

use crate::application::ports::{
    FileTransfer, InfraApi, InstanceInfo, InstanceSpec, ProgressReporter, RemoteExecutor,
    RemoteTarget, StationStateStore,
};
use crate::application::services::bootstrap::{self, BootstrapReport};
use crate::application::services::disks;
use crate::application::services::provision::{ProvisionRequest, provision};
use crate::application::services::readiness::{PollPolicy, wait_for_remote};
use crate::domain::instance::{
    DATA_DEVICE_NAME, data_volume_name, restored_volume_name, snapshot_name,
};
use crate::domain::{
    AtStage, BootstrapPlan, DiskError, Instance, InstanceStatus, LifecycleError, PipelineError,
    Snapshot, SnapshotId, Stage, StationConfig, StationState, Volume, VolumeId, VolumeSource,
};

/// Checks while waiting for the platform to report an instance RUNNING.
const BOOT_POLL_ATTEMPTS: u32 = 60;
const BOOT_POLL_DELAY: Duration = Duration::from_secs(5);

/// Checks while waiting for a snapshot to become ready.
const SNAPSHOT_POLL_ATTEMPTS: u32 = 120;
const SNAPSHOT_POLL_DELAY: Duration = Duration::from_secs(5);

/// Result of a successful `create`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateReport {
    pub instance: Instance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotId>,
    pub data_volume: VolumeId,
    /// Attempts the readiness poller used before a remote session opened.
    pub readiness_attempts: u32,
    pub bootstrap: BootstrapReport,
}

/// Result of `restore`.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    /// Previous data volume, detached and kept.
    pub detached: Option<VolumeId>,
    pub attached: VolumeId,
    /// Whether the instance had to be stopped first.
    pub stopped: bool,
}

/// Result of `delete`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteReport {
    pub deleted: Vec<String>,
    /// Data volume left in place because deletion was not confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kept_data_volume: Option<VolumeId>,
}

/// Result of `status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub name: String,
    pub zone: String,
    pub status: InstanceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<Instance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle: Option<IdleStatus>,
    pub snapshots: usize,
}

/// The orchestrator. Configuration is read once by the caller and passed in.
pub struct Lifecycle<'a, A, R, S, P> {
    config: &'a StationConfig,
    api: &'a A,
    remote: &'a R,
    store: &'a S,
    reporter: &'a P,
    monitor_binary: PathBuf,
    boot_policy: PollPolicy,
    snapshot_policy: PollPolicy,
}

impl<'a, A, R, S, P> Lifecycle<'a, A, R, S, P>
where
    A: InfraApi,
    R: RemoteExecutor + FileTransfer,
    S: StationStateStore,
    P: ProgressReporter,
{
    pub fn new(
        config: &'a StationConfig,
        api: &'a A,
        remote: &'a R,
        store: &'a S,
        reporter: &'a P,
    ) -> Self {
        Self {
            config,
            api,
            remote,
            store,
            reporter,
            monitor_binary: PathBuf::from("station-idle-monitor"),
            boot_policy: PollPolicy::new(BOOT_POLL_ATTEMPTS, BOOT_POLL_DELAY),
            snapshot_policy: PollPolicy::new(SNAPSHOT_POLL_ATTEMPTS, SNAPSHOT_POLL_DELAY),
        }
    }

    /// Local idle monitor binary installed by the bootstrap.
    #[must_use]
    pub fn with_monitor_binary(mut self, path: PathBuf) -> Self {
        self.monitor_binary = path;
        self
    }

    /// Override the platform-side polling budgets (boot and snapshot).
    #[must_use]
    pub fn with_platform_polling(mut self, policy: PollPolicy) -> Self {
        self.boot_policy = policy;
        self.snapshot_policy = policy;
        self
    }

    fn name(&self) -> &str {
        &self.config.instance.name
    }

    fn zone(&self) -> &str {
        &self.config.instance.zone
    }

    fn readiness_policy(&self) -> PollPolicy {
        PollPolicy::from(&self.config.readiness)
    }

    /// Bootstrap steps for the configured instance.
    #[must_use]
    pub fn bootstrap_plan(&self) -> BootstrapPlan {
        BootstrapPlan {
            user: self.config.editor.user.clone(),
            editor_port: self.config.editor.port,
            idle: self.config.idle_monitor(),
            monitor_binary: self.monitor_binary.clone(),
        }
    }

    fn target(&self, instance: &Instance) -> RemoteTarget {
        RemoteTarget {
            instance: instance.name.clone(),
            zone: instance.zone.clone(),
            address: self
                .config
                .ssh
                .host
                .clone()
                .or_else(|| instance.external_ip.clone()),
        }
    }

    // ── state helpers ────────────────────────────────────────────────────────

    async fn load(&self) -> Result<StationState, PipelineError> {
        self.store
            .load_async()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| lifecycle_error(&e))
    }

    async fn save(&self, state: &mut StationState) -> Result<(), PipelineError> {
        state.updated_at = Some(Utc::now());
        self.store.save_async(state).await.map_err(|e| lifecycle_error(&e))
    }

    /// The recorded instance, reconciled against the platform.
    async fn existing_instance(
        &self,
        state: &mut StationState,
    ) -> Result<(Instance, InstanceInfo), PipelineError> {
        let name = self.name().to_string();
        let info = match self.api.describe_instance(&name, self.zone()).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => {
                return Err(LifecycleError::NoInstance(name)).at_stage(Stage::Lifecycle);
            }
            Err(e) => return Err(e).at_stage(Stage::Lifecycle),
        };
        let instance = self.adopt(state, &info, false);
        Ok((instance, info))
    }

    /// The recorded instance (or a fresh record) with `info` folded in.
    fn adopt(&self, state: &mut StationState, info: &InstanceInfo, counting: bool) -> Instance {
        let mut instance = state
            .instance
            .take()
            .filter(|i| i.name == self.name() && i.status != InstanceStatus::Deleted)
            .unwrap_or_else(|| Instance::planned(self.name(), self.zone(), &info.machine_type));
        reconcile(&mut instance, info, counting);
        instance
    }

    // ── create ───────────────────────────────────────────────────────────────

    /// Snapshot -> volume -> provision -> readiness -> bootstrap.
    ///
    /// With `fresh` the data volume starts empty instead of from a snapshot
    /// of the configured source disk. A data volume left by an earlier failed
    /// run is reused when nothing has it attached.
    ///
    /// # Errors
    ///
    /// Returns the first failing stage; earlier artifacts are kept.
    pub async fn create(&self, fresh: bool) -> Result<CreateReport, PipelineError> {
        let name = self.name().to_string();
        let zone = self.zone().to_string();
        let mut state = self.load().await?;

        match self.api.describe_instance(&name, &zone).await {
            Ok(_) => return Err(LifecycleError::AlreadyExists(name)).at_stage(Stage::Lifecycle),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e).at_stage(Stage::Lifecycle),
        }

        let data_id = VolumeId(data_volume_name(&name));
        let mut snapshot_id = None;
        let leftover = match self.api.describe_disk(&data_id, &zone).await {
            Ok(info) if info.users.is_empty() => Some(info),
            Ok(info) => {
                return Err(DiskError::InUse {
                    volume: data_id.to_string(),
                    users: info.users.join(", "),
                })
                .at_stage(Stage::Volume);
            }
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(DiskError::from(e)).at_stage(Stage::Volume),
        };

        if let Some(info) = leftover {
            self.reporter
                .warn(&format!("reusing data volume {data_id} from a previous run"));
            if !state.volumes.iter().any(|v| v.id == data_id) {
                state.record_volume(Volume::data(
                    data_id.clone(),
                    info.size_gb,
                    VolumeSource::Empty,
                ));
            }
        } else {
            let volume = if fresh {
                self.reporter.step("creating empty data volume...");
                let size_gb = self.config.instance.data_disk_gb;
                disks::create_empty_volume(self.api, &data_id, &zone, size_gb)
                    .await
                    .at_stage(Stage::Volume)?
            } else {
                let source = self
                    .config
                    .source
                    .disk
                    .as_deref()
                    .ok_or(LifecycleError::NoSource)
                    .at_stage(Stage::Snapshot)?;
                let source_zone = self.config.source.zone.as_deref().unwrap_or(&zone);
                let snap_id = SnapshotId(snapshot_name(&name, Utc::now()));
                self.reporter
                    .step(&format!("snapshotting {source} to {snap_id}..."));
                let snapshot = disks::create_snapshot(
                    self.api,
                    &VolumeId(source.to_string()),
                    source_zone,
                    &snap_id,
                    Some("stationctl create"),
                    self.snapshot_policy,
                )
                .await
                .at_stage(Stage::Snapshot)?;
                self.reporter.success(&format!("snapshot {snap_id} ready"));
                state.record_snapshot(snapshot);
                self.save(&mut state).await?;
                snapshot_id = Some(snap_id.clone());

                self.reporter
                    .step(&format!("creating data volume {data_id}..."));
                disks::create_volume_from_snapshot(
                    self.api,
                    &snap_id,
                    &data_id,
                    &zone,
                    self.config.instance.data_disk_gb,
                )
                .await
                .at_stage(Stage::Volume)?
            };
            self.reporter.success(&format!("data volume {data_id} ready"));
            state.record_volume(volume);
            self.save(&mut state).await?;
        }

        let cfg = &self.config.instance;
        let req = ProvisionRequest {
            spec: InstanceSpec {
                name: &name,
                zone: &zone,
                machine_type: &cfg.machine_type,
                image_family: &cfg.image_family,
                image_project: &cfg.image_project,
                boot_disk_gb: cfg.boot_disk_gb,
                tags: &cfg.tags,
                external_ip: cfg.external_ip,
            },
            data_volume: &data_id,
            boot_policy: self.boot_policy,
        };
        let mut instance = provision(self.api, &req, self.reporter)
            .await
            .at_stage(Stage::Provision)?;
        state.instance = Some(instance.clone());
        self.save(&mut state).await?;

        self.reporter.step("waiting for remote session...");
        let target = self.target(&instance);
        let readiness_attempts = wait_for_remote(self.remote, &target, self.readiness_policy())
            .await
            .at_stage(Stage::Readiness)?;
        self.reporter.success(&format!(
            "remote session available after {readiness_attempts} attempt(s)"
        ));

        let steps = self.bootstrap_plan().steps();
        let report = bootstrap::run_steps(self.remote, &target, &steps, self.reporter).await;
        instance.record_verified(&report.succeeded);
        if !report.is_success() {
            state.instance = Some(instance.clone());
            self.save(&mut state).await?;
        }
        let bootstrap = report.into_result().at_stage(Stage::Bootstrap)?;

        instance
            .transition(InstanceStatus::Ready)
            .at_stage(Stage::Lifecycle)?;
        state.instance = Some(instance.clone());
        self.save(&mut state).await?;

        Ok(CreateReport {
            instance,
            snapshot: snapshot_id,
            data_volume: data_id,
            readiness_attempts,
            bootstrap,
        })
    }

    // ── start / stop ─────────────────────────────────────────────────────────

    /// Start a stopped instance and wait for remote sessions. Bootstrap is not
    /// re-run. Returns the readiness attempts used.
    ///
    /// # Errors
    ///
    /// `Lifecycle` if the instance is missing or the start request fails,
    /// `Readiness` if sessions never open.
    pub async fn start(&self) -> Result<u32, PipelineError> {
        let mut state = self.load().await?;
        let (mut instance, info) = self.existing_instance(&mut state).await?;

        if info.status != "RUNNING" {
            instance
                .transition(InstanceStatus::Provisioning)
                .at_stage(Stage::Lifecycle)?;
            self.reporter.step(&format!("starting {}...", instance.name));
            self.api
                .start_instance(&instance.name, &instance.zone)
                .await
                .at_stage(Stage::Lifecycle)?;
            if let Ok(info) = self.api.describe_instance(&instance.name, &instance.zone).await {
                instance.external_ip = info.external_ip;
                instance.internal_ip = info.internal_ip;
            }
        }
        state.instance = Some(instance.clone());
        self.save(&mut state).await?;

        let target = self.target(&instance);
        let attempts = wait_for_remote(self.remote, &target, self.readiness_policy())
            .await
            .at_stage(Stage::Readiness)?;
        let bootstrapped = instance.is_bootstrapped(&self.bootstrap_plan().steps());
        if instance.status == InstanceStatus::Provisioning && bootstrapped {
            instance
                .transition(InstanceStatus::Ready)
                .at_stage(Stage::Lifecycle)?;
        }
        state.instance = Some(instance);
        self.save(&mut state).await?;
        if bootstrapped {
            self.reporter.success(&format!("{} is ready", self.name()));
        } else {
            self.reporter.warn(&format!(
                "{} is running but its bootstrap never completed; run `stationctl repair`",
                self.name()
            ));
        }
        Ok(attempts)
    }

    /// Stop the instance. Stopping a stopped instance succeeds.
    ///
    /// # Errors
    ///
    /// `Lifecycle` if the instance is missing or the stop request fails.
    pub async fn stop(&self) -> Result<(), PipelineError> {
        let mut state = self.load().await?;
        let (mut instance, info) = self.existing_instance(&mut state).await?;
        if InstanceStatus::from_platform(&info.status, false) != InstanceStatus::Stopped {
            self.reporter.step(&format!("stopping {}...", instance.name));
            self.api
                .stop_instance(&instance.name, &instance.zone)
                .await
                .at_stage(Stage::Lifecycle)?;
        }
        instance
            .transition(InstanceStatus::Stopped)
            .at_stage(Stage::Lifecycle)?;
        state.instance = Some(instance);
        self.save(&mut state).await?;
        self.reporter.success(&format!("{} stopped", self.name()));
        Ok(())
    }

    // ── backup / restore ─────────────────────────────────────────────────────

    /// Snapshot the data volume. The instance is not touched.
    ///
    /// # Errors
    ///
    /// `Lifecycle` if no data volume is known, `Snapshot` if snapshotting fails.
    pub async fn backup(&self, description: Option<&str>) -> Result<Snapshot, PipelineError> {
        let mut state = self.load().await?;
        let data = state
            .instance
            .as_ref()
            .filter(|i| i.status != InstanceStatus::Deleted)
            .and_then(|i| i.data_volume.clone())
            .or_else(|| state.latest_data_volume().map(|v| v.id.clone()))
            .ok_or_else(|| LifecycleError::NoDataVolume(self.name().to_string()))
            .at_stage(Stage::Lifecycle)?;
        let id = SnapshotId(snapshot_name(self.name(), Utc::now()));
        self.reporter.step(&format!("snapshotting {data} to {id}..."));
        let snapshot = disks::create_snapshot(
            self.api,
            &data,
            self.zone(),
            &id,
            description,
            self.snapshot_policy,
        )
        .await
        .at_stage(Stage::Snapshot)?;
        state.record_snapshot(snapshot.clone());
        self.save(&mut state).await?;
        self.reporter.success(&format!("backup {id} ready"));
        Ok(snapshot)
    }

    /// Replace the data volume with one restored from `snapshot`.
    ///
    /// A running instance is stopped first. The old volume is detached and
    /// kept. The instance is left stopped; `start` mounts the new volume.
    ///
    /// # Errors
    ///
    /// `Volume` if the new volume cannot be created, `Lifecycle` for the
    /// stop, detach and attach steps.
    pub async fn restore(&self, snapshot: &SnapshotId) -> Result<RestoreReport, PipelineError> {
        let mut state = self.load().await?;
        let (mut instance, info) = self.existing_instance(&mut state).await?;
        let name = instance.name.clone();
        let zone = instance.zone.clone();

        let snap = self
            .api
            .describe_snapshot(snapshot)
            .await
            .map_err(DiskError::from)
            .at_stage(Stage::Volume)?;
        let size_gb = self.config.instance.data_disk_gb.max(snap.size_gb);
        let new_id = VolumeId(restored_volume_name(&name, Utc::now()));
        self.reporter
            .step(&format!("creating volume {new_id} from {snapshot}..."));
        let volume = disks::create_volume_from_snapshot(self.api, snapshot, &new_id, &zone, size_gb)
            .await
            .at_stage(Stage::Volume)?;
        state.record_volume(volume);

        let stopped = InstanceStatus::from_platform(&info.status, false).is_running();
        if stopped {
            self.reporter.step(&format!("stopping {name}..."));
            self.api
                .stop_instance(&name, &zone)
                .await
                .at_stage(Stage::Lifecycle)?;
            instance
                .transition(InstanceStatus::Stopped)
                .at_stage(Stage::Lifecycle)?;
        }

        let current = info
            .disk_on_device(DATA_DEVICE_NAME)
            .cloned()
            .or_else(|| instance.data_volume.clone());
        if let Some(old) = &current {
            self.reporter.step(&format!("detaching {old}..."));
            match self.api.detach_disk(&name, &zone, old).await {
                Err(e) if !e.is_not_found() => return Err(e).at_stage(Stage::Lifecycle),
                _ => {}
            }
        }

        self.reporter.step(&format!("attaching {new_id}..."));
        self.api
            .attach_disk(&name, &zone, &new_id, DATA_DEVICE_NAME)
            .await
            .at_stage(Stage::Lifecycle)?;
        instance.data_volume = Some(new_id.clone());
        state.instance = Some(instance);
        self.save(&mut state).await?;

        self.reporter.success(&format!(
            "restored {snapshot} into {new_id}; run 'stationctl start' to mount it"
        ));
        Ok(RestoreReport {
            detached: current,
            attached: new_id,
            stopped,
        })
    }

    // ── delete ───────────────────────────────────────────────────────────────

    /// Best-effort teardown: instance, then boot volume, then (only when
    /// `delete_data`) the data volume.
    ///
    /// # Errors
    ///
    /// `Lifecycle` listing whatever could not be removed. Every step is still
    /// attempted.
    pub async fn delete(&self, delete_data: bool) -> Result<DeleteReport, PipelineError> {
        let name = self.name().to_string();
        let zone = self.zone().to_string();
        let mut state = self.load().await?;
        let mut report = DeleteReport::default();
        let mut remaining = Vec::new();

        let known = state.instance.clone().filter(|i| i.name == name);
        let info = self.api.describe_instance(&name, &zone).await.ok();
        // A create that failed before the record was saved leaves a boot
        // disk under the platform's default name.
        let boot = info
            .as_ref()
            .and_then(|i| i.boot_volume().cloned())
            .or_else(|| known.as_ref().and_then(|i| i.boot_volume.clone()))
            .unwrap_or_else(|| VolumeId(name.clone()));
        let data = info
            .as_ref()
            .and_then(|i| i.disk_on_device(DATA_DEVICE_NAME).cloned())
            .or_else(|| known.as_ref().and_then(|i| i.data_volume.clone()));

        self.reporter.step(&format!("deleting instance {name}..."));
        match self.api.delete_instance(&name, &zone).await {
            Ok(()) => report.deleted.push(format!("instance {name}")),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                self.reporter.warn(&format!("instance {name}: {e}"));
                remaining.push(format!("instance {name}"));
            }
        }

        match disks::delete_volume(self.api, &boot, &zone).await {
            Ok(removed) => {
                if removed {
                    report.deleted.push(format!("boot volume {boot}"));
                }
                state.forget_volume(&boot);
            }
            Err(e) => {
                self.reporter.warn(&format!("boot volume {boot}: {e}"));
                remaining.push(format!("boot volume {boot}"));
            }
        }

        match (&data, delete_data) {
            (Some(data), true) => match disks::delete_volume(self.api, data, &zone).await {
                Ok(removed) => {
                    if removed {
                        report.deleted.push(format!("data volume {data}"));
                    }
                    state.forget_volume(data);
                }
                Err(e) => {
                    self.reporter.warn(&format!("data volume {data}: {e}"));
                    remaining.push(format!("data volume {data}"));
                }
            },
            (Some(data), false) => report.kept_data_volume = Some(data.clone()),
            (None, _) => {}
        }

        let mut instance = known
            .unwrap_or_else(|| Instance::planned(&name, &zone, &self.config.instance.machine_type));
        if remaining.iter().all(|r| !r.starts_with("instance")) {
            instance.status = InstanceStatus::Deleted;
        }
        state.instance = Some(instance);
        self.save(&mut state).await?;

        if remaining.is_empty() {
            self.reporter.success(&format!("{name} deleted"));
            Ok(report)
        } else {
            Err(LifecycleError::DeleteIncomplete(remaining.join(", "))).at_stage(Stage::Lifecycle)
        }
    }

    // ── backups ──────────────────────────────────────────────────────────────

    /// Backups of this instance on the platform, newest first. The local
    /// record is refreshed to match.
    ///
    /// # Errors
    ///
    /// `Snapshot` on infrastructure failures.
    pub async fn snapshots(&self) -> Result<Vec<Snapshot>, PipelineError> {
        let snapshots = disks::list_snapshots(self.api, self.name())
            .await
            .at_stage(Stage::Snapshot)?;
        let mut state = self.load().await?;
        state.snapshots.clone_from(&snapshots);
        self.save(&mut state).await?;
        Ok(snapshots)
    }

    /// Delete one backup. Deleting a missing backup succeeds.
    ///
    /// # Errors
    ///
    /// `Snapshot` on infrastructure failures.
    pub async fn delete_snapshot(&self, id: &SnapshotId) -> Result<(), PipelineError> {
        disks::delete_snapshot(self.api, id)
            .await
            .at_stage(Stage::Snapshot)?;
        let mut state = self.load().await?;
        state.forget_snapshot(id);
        self.save(&mut state).await?;
        self.reporter.success(&format!("backup {id} deleted"));
        Ok(())
    }

    /// Where interactive sessions and tunnels connect. The instance must be
    /// running.
    ///
    /// # Errors
    ///
    /// `Lifecycle` if the instance is missing or not running.
    pub async fn session_target(&self) -> Result<RemoteTarget, PipelineError> {
        let mut state = self.load().await?;
        let (instance, info) = self.existing_instance(&mut state).await?;
        if info.status != "RUNNING" {
            return Err(LifecycleError::NotRunning(instance.name)).at_stage(Stage::Lifecycle);
        }
        Ok(self.target(&instance))
    }

    // ── status / repair ──────────────────────────────────────────────────────

    /// Reconcile the local record with the platform. For a running instance
    /// the idle monitor's status file decides between `Ready` and
    /// `IdleCountdown`; an unreadable file reads as `Ready`.
    ///
    /// # Errors
    ///
    /// `Lifecycle` on infrastructure or state failures.
    pub async fn status(&self) -> Result<StatusReport, PipelineError> {
        let name = self.name().to_string();
        let zone = self.zone().to_string();
        let mut state = self.load().await?;
        let snapshots = state.snapshots.len();

        let info = match self.api.describe_instance(&name, &zone).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => {
                let status = match &state.instance {
                    Some(i) if i.name == name && i.status != InstanceStatus::NotCreated => {
                        InstanceStatus::Deleted
                    }
                    _ => InstanceStatus::NotCreated,
                };
                return Ok(StatusReport {
                    name,
                    zone,
                    status,
                    platform_status: None,
                    instance: None,
                    idle: None,
                    snapshots,
                });
            }
            Err(e) => return Err(e).at_stage(Stage::Lifecycle),
        };

        let mut instance = self.adopt(&mut state, &info, false);
        let idle = if info.status == "RUNNING" {
            self.read_idle_status(&instance).await
        } else {
            None
        };
        if idle.as_ref().is_some_and(IdleStatus::is_counting) {
            reconcile(&mut instance, &info, true);
        }
        state.instance = Some(instance.clone());
        self.save(&mut state).await?;

        Ok(StatusReport {
            name,
            zone,
            status: instance.status,
            platform_status: Some(info.status),
            instance: Some(instance),
            idle,
            snapshots,
        })
    }

    async fn read_idle_status(&self, instance: &Instance) -> Option<IdleStatus> {
        let path = self.config.idle_monitor().status_file;
        let cmd = format!("cat {}", path.display());
        match self.remote.exec(&self.target(instance), &cmd).await {
            Ok(out) => serde_json::from_str(&out.stdout)
                .map_err(|e| tracing::debug!(error = %e, "unparseable idle status"))
                .ok(),
            Err(e) => {
                tracing::debug!(error = %e, "idle status unavailable");
                None
            }
        }
    }

    /// Re-run the idempotent bootstrap steps on a running instance.
    ///
    /// # Errors
    ///
    /// `Lifecycle` if the instance is not running, `Readiness` or `Bootstrap`
    /// as for `create`.
    pub async fn repair(&self) -> Result<BootstrapReport, PipelineError> {
        let mut state = self.load().await?;
        let (mut instance, info) = self.existing_instance(&mut state).await?;
        if info.status != "RUNNING" {
            return Err(LifecycleError::NotRunning(instance.name)).at_stage(Stage::Lifecycle);
        }
        let target = self.target(&instance);
        state.instance = Some(instance.clone());
        self.save(&mut state).await?;
        wait_for_remote(self.remote, &target, self.readiness_policy())
            .await
            .at_stage(Stage::Readiness)?;
        let steps = self.bootstrap_plan().steps();
        let report = bootstrap::repair(self.remote, &target, &steps, self.reporter).await;
        instance.record_verified(&report.succeeded);
        // A non-idempotent step that never verified keeps the station out of Ready.
        if instance.status == InstanceStatus::Provisioning && instance.is_bootstrapped(&steps) {
            instance
                .transition(InstanceStatus::Ready)
                .at_stage(Stage::Lifecycle)?;
        }
        state.instance = Some(instance);
        self.save(&mut state).await?;
        report.into_result().at_stage(Stage::Bootstrap)
    }
}

/// Fold platform facts into the model. The platform is authoritative: an
/// instance the idle monitor powered off is `Stopped` even if the local
/// record says `Ready`.
fn reconcile(instance: &mut Instance, info: &InstanceInfo, counting: bool) {
    let observed = match InstanceStatus::from_platform(&info.status, counting) {
        // Booted but never reached Ready in this record: stays provisioning.
        InstanceStatus::Ready if instance.status == InstanceStatus::Provisioning => {
            InstanceStatus::Provisioning
        }
        s => s,
    };
    if let Err(e) = instance.transition(observed) {
        tracing::debug!(error = %e, "adopting platform status");
        instance.status = observed;
    }
    instance.external_ip.clone_from(&info.external_ip);
    instance.internal_ip.clone_from(&info.internal_ip);
    if let Some(boot) = info.boot_volume() {
        instance.boot_volume = Some(boot.clone());
    }
    if let Some(data) = info.disk_on_device(DATA_DEVICE_NAME) {
        instance.data_volume = Some(data.clone());
    }
}

fn lifecycle_error(e: &anyhow::Error) -> PipelineError {
    PipelineError {
        stage: Stage::Lifecycle,
        kind: crate::domain::ErrorKind::PermanentInfra,
        cause: format!("{e:#}").into(),
    }
}
