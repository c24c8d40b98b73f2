//! End-to-end lifecycle scenarios against the in-memory cloud and host.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::Utc;
use station_common::{IdleStatus, IdleTracker, Sample};
use stationctl::application::Lifecycle;
use stationctl::domain::bootstrap::{STEP_EDITOR, STEP_IDLE_MONITOR};
use stationctl::domain::{
    BootstrapFailure, DiskError, ErrorKind, InstanceStatus, LifecycleError, Stage, StationConfig,
};

use crate::fakes::{FakeCloud, FakeHost, MemState, Quiet, SOURCE_DISK, config, fast_polling};

fn lifecycle<'a>(
    cfg: &'a StationConfig,
    cloud: &'a FakeCloud,
    host: &'a FakeHost,
    state: &'a MemState,
) -> Lifecycle<'a, FakeCloud, FakeHost, MemState, Quiet> {
    Lifecycle::new(cfg, cloud, host, state, &Quiet).with_platform_polling(fast_polling())
}

// ── create ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_runs_every_stage_and_reports_readiness_attempts() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::unreachable_for(2);
    let state = MemState::default();

    let report = lifecycle(&cfg, &cloud, &host, &state)
        .create(false)
        .await
        .expect("create");

    assert_eq!(report.readiness_attempts, 3);
    assert_eq!(report.instance.status, InstanceStatus::Ready);
    assert_eq!(report.data_volume.0, "dev-data");
    assert_eq!(report.bootstrap.succeeded.len(), 4);
    let snapshot = report.snapshot.expect("snapshot taken");
    assert!(snapshot.0.starts_with("dev-backup-"));

    // Snapshot before volume, volume before instance.
    let snap = cloud.position(&format!("create_snapshot {snapshot}")).unwrap();
    let disk = cloud.position("create_disk dev-data").unwrap();
    let inst = cloud.position("create_instance dev").unwrap();
    assert!(snap < disk && disk < inst);

    let saved = state.current();
    assert_eq!(saved.instance.map(|i| i.status), Some(InstanceStatus::Ready));
    assert_eq!(saved.snapshots.len(), 1);
    assert!(saved.volumes.iter().any(|v| v.id.0 == "dev-data"));
}

#[tokio::test]
async fn create_fresh_skips_the_snapshot() {
    let mut cfg = config();
    cfg.source.disk = None;
    let cloud = FakeCloud::default();
    let host = FakeHost::default();
    let state = MemState::default();

    let report = lifecycle(&cfg, &cloud, &host, &state)
        .create(true)
        .await
        .expect("create --fresh");

    assert!(report.snapshot.is_none());
    assert!(cloud.calls_starting_with("create_snapshot").is_empty());
    assert_eq!(cloud.calls_starting_with("create_disk"), ["create_disk dev-data"]);
}

#[tokio::test]
async fn create_without_source_fails_in_snapshot_stage() {
    let mut cfg = config();
    cfg.source.disk = None;
    let cloud = FakeCloud::default();
    let host = FakeHost::default();
    let state = MemState::default();

    let err = lifecycle(&cfg, &cloud, &host, &state)
        .create(false)
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Snapshot);
    assert_eq!(err.exit_code(), 10);
    assert!(matches!(
        err.cause_as::<LifecycleError>(),
        Some(LifecycleError::NoSource)
    ));
    assert!(cloud.calls_starting_with("create_").is_empty());
}

#[tokio::test]
async fn create_with_missing_source_disk_names_the_disk() {
    let cfg = config();
    let cloud = FakeCloud::default();
    let host = FakeHost::default();
    let state = MemState::default();

    let err = lifecycle(&cfg, &cloud, &host, &state)
        .create(false)
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Snapshot);
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(err.to_string().contains(SOURCE_DISK), "{err}");
}

#[tokio::test]
async fn create_refuses_an_existing_instance() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    let state = MemState::default();
    lifecycle(&cfg, &cloud, &host, &state).create(false).await.unwrap();
    cloud.forget_calls();

    let err = lifecycle(&cfg, &cloud, &host, &state)
        .create(false)
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Lifecycle);
    assert_eq!(err.kind, ErrorKind::ResourceConflict);
    assert!(cloud.calls_starting_with("create_").is_empty());
}

#[tokio::test]
async fn failed_editor_step_stops_bootstrap_before_the_monitor() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    host.fail_probe_containing("code-server@");
    let state = MemState::default();

    let err = lifecycle(&cfg, &cloud, &host, &state)
        .create(false)
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Bootstrap);
    assert_eq!(err.exit_code(), 14);
    let failure = err.cause_as::<BootstrapFailure>().expect("bootstrap failure");
    assert_eq!(failure.step, STEP_EDITOR);
    assert_eq!(failure.ordinal, 3);
    assert_eq!(failure.succeeded.len(), 2);

    let remote = host.calls();
    assert!(!remote.iter().any(|c| c.starts_with("upload")), "{remote:?}");
    assert!(
        !remote.iter().any(|c| c.contains("station-idle-monitor.service")),
        "{STEP_IDLE_MONITOR} must not run: {remote:?}"
    );

    // Provisioned resources stay for diagnosis; the instance never reached Ready.
    assert!(cloud.has_instance("dev"));
    assert!(cloud.calls_starting_with("delete_").is_empty());
    let saved = state.current().instance.expect("instance recorded");
    assert_eq!(saved.status, InstanceStatus::Provisioning);
}

#[tokio::test]
async fn failed_attach_deletes_the_partial_instance_and_boot_disk_but_keeps_the_volume() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    cloud.reject_attach.set(true);
    let host = FakeHost::default();
    let state = MemState::default();

    let err = lifecycle(&cfg, &cloud, &host, &state)
        .create(false)
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Provision);
    assert_eq!(err.exit_code(), 12);
    assert!(!cloud.has_instance("dev"));
    assert!(!cloud.has_disk("dev"));
    assert!(cloud.has_disk("dev-data"));
    assert_eq!(state.current().snapshots.len(), 1);
}

#[tokio::test]
async fn create_reuses_a_leftover_data_volume() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    let state = MemState::default();
    let lc = lifecycle(&cfg, &cloud, &host, &state);
    lc.create(false).await.unwrap();
    lc.delete(false).await.unwrap();
    cloud.forget_calls();

    let report = lc.create(false).await.expect("second create");

    assert_eq!(report.data_volume.0, "dev-data");
    assert!(report.snapshot.is_none());
    assert!(cloud.calls_starting_with("create_snapshot").is_empty());
    assert!(cloud.calls_starting_with("create_disk").is_empty());
    assert_eq!(cloud.calls_starting_with("attach_disk"), ["attach_disk dev-data"]);
}

#[tokio::test]
async fn create_refuses_a_data_volume_attached_elsewhere() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    cloud.add_disk("dev-data", 200);
    if let Some(disk) = cloud.disks.borrow_mut().get_mut("dev-data") {
        disk.users.push("someone-else".to_string());
    }
    let host = FakeHost::default();
    let state = MemState::default();

    let err = lifecycle(&cfg, &cloud, &host, &state)
        .create(false)
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Volume);
    assert!(matches!(err.cause_as::<DiskError>(), Some(DiskError::InUse { .. })));
}

// ── restore ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn restore_detaches_before_attaching_and_deletes_nothing() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    let state = MemState::default();
    let lc = lifecycle(&cfg, &cloud, &host, &state);
    let created = lc.create(false).await.unwrap();
    let snapshot = created.snapshot.unwrap();
    cloud.forget_calls();

    let report = lc.restore(&snapshot).await.expect("restore");

    assert!(report.stopped);
    assert_eq!(report.detached.as_ref().map(|v| v.0.as_str()), Some("dev-data"));
    assert!(report.attached.0.starts_with("dev-data-"));
    let stop = cloud.position("stop_instance dev").unwrap();
    let detach = cloud.position("detach_disk dev-data").unwrap();
    let attach = cloud.position(&format!("attach_disk {}", report.attached)).unwrap();
    assert!(stop < detach && detach < attach);
    assert!(cloud.calls_starting_with("delete_").is_empty());
    assert!(cloud.has_disk("dev-data"));

    let saved = state.current();
    let instance = saved.instance.as_ref().unwrap();
    assert_eq!(instance.status, InstanceStatus::Stopped);
    assert_eq!(instance.data_volume.as_ref(), Some(&report.attached));
    let detached: Vec<_> = saved.detached_volumes().iter().map(|v| v.id.0.clone()).collect();
    assert_eq!(detached, ["dev-data"]);
}

#[tokio::test]
async fn restore_of_unknown_snapshot_fails_before_touching_the_instance() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    let state = MemState::default();
    let lc = lifecycle(&cfg, &cloud, &host, &state);
    lc.create(false).await.unwrap();
    cloud.forget_calls();

    let err = lc.restore(&"dev-backup-missing".into()).await.unwrap_err();

    assert_eq!(err.stage, Stage::Volume);
    assert!(cloud.calls_starting_with("stop_instance").is_empty());
    assert!(cloud.calls_starting_with("detach_disk").is_empty());
}

// ── delete ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_removes_instance_then_boot_and_keeps_data_by_default() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    let state = MemState::default();
    let lc = lifecycle(&cfg, &cloud, &host, &state);
    lc.create(false).await.unwrap();
    cloud.forget_calls();

    let report = lc.delete(false).await.expect("delete");

    assert_eq!(
        cloud.calls_starting_with("delete_"),
        ["delete_instance dev", "delete_disk dev"]
    );
    assert_eq!(report.kept_data_volume.map(|v| v.0), Some("dev-data".to_string()));
    assert!(cloud.has_disk("dev-data"));
    assert_eq!(
        state.current().instance.map(|i| i.status),
        Some(InstanceStatus::Deleted)
    );
}

#[tokio::test]
async fn delete_with_data_removes_the_data_volume_last() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    let state = MemState::default();
    let lc = lifecycle(&cfg, &cloud, &host, &state);
    lc.create(false).await.unwrap();
    cloud.forget_calls();

    let report = lc.delete(true).await.expect("delete --data");

    assert_eq!(
        cloud.calls_starting_with("delete_"),
        ["delete_instance dev", "delete_disk dev", "delete_disk dev-data"]
    );
    assert!(report.kept_data_volume.is_none());
    assert!(!cloud.has_disk("dev-data"));
    assert!(cloud.has_disk(SOURCE_DISK));
}

#[tokio::test]
async fn delete_twice_succeeds() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    let state = MemState::default();
    let lc = lifecycle(&cfg, &cloud, &host, &state);
    lc.create(false).await.unwrap();
    lc.delete(true).await.unwrap();
    cloud.forget_calls();

    lc.delete(true).await.expect("second delete");

    assert!(cloud.calls_starting_with("delete_disk").is_empty());
}

#[tokio::test]
async fn delete_with_nothing_created_succeeds() {
    let cfg = config();
    let cloud = FakeCloud::default();
    let host = FakeHost::default();
    let state = MemState::default();

    let report = lifecycle(&cfg, &cloud, &host, &state)
        .delete(true)
        .await
        .expect("delete");

    assert!(report.deleted.is_empty());
}

// ── start / stop / status ─────────────────────────────────────────────────────

#[tokio::test]
async fn stop_then_start_waits_for_remote_sessions() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    let state = MemState::default();
    let lc = lifecycle(&cfg, &cloud, &host, &state);
    lc.create(false).await.unwrap();

    lc.stop().await.expect("stop");
    lc.stop().await.expect("stop is idempotent");
    assert_eq!(cloud.calls_starting_with("stop_instance").len(), 1);

    host.unreachable_for.set(1);
    let attempts = lc.start().await.expect("start");
    assert_eq!(attempts, 2);
    assert_eq!(
        state.current().instance.map(|i| i.status),
        Some(InstanceStatus::Ready)
    );
}

#[tokio::test]
async fn start_keeps_a_half_bootstrapped_station_provisioning_until_repair() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    host.fail_probe_containing("code-server@");
    let state = MemState::default();
    let lc = lifecycle(&cfg, &cloud, &host, &state);
    lc.create(false).await.unwrap_err();
    *host.failing_probe.borrow_mut() = None;

    lc.start().await.expect("start");
    let saved = state.current().instance.expect("instance recorded");
    assert_eq!(saved.status, InstanceStatus::Provisioning);
    assert!(!saved.verified_steps.iter().any(|s| s == STEP_EDITOR));
    assert_eq!(lc.status().await.unwrap().status, InstanceStatus::Provisioning);

    lc.repair().await.expect("repair");
    assert_eq!(
        state.current().instance.map(|i| i.status),
        Some(InstanceStatus::Ready)
    );
    assert_eq!(lc.status().await.unwrap().status, InstanceStatus::Ready);
}

#[tokio::test]
async fn start_without_instance_is_a_lifecycle_error() {
    let cfg = config();
    let cloud = FakeCloud::default();
    let host = FakeHost::default();
    let state = MemState::default();

    let err = lifecycle(&cfg, &cloud, &host, &state).start().await.unwrap_err();

    assert_eq!(err.stage, Stage::Lifecycle);
    assert_eq!(err.exit_code(), 15);
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn status_follows_the_platform_after_idle_shutdown() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    let state = MemState::default();
    let lc = lifecycle(&cfg, &cloud, &host, &state);
    lc.create(false).await.unwrap();

    cloud.set_status("dev", "TERMINATED");
    let report = lc.status().await.expect("status");

    assert_eq!(report.status, InstanceStatus::Stopped);
    assert_eq!(report.platform_status.as_deref(), Some("TERMINATED"));
    assert!(report.idle.is_none());
}

#[tokio::test]
async fn status_reports_idle_countdown_from_the_monitor() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    let state = MemState::default();
    let lc = lifecycle(&cfg, &cloud, &host, &state);
    lc.create(false).await.unwrap();

    let mut tracker = IdleTracker::new(5, 120);
    tracker.observe(Sample::Sessions(0));
    let now = Utc::now();
    *host.idle.borrow_mut() = Some(IdleStatus::from_tracker(&tracker, now, now));

    let report = lc.status().await.expect("status");
    assert_eq!(report.status, InstanceStatus::IdleCountdown);
    assert_eq!(report.idle.map(|i| i.idle_minutes()), Some(5));

    *host.idle.borrow_mut() = None;
    let report = lc.status().await.expect("status");
    assert_eq!(report.status, InstanceStatus::Ready);
}

#[tokio::test]
async fn status_of_a_missing_instance_is_not_created() {
    let cfg = config();
    let cloud = FakeCloud::default();
    let host = FakeHost::default();
    let state = MemState::default();

    let report = lifecycle(&cfg, &cloud, &host, &state).status().await.unwrap();

    assert_eq!(report.status, InstanceStatus::NotCreated);
    assert!(report.instance.is_none());
}

// ── backups / repair ──────────────────────────────────────────────────────────

#[tokio::test]
async fn backup_lists_newest_first_and_deletes_idempotently() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    let state = MemState::default();
    let lc = lifecycle(&cfg, &cloud, &host, &state);
    lc.create(false).await.unwrap();

    let backup = lc.backup(Some("before upgrade")).await.expect("backup");
    assert_eq!(backup.source_volume.0, "dev-data");
    assert_eq!(backup.description.as_deref(), Some("before upgrade"));

    let listed = lc.snapshots().await.expect("list");
    assert!(!listed.is_empty());
    assert!(listed.windows(2).all(|w| w[0].created_at >= w[1].created_at));

    lc.delete_snapshot(&backup.id).await.expect("delete");
    lc.delete_snapshot(&backup.id).await.expect("delete again");
    assert!(!state.current().snapshots.iter().any(|s| s.id == backup.id));
}

#[tokio::test]
async fn backup_after_delete_uses_the_restored_data_volume() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    let state = MemState::default();
    let lc = lifecycle(&cfg, &cloud, &host, &state);
    let created = lc.create(false).await.unwrap();
    let restored = lc.restore(&created.snapshot.unwrap()).await.unwrap().attached;
    lc.delete(false).await.unwrap();

    let backup = lc.backup(None).await.expect("backup of the kept volume");

    assert_eq!(backup.source_volume, restored);
    assert!(cloud.has_disk(&restored.0));
}

#[tokio::test]
async fn repair_reruns_only_idempotent_steps() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    let state = MemState::default();
    let lc = lifecycle(&cfg, &cloud, &host, &state);
    lc.create(false).await.unwrap();

    let report = lc.repair().await.expect("repair");

    assert_eq!(report.succeeded.len(), 3);
    assert!(!report.succeeded.iter().any(|s| s == "install-container-runtime"));
}

#[tokio::test]
async fn repair_needs_a_running_instance() {
    let cfg = config();
    let cloud = FakeCloud::with_source_disk();
    let host = FakeHost::default();
    let state = MemState::default();
    let lc = lifecycle(&cfg, &cloud, &host, &state);
    lc.create(false).await.unwrap();
    lc.stop().await.unwrap();

    let err = lc.repair().await.unwrap_err();

    assert_eq!(err.stage, Stage::Lifecycle);
    assert!(matches!(
        err.cause_as::<LifecycleError>(),
        Some(LifecycleError::NotRunning(_))
    ));
}
