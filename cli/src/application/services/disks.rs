//! Snapshot and volume management.
//!
//! Creation calls block until the resource is usable. Deletes are idempotent:
//! an absent resource is success, so cleanup can always be re-run after a
//! partial failure.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::fmt;

use crate::application::ports::{DiskApi, DiskSpec, SnapshotState};
use crate::application::services::readiness::{PollPolicy, Retryable, poll};
use crate::domain::instance::snapshot_prefix;
use crate::domain::{
    DiskError, InfraError, ReadinessError, Snapshot, SnapshotId, Volume, VolumeId, VolumeSource,
};

/// Why a snapshot is not usable yet.
enum SnapshotWait {
    Pending,
    Failed(String),
    Infra(InfraError),
}

impl Retryable for SnapshotWait {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Pending => true,
            Self::Failed(_) => false,
            Self::Infra(e) => e.is_retryable(),
        }
    }
}

impl fmt::Display for SnapshotWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("snapshot still being created"),
            Self::Failed(id) => write!(f, "snapshot {id} failed"),
            Self::Infra(e) => write!(f, "{e}"),
        }
    }
}

/// Snapshot `source` and wait until the snapshot is ready.
///
/// # Errors
///
/// [`DiskError::SourceUnavailable`] if the source volume does not exist;
/// [`DiskError::SnapshotNotReady`] if it never becomes ready within `policy`.
pub async fn create_snapshot(
    api: &impl DiskApi,
    source: &VolumeId,
    zone: &str,
    id: &SnapshotId,
    description: Option<&str>,
    policy: PollPolicy,
) -> Result<Snapshot, DiskError> {
    match api.describe_disk(source, zone).await {
        Ok(_) => {}
        Err(e) if e.is_not_found() => return Err(DiskError::SourceUnavailable(source.to_string())),
        Err(e) => return Err(e.into()),
    }

    tracing::info!(%source, snapshot = %id, "creating snapshot");
    api.create_snapshot(source, zone, id, description).await?;

    let polled = poll(policy, |_| async move {
        match api.describe_snapshot(id).await {
            Ok(info) => match info.state {
                SnapshotState::Ready => Ok(info),
                SnapshotState::Creating => Err(SnapshotWait::Pending),
                SnapshotState::Failed => Err(SnapshotWait::Failed(id.to_string())),
            },
            Err(e) => Err(SnapshotWait::Infra(e)),
        }
    })
    .await
    .map_err(|e| match e {
        ReadinessError::Exhausted { attempts, .. } => DiskError::SnapshotNotReady {
            snapshot: id.to_string(),
            attempts,
        },
        ReadinessError::Aborted { error, .. } => DiskError::Infra(InfraError::Permanent(error)),
    })?;

    Ok(polled.value.into_snapshot())
}

/// Materialize a writable data volume from `snapshot`.
///
/// # Errors
///
/// [`DiskError::SizeTooSmall`] if `size_gb` is below the snapshot's size.
pub async fn create_volume_from_snapshot(
    api: &impl DiskApi,
    snapshot: &SnapshotId,
    id: &VolumeId,
    zone: &str,
    size_gb: u64,
) -> Result<Volume, DiskError> {
    let info = api.describe_snapshot(snapshot).await?;
    if size_gb < info.size_gb {
        return Err(DiskError::SizeTooSmall {
            snapshot: snapshot.to_string(),
            requested_gb: size_gb,
            required_gb: info.size_gb,
        });
    }
    let source = VolumeSource::Snapshot(snapshot.clone());
    tracing::info!(volume = %id, %snapshot, size_gb, "creating volume from snapshot");
    api.create_disk(&DiskSpec {
        id,
        zone,
        size_gb,
        source: &source,
    })
    .await?;
    Ok(Volume::data(id.clone(), size_gb, source))
}

/// Create an empty data volume. The first-boot payload formats it.
///
/// # Errors
///
/// Propagates infrastructure failures.
pub async fn create_empty_volume(
    api: &impl DiskApi,
    id: &VolumeId,
    zone: &str,
    size_gb: u64,
) -> Result<Volume, DiskError> {
    tracing::info!(volume = %id, size_gb, "creating empty volume");
    api.create_disk(&DiskSpec {
        id,
        zone,
        size_gb,
        source: &VolumeSource::Empty,
    })
    .await?;
    Ok(Volume::data(id.clone(), size_gb, VolumeSource::Empty))
}

/// Delete a volume. Absent volumes are a no-op. Returns whether a volume
/// was removed.
///
/// # Errors
///
/// [`DiskError::InUse`] while any instance has the volume attached.
pub async fn delete_volume(
    api: &impl DiskApi,
    id: &VolumeId,
    zone: &str,
) -> Result<bool, DiskError> {
    let info = match api.describe_disk(id, zone).await {
        Ok(info) => info,
        Err(e) if e.is_not_found() => {
            tracing::debug!(volume = %id, "volume already absent");
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };
    if !info.users.is_empty() {
        return Err(DiskError::InUse {
            volume: id.to_string(),
            users: info.users.join(", "),
        });
    }
    match api.delete_disk(id, zone).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Delete a snapshot. Absent snapshots are a no-op.
///
/// # Errors
///
/// Propagates infrastructure failures other than not-found.
pub async fn delete_snapshot(api: &impl DiskApi, id: &SnapshotId) -> Result<(), DiskError> {
    match api.delete_snapshot(id).await {
        Err(e) if !e.is_not_found() => Err(e.into()),
        _ => Ok(()),
    }
}

/// All backups of `instance`, newest first.
///
/// # Errors
///
/// Propagates infrastructure failures.
pub async fn list_snapshots(
    api: &impl DiskApi,
    instance: &str,
) -> Result<Vec<Snapshot>, DiskError> {
    let mut snapshots: Vec<Snapshot> = api
        .list_snapshots(&snapshot_prefix(instance))
        .await?
        .into_iter()
        .map(crate::application::ports::SnapshotInfo::into_snapshot)
        .collect();
    snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(snapshots)
}
