//! Local orchestrator state persisted to `~/.stationctl/state.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::instance::{Instance, Snapshot, SnapshotId, Volume, VolumeId, VolumeRole};

/// What the orchestrator last knew about its instance and storage.
///
/// The platform stays authoritative; `status` reconciles this against
/// describe-instance before reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<Instance>,
    /// Volumes created by this tool, including detached ones kept after a restore.
    #[serde(default)]
    pub volumes: Vec<Volume>,
    /// Snapshots taken by this tool, oldest first.
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StationState {
    /// Insert or replace a volume record by id.
    pub fn record_volume(&mut self, volume: Volume) {
        if let Some(existing) = self.volumes.iter_mut().find(|v| v.id == volume.id) {
            *existing = volume;
        } else {
            self.volumes.push(volume);
        }
    }

    pub fn forget_volume(&mut self, id: &VolumeId) {
        self.volumes.retain(|v| &v.id != id);
    }

    pub fn record_snapshot(&mut self, snapshot: Snapshot) {
        self.snapshots.retain(|s| s.id != snapshot.id);
        self.snapshots.push(snapshot);
    }

    pub fn forget_snapshot(&mut self, id: &SnapshotId) {
        self.snapshots.retain(|s| &s.id != id);
    }

    /// The data volume recorded last. After a restore this is the restored
    /// volume, not the one it replaced.
    #[must_use]
    pub fn latest_data_volume(&self) -> Option<&Volume> {
        self.volumes.iter().rev().find(|v| v.role == VolumeRole::Data)
    }

    /// Volumes no live instance references.
    #[must_use]
    pub fn detached_volumes(&self) -> Vec<&Volume> {
        self.volumes
            .iter()
            .filter(|v| !self.instance.as_ref().is_some_and(|i| i.references(&v.id)))
            .collect()
    }
}
