//! Instance, volume and snapshot model plus the status state machine.
//!
//! Pure types only. Status changes go through [`Instance::transition`] so an
//! illegal move is a typed error instead of a silently overwritten field.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::bootstrap::BootstrapStep;
use crate::domain::error::TransitionError;

/// Device name the data volume is attached under (`/dev/disk/by-id/google-<name>`).
pub const DATA_DEVICE_NAME: &str = "station-data";

/// Canonical mount path of the data volume on the instance.
pub const DATA_MOUNT_PATH: &str = "/mnt/station-data";

// ── Status ───────────────────────────────────────────────────────────────────

/// Lifecycle status of the managed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceStatus {
    NotCreated,
    Provisioning,
    Ready,
    IdleCountdown,
    Stopped,
    Deleted,
}

impl InstanceStatus {
    /// Whether `self -> next` is a legal move.
    ///
    /// Transitions only go forward except `Stopped -> Provisioning` (restart)
    /// and `Ready <-> IdleCountdown`. Staying put is always allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use InstanceStatus::{Deleted, IdleCountdown, NotCreated, Provisioning, Ready, Stopped};
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (NotCreated, Provisioning)
                | (Provisioning, Ready | Stopped | Deleted)
                | (Ready, IdleCountdown | Stopped | Deleted)
                | (IdleCountdown, Ready | Stopped | Deleted)
                | (Stopped, Provisioning | Deleted)
        )
    }

    /// True when the instance is up (remote sessions possible).
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Provisioning | Self::Ready | Self::IdleCountdown)
    }

    /// Map a platform status string onto the model.
    ///
    /// `counting` reports whether the idle monitor is in a countdown; it is
    /// only consulted for a running instance.
    #[must_use]
    pub fn from_platform(status: &str, counting: bool) -> Self {
        match status {
            "PROVISIONING" | "STAGING" => Self::Provisioning,
            "RUNNING" if counting => Self::IdleCountdown,
            "RUNNING" => Self::Ready,
            "STOPPING" | "STOPPED" | "TERMINATED" | "SUSPENDING" | "SUSPENDED" => Self::Stopped,
            _ => Self::NotCreated,
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotCreated => "not-created",
            Self::Provisioning => "provisioning",
            Self::Ready => "ready",
            Self::IdleCountdown => "idle-countdown",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
        })
    }
}

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Platform name of a block-storage volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeId(pub String);

/// Platform name of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub String);

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&str> for SnapshotId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── Volumes and snapshots ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeRole {
    Boot,
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "snapshot")]
pub enum VolumeSource {
    Empty,
    Snapshot(SnapshotId),
}

/// A persisted block-storage unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: VolumeId,
    pub size_gb: u64,
    pub source: VolumeSource,
    pub role: VolumeRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_path: Option<String>,
}

impl Volume {
    #[must_use]
    pub fn data(id: VolumeId, size_gb: u64, source: VolumeSource) -> Self {
        Self {
            id,
            size_gb,
            source,
            role: VolumeRole::Data,
            mount_path: Some(DATA_MOUNT_PATH.to_string()),
        }
    }
}

/// An immutable point-in-time copy of a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub source_volume: VolumeId,
    pub created_at: DateTime<Utc>,
    /// Storage location (multi-region or region) reported by the platform.
    #[serde(default)]
    pub storage_location: Option<String>,
    /// Logical size of the source volume at snapshot time.
    pub size_gb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ── Instance ─────────────────────────────────────────────────────────────────

/// The managed compute resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub zone: String,
    pub machine_type: String,
    pub status: InstanceStatus,
    #[serde(default)]
    pub boot_volume: Option<VolumeId>,
    #[serde(default)]
    pub data_volume: Option<VolumeId>,
    #[serde(default)]
    pub external_ip: Option<String>,
    #[serde(default)]
    pub internal_ip: Option<String>,
    /// Bootstrap steps that have verified on this instance.
    #[serde(default)]
    pub verified_steps: Vec<String>,
}

impl Instance {
    #[must_use]
    pub fn planned(name: &str, zone: &str, machine_type: &str) -> Self {
        Self {
            name: name.to_string(),
            zone: zone.to_string(),
            machine_type: machine_type.to_string(),
            status: InstanceStatus::NotCreated,
            boot_volume: None,
            data_volume: None,
            external_ip: None,
            internal_ip: None,
            verified_steps: Vec::new(),
        }
    }

    /// Remember steps that verified; duplicates are ignored.
    pub fn record_verified(&mut self, steps: &[String]) {
        for step in steps {
            if !self.verified_steps.contains(step) {
                self.verified_steps.push(step.clone());
            }
        }
    }

    /// Whether every step of `plan` has verified at some point.
    #[must_use]
    pub fn is_bootstrapped(&self, plan: &[BootstrapStep]) -> bool {
        plan.iter().all(|s| self.verified_steps.contains(&s.name))
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the move is not allowed from the
    /// current status; the status is left unchanged.
    pub fn transition(&mut self, next: InstanceStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Whether `volume` is currently attached to this instance.
    #[must_use]
    pub fn references(&self, volume: &VolumeId) -> bool {
        self.status != InstanceStatus::Deleted
            && (self.boot_volume.as_ref() == Some(volume)
                || self.data_volume.as_ref() == Some(volume))
    }
}

// ── Naming ───────────────────────────────────────────────────────────────────

/// Name of the data volume created for `instance`.
#[must_use]
pub fn data_volume_name(instance: &str) -> String {
    format!("{instance}-data")
}

/// Name of a data volume restored from a snapshot. Timestamped so it never
/// collides with the volume it replaces.
#[must_use]
pub fn restored_volume_name(instance: &str, at: DateTime<Utc>) -> String {
    format!("{instance}-data-{}", at.format("%Y%m%d-%H%M%S"))
}

/// Prefix shared by every backup of `instance`.
#[must_use]
pub fn snapshot_prefix(instance: &str) -> String {
    format!("{instance}-backup-")
}

/// Name of a backup of `instance` taken at `at`.
#[must_use]
pub fn snapshot_name(instance: &str, at: DateTime<Utc>) -> String {
    format!("{}{}", snapshot_prefix(instance), at.format("%Y%m%d-%H%M%S"))
}

// ── Unit tests ───────────────────────────────────────────────────────────────
