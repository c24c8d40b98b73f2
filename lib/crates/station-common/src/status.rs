use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::idle::{IdlePhase, IdleTracker};

/// Snapshot of the monitor written to its status file after every sample.
///
/// The orchestrator reads it over the remote session to tell `Ready` from
/// `Idle-Countdown`; the monitor never reads it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleStatus {
    pub phase: IdlePhase,
    pub threshold_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_sessions: Option<u32>,
    /// When the current monitor process started.
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdleStatus {
    #[must_use]
    pub fn from_tracker(
        tracker: &IdleTracker,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            phase: tracker.phase(),
            threshold_minutes: tracker.threshold_minutes(),
            active_sessions: tracker.last_sessions(),
            started_at,
            updated_at: now,
        }
    }

    /// Idle minutes accumulated so far (zero when active).
    #[must_use]
    pub fn idle_minutes(&self) -> u32 {
        match self.phase {
            IdlePhase::Counting(n) => n,
            IdlePhase::Terminated => self.threshold_minutes,
            IdlePhase::Active => 0,
        }
    }

    /// True while the instance is counting down towards shutdown.
    #[must_use]
    pub fn is_counting(&self) -> bool {
        matches!(self.phase, IdlePhase::Counting(_))
    }
}
