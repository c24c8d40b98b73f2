//! Idle countdown state machine.
//!
//! `Active ⇄ Counting(n) → Terminated`. Pure and synchronous: the monitor
//! daemon feeds it one [`Sample`] per interval and acts on the returned
//! [`Decision`]. A fresh tracker always starts at zero idle minutes; nothing
//! is restored from a previous process.

use serde::{Deserialize, Serialize};

use crate::config::IdleMonitorConfig;

/// One observation of the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sample {
    /// Remote-login sessions plus established editor connections.
    Sessions(u32),
    /// The probe could not determine the count. Treated as active.
    Unknown,
}

/// Where the countdown currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "idle_minutes", rename_all = "snake_case")]
pub enum IdlePhase {
    Active,
    Counting(u32),
    Terminated,
}

/// What the caller must do after a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep sampling.
    Continue,
    /// Issue the host shutdown now. Returned at most once per tracker.
    Terminate,
    /// The tracker already terminated; stop the loop.
    Halted,
}

#[derive(Debug, Clone)]
pub struct IdleTracker {
    interval_minutes: u32,
    threshold_minutes: u32,
    idle_minutes: u32,
    last_sessions: Option<u32>,
    phase: IdlePhase,
}

impl IdleTracker {
    #[must_use]
    pub fn new(interval_minutes: u32, threshold_minutes: u32) -> Self {
        Self {
            interval_minutes,
            threshold_minutes,
            idle_minutes: 0,
            last_sessions: None,
            phase: IdlePhase::Active,
        }
    }

    #[must_use]
    pub fn from_config(cfg: &IdleMonitorConfig) -> Self {
        Self::new(cfg.interval_minutes, cfg.threshold_minutes)
    }

    /// Feed one sample into the countdown.
    pub fn observe(&mut self, sample: Sample) -> Decision {
        if self.phase == IdlePhase::Terminated {
            return Decision::Halted;
        }

        match sample {
            Sample::Sessions(0) => {
                self.last_sessions = Some(0);
                self.idle_minutes = self.idle_minutes.saturating_add(self.interval_minutes);
                if self.idle_minutes >= self.threshold_minutes {
                    self.phase = IdlePhase::Terminated;
                    return Decision::Terminate;
                }
                self.phase = IdlePhase::Counting(self.idle_minutes);
            }
            Sample::Sessions(n) => {
                self.last_sessions = Some(n);
                self.reset();
            }
            Sample::Unknown => {
                self.last_sessions = None;
                self.reset();
            }
        }
        Decision::Continue
    }

    fn reset(&mut self) {
        self.idle_minutes = 0;
        self.phase = IdlePhase::Active;
    }

    #[must_use]
    pub fn phase(&self) -> IdlePhase {
        self.phase
    }

    #[must_use]
    pub fn idle_minutes(&self) -> u32 {
        self.idle_minutes
    }

    #[must_use]
    pub fn threshold_minutes(&self) -> u32 {
        self.threshold_minutes
    }

    /// Session count of the last successful sample, if any.
    #[must_use]
    pub fn last_sessions(&self) -> Option<u32> {
        self.last_sessions
    }
}
