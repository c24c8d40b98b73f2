//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::domain::instance::InstanceStatus;

// ── Taxonomy ──────────────────────────────────────────────────────────────────

/// How a failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network blips, endpoints not yet ready. Retryable.
    TransientInfra,
    /// The resource already exists or is in use. Needs an operator decision.
    ResourceConflict,
    /// A bootstrap step failed verification.
    BootstrapFailure,
    /// Quota exceeded, invalid image, rejected request. Abort immediately.
    PermanentInfra,
    /// The resource does not exist.
    NotFound,
}

impl ErrorKind {
    #[must_use]
    pub fn is_retryable(self) -> bool {
        self == Self::TransientInfra
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TransientInfra => "transient infrastructure error",
            Self::ResourceConflict => "resource conflict",
            Self::BootstrapFailure => "bootstrap failure",
            Self::PermanentInfra => "permanent infrastructure error",
            Self::NotFound => "not found",
        })
    }
}

/// Implemented by every error the pipeline can surface.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

// ── Infrastructure API errors ─────────────────────────────────────────────────

/// Failures reported by the infrastructure API.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("{resource} already exists")]
    Conflict { resource: String },

    #[error("infrastructure API temporarily unavailable: {0}")]
    Transient(String),

    #[error("infrastructure API rejected the request: {0}")]
    Permanent(String),
}

impl InfraError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl Classify for InfraError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::ResourceConflict,
            Self::Transient(_) => ErrorKind::TransientInfra,
            Self::Permanent(_) => ErrorKind::PermanentInfra,
        }
    }
}

// ── Remote session errors ─────────────────────────────────────────────────────

/// Failures of a remote session or the command it ran.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Host unreachable or authentication rejected.
    #[error("cannot open a remote session to {target}: {reason}")]
    Connection { target: String, reason: String },

    /// The command ran and exited non-zero.
    #[error("remote command exited with status {code}: {}", stderr.trim())]
    Command {
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("remote command did not finish within {0}s")]
    Timeout(u64),
}

impl RemoteError {
    /// Only connection failures are worth retrying at this layer.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

impl Classify for RemoteError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } | Self::Timeout(_) => ErrorKind::TransientInfra,
            Self::Command { .. } => ErrorKind::PermanentInfra,
        }
    }
}

// ── Snapshot / disk errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("source volume '{0}' cannot be read")]
    SourceUnavailable(String),

    #[error(
        "requested size {requested_gb}GB is smaller than snapshot '{snapshot}' ({required_gb}GB)"
    )]
    SizeTooSmall {
        snapshot: String,
        requested_gb: u64,
        required_gb: u64,
    },

    #[error("volume '{volume}' is attached to {users}; detach it before deleting")]
    InUse { volume: String, users: String },

    #[error("snapshot '{snapshot}' was not ready after {attempts} checks")]
    SnapshotNotReady { snapshot: String, attempts: u32 },

    #[error(transparent)]
    Infra(#[from] InfraError),
}

impl Classify for DiskError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceUnavailable(_) => ErrorKind::NotFound,
            Self::SizeTooSmall { .. } => ErrorKind::PermanentInfra,
            Self::InUse { .. } => ErrorKind::ResourceConflict,
            Self::SnapshotNotReady { .. } => ErrorKind::TransientInfra,
            Self::Infra(e) => e.kind(),
        }
    }
}

// ── Provisioning errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("instance creation failed: {0}")]
    Create(#[source] InfraError),

    #[error("instance '{name}' did not reach RUNNING after {attempts} checks{}", compensation_note(*.compensated))]
    BootTimeout {
        name: String,
        attempts: u32,
        compensated: bool,
    },

    #[error("attaching data volume '{volume}' failed: {source}{}", compensation_note(*.compensated))]
    Attach {
        volume: String,
        source: InfraError,
        compensated: bool,
    },

    #[error("applying the first-boot payload failed: {source}{}", compensation_note(*.compensated))]
    FirstBoot { source: InfraError, compensated: bool },
}

fn compensation_note(compensated: bool) -> &'static str {
    if compensated {
        " (partially created instance and its boot disk were deleted)"
    } else {
        " (partially created instance or its boot disk could NOT be deleted; remove them manually)"
    }
}

impl Classify for ProvisionError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Create(e)
            | Self::Attach { source: e, .. }
            | Self::FirstBoot { source: e, .. } => e.kind(),
            Self::BootTimeout { .. } => ErrorKind::TransientInfra,
        }
    }
}

// ── Bootstrap errors ──────────────────────────────────────────────────────────

/// A fatal bootstrap step failed; later steps were not run.
#[derive(Debug, Error)]
#[error("bootstrap step {ordinal} '{step}' failed verification")]
pub struct BootstrapFailure {
    pub step: String,
    pub ordinal: u32,
    /// Captured diagnostic output of the failing command or probe.
    pub output: String,
    /// Steps that passed before the failure, in order.
    pub succeeded: Vec<String>,
}

impl Classify for BootstrapFailure {
    fn kind(&self) -> ErrorKind {
        ErrorKind::BootstrapFailure
    }
}

// ── Readiness errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("remote endpoint still unavailable after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("readiness probe failed permanently on attempt {attempts}: {error}")]
    Aborted { attempts: u32, error: String },
}

impl Classify for ReadinessError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Exhausted { .. } => ErrorKind::TransientInfra,
            Self::Aborted { .. } => ErrorKind::PermanentInfra,
        }
    }
}

// ── Lifecycle errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("instance cannot move from {from} to {to}")]
pub struct TransitionError {
    pub from: InstanceStatus,
    pub to: InstanceStatus,
}

impl Classify for TransitionError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ResourceConflict
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("instance '{0}' does not exist. Run 'stationctl create' first.")]
    NoInstance(String),

    #[error("instance '{0}' already exists. Delete it first or use 'stationctl start'.")]
    AlreadyExists(String),

    #[error("instance '{0}' has no data volume attached")]
    NoDataVolume(String),

    #[error("no source volume configured. Set source.disk or pass --fresh.")]
    NoSource,

    #[error("instance '{0}' is not running. Run 'stationctl start' first.")]
    NotRunning(String),

    #[error("delete incomplete, remaining resources: {0}")]
    DeleteIncomplete(String),
}

impl Classify for LifecycleError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::NoInstance(_) | Self::NoDataVolume(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::ResourceConflict,
            Self::NoSource | Self::DeleteIncomplete(_) => ErrorKind::PermanentInfra,
            Self::NotRunning(_) => ErrorKind::ResourceConflict,
        }
    }
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration key/value validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting: {key}\n\nValid settings: {valid}")]
    UnknownKey { key: String, valid: String },

    #[error("Invalid value for {key}: {value}\n\nExpected: {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },
}

// ── Pipeline stages ───────────────────────────────────────────────────────────

/// The orchestrator stage an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Snapshot,
    Volume,
    Provision,
    Readiness,
    Bootstrap,
    Lifecycle,
}

impl Stage {
    /// Process exit code for a failure in this stage.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Snapshot => 10,
            Self::Volume => 11,
            Self::Provision => 12,
            Self::Readiness => 13,
            Self::Bootstrap => 14,
            Self::Lifecycle => 15,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Snapshot => "snapshot",
            Self::Volume => "volume",
            Self::Provision => "provision",
            Self::Readiness => "readiness",
            Self::Bootstrap => "bootstrap",
            Self::Lifecycle => "lifecycle",
        })
    }
}

/// The single error type the orchestrator surfaces: which stage failed,
/// how to treat it, and the underlying cause.
#[derive(Debug, Error)]
#[error("{stage} stage failed ({kind}): {cause}")]
pub struct PipelineError {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub cause: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl PipelineError {
    pub fn new<E>(stage: Stage, err: E) -> Self
    where
        E: Classify + std::error::Error + Send + Sync + 'static,
    {
        Self {
            stage,
            kind: err.kind(),
            cause: Box::new(err),
        }
    }

    /// The underlying error, if it is of type `E`.
    #[must_use]
    pub fn cause_as<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.cause.downcast_ref::<E>()
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.stage.exit_code()
    }
}

/// Annotate a typed result with the stage it belongs to.
pub trait AtStage<T> {
    /// # Errors
    ///
    /// Wraps the original error in a [`PipelineError`] for `stage`.
    fn at_stage(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T, E> AtStage<T> for Result<T, E>
where
    E: Classify + std::error::Error + Send + Sync + 'static,
{
    fn at_stage(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::new(stage, e))
    }
}

// ── Unit tests ───────────────────────────────────────────────────────────────
