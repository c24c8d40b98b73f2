//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod instance;
pub mod station;

pub use bootstrap::{BootstrapPlan, BootstrapStep, Upload};
pub use config::{SshMode, StationConfig, validate_config_key, validate_config_value};
pub use error::{
    AtStage, BootstrapFailure, Classify, ConfigError, DiskError, ErrorKind, InfraError,
    LifecycleError, PipelineError, ProvisionError, ReadinessError, RemoteError, Stage,
    TransitionError,
};
pub use instance::{
    Instance, InstanceStatus, Snapshot, SnapshotId, Volume, VolumeId, VolumeRole, VolumeSource,
};
pub use station::StationState;
