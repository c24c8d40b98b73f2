//! On-instance idle-timeout monitor.
//!
//! Samples the number of active sessions at a fixed interval and powers the
//! host off once the idle threshold is reached. Runs as a supervised systemd
//! service; every process start begins a fresh countdown.

pub mod monitor;
pub mod probe;
pub mod shutdown;

pub use monitor::{Monitor, RunSummary};
pub use probe::{ActivityProbe, HostActivityProbe};
pub use shutdown::{DryRunShutdown, ShutdownAction, SystemShutdown};
