pub mod config;
pub mod idle;
pub mod status;

pub use config::{ConfigError, IdleMonitorConfig};
pub use idle::{Decision, IdlePhase, IdleTracker, Sample};
pub use status::IdleStatus;
