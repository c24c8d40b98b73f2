//! Command implementations

pub mod backup;
pub mod config;
pub mod create;
pub mod delete;
pub mod logs;
pub mod repair;
pub mod restore;
pub mod session;
pub mod start;
pub mod status;
pub mod stop;
pub mod version;
