//! Unit tests for stationctl
//!
//! These tests use in-memory fakes and run fast without external I/O.

mod fakes;
mod lifecycle_scenarios;
mod property_tests;
