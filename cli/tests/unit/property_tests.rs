//! Property-based tests for the readiness poller, bootstrap ordering and
//! configuration validation.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use proptest::prelude::*;
use stationctl::application::ports::RemoteTarget;
use stationctl::application::services::bootstrap::run_steps;
use stationctl::application::services::readiness::{PollPolicy, poll};
use stationctl::domain::config::is_valid_instance_name;
use stationctl::domain::{
    BootstrapStep, ReadinessError, RemoteError, StationConfig, validate_config_value,
};

use crate::fakes::{FakeHost, Quiet};

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
        .block_on(fut)
}

fn target() -> RemoteTarget {
    RemoteTarget {
        instance: "dev".to_string(),
        zone: "us-central1-a".to_string(),
        address: None,
    }
}

fn step(ordinal: u32) -> BootstrapStep {
    BootstrapStep {
        name: format!("step-{ordinal}"),
        ordinal,
        idempotent: true,
        fatal: true,
        script: format!("echo {ordinal}"),
        probe: format!("probe-{ordinal};"),
        upload: None,
    }
}

proptest! {
    /// Success after `failures` refusals uses `failures + 1` attempts; a
    /// budget that runs out reports exactly `max_attempts`.
    #[test]
    fn prop_poller_counts_attempts(max_attempts in 1u32..12, failures in 0u32..15) {
        let result = block_on(poll(PollPolicy::new(max_attempts, Duration::ZERO), |attempt| async move {
            if attempt <= failures {
                Err(RemoteError::Connection { target: "dev".into(), reason: "refused".into() })
            } else {
                Ok(attempt)
            }
        }));
        if failures < max_attempts {
            let polled = result.unwrap();
            prop_assert_eq!(polled.attempts, failures + 1);
            prop_assert_eq!(polled.value, failures + 1);
        } else {
            let exhausted = matches!(
                result,
                Err(ReadinessError::Exhausted { attempts, .. }) if attempts == max_attempts
            );
            prop_assert!(exhausted);
        }
    }

    /// A non-retryable error stops polling on the attempt it happens.
    #[test]
    fn prop_poller_aborts_on_command_failure(max_attempts in 1u32..12, at in 1u32..12) {
        let result = block_on(poll(PollPolicy::new(max_attempts, Duration::ZERO), |attempt| async move {
            if attempt < at {
                Err(RemoteError::Connection { target: "dev".into(), reason: "refused".into() })
            } else {
                Err::<(), _>(RemoteError::Command {
                    code: 2,
                    stdout: String::new(),
                    stderr: "no".into(),
                })
            }
        }));
        match result {
            Err(ReadinessError::Aborted { attempts, .. }) => {
                prop_assert!(at <= max_attempts);
                prop_assert_eq!(attempts, at);
            }
            Err(ReadinessError::Exhausted { attempts, .. }) => {
                prop_assert!(at > max_attempts);
                prop_assert_eq!(attempts, max_attempts);
            }
            Ok(_) => prop_assert!(false, "probe never succeeds"),
        }
    }

    /// Steps run in ordinal order whatever order they are listed in; a fatal
    /// failure skips exactly the steps after it.
    #[test]
    fn prop_bootstrap_runs_in_ordinal_order(
        ordinals in Just((1u32..=6).collect::<Vec<_>>()).prop_shuffle(),
        failing in prop::option::of(1u32..=6),
    ) {
        let steps: Vec<BootstrapStep> = ordinals.iter().copied().map(step).collect();
        let host = FakeHost::default();
        if let Some(f) = failing {
            host.fail_probe_containing(&format!("probe-{f};"));
        }
        let report = block_on(run_steps(&host, &target(), &steps, &Quiet));

        let last_ok = failing.map_or(6, |f| f - 1);
        let expected: Vec<String> = (1..=last_ok).map(|o| format!("step-{o}")).collect();
        prop_assert_eq!(&report.succeeded, &expected);
        match failing {
            Some(f) => {
                prop_assert_eq!(report.failed.as_ref().map(|s| s.ordinal), Some(f));
                let skipped: Vec<String> = (f + 1..=6).map(|o| format!("step-{o}")).collect();
                prop_assert_eq!(&report.skipped, &skipped);
            }
            None => {
                prop_assert!(report.failed.is_none());
                prop_assert!(report.skipped.is_empty());
            }
        }
    }

    #[test]
    fn prop_any_nonzero_port_is_accepted(port in 1u16..=u16::MAX) {
        prop_assert!(validate_config_value("editor.port", &port.to_string()).is_ok());
        let mut cfg = StationConfig::default();
        cfg.set("editor.port", &port.to_string()).unwrap();
        prop_assert_eq!(cfg.editor.port, port);
    }

    #[test]
    fn prop_uppercase_instance_names_are_rejected(name in "[a-z]{1,10}[A-Z][a-z]{0,10}") {
        prop_assert!(!is_valid_instance_name(&name));
        prop_assert!(validate_config_value("instance.name", &name).is_err());
    }

    #[test]
    fn prop_lowercase_instance_names_are_accepted(name in "[a-z][a-z0-9]{0,20}(-[a-z0-9]{1,10}){0,3}") {
        prop_assert!(is_valid_instance_name(&name));
    }

    #[test]
    fn prop_threshold_below_interval_fails_validation(interval in 2u32..60, shortfall in 1u32..60) {
        let mut cfg = StationConfig::default();
        cfg.idle.interval_minutes = interval;
        cfg.idle.threshold_minutes = interval.saturating_sub(shortfall).max(1);
        prop_assume!(cfg.idle.threshold_minutes < interval);
        prop_assert!(cfg.validate().is_err());
    }
}
