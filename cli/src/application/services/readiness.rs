//! Readiness poller: bounded attempts with a fixed delay.
//!
//! The remote-execution endpoint lags the platform's RUNNING status by an
//! unbounded but short gap, so the delay is fixed rather than exponential.
//! Exhaustion is surfaced to the caller as [`ReadinessError::Exhausted`].
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::application::ports::{RemoteExecutor, RemoteTarget};
use crate::domain::config::ReadinessConfig;
use crate::domain::{Classify, InfraError, ReadinessError, RemoteError};

/// How often and how long to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Upper bound on probe invocations. Zero is treated as one.
    pub max_attempts: u32,
    /// Wait between two consecutive attempts.
    pub delay: Duration,
}

impl PollPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl From<&ReadinessConfig> for PollPolicy {
    fn from(cfg: &ReadinessConfig) -> Self {
        Self::new(cfg.max_attempts, Duration::from_secs(cfg.delay_secs))
    }
}

/// Probe errors say whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for RemoteError {
    fn is_retryable(&self) -> bool {
        RemoteError::is_retryable(self)
    }
}

impl Retryable for InfraError {
    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// A successful poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polled<T> {
    pub value: T,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// Invoke `probe` until it succeeds, returns a non-retryable error, or the
/// attempt budget is spent. The probe receives the 1-based attempt number.
///
/// # Errors
///
/// [`ReadinessError::Exhausted`] after exactly `max_attempts` retryable
/// failures; [`ReadinessError::Aborted`] on the first non-retryable one.
pub async fn poll<T, E, F, Fut>(
    policy: PollPolicy,
    mut probe: F,
) -> Result<Polled<T>, ReadinessError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1..=max_attempts {
        match probe(attempt).await {
            Ok(value) => {
                tracing::debug!(attempt, max_attempts, "probe succeeded");
                return Ok(Polled {
                    value,
                    attempts: attempt,
                });
            }
            Err(e) if e.is_retryable() => {
                tracing::debug!(attempt, max_attempts, error = %e, "probe not ready");
                last_error = e.to_string();
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "probe failed permanently");
                return Err(ReadinessError::Aborted {
                    attempts: attempt,
                    error: e.to_string(),
                });
            }
        }
        if attempt < max_attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }
    Err(ReadinessError::Exhausted {
        attempts: max_attempts,
        last_error,
    })
}

/// Wait until the instance accepts remote sessions.
///
/// Returns the number of attempts used.
///
/// # Errors
///
/// Returns a [`ReadinessError`] when the budget is spent or the session is
/// rejected for a non-retryable reason.
pub async fn wait_for_remote(
    remote: &impl RemoteExecutor,
    target: &RemoteTarget,
    policy: PollPolicy,
) -> Result<u32, ReadinessError> {
    let polled = poll(policy, |_| remote.exec(target, "true")).await?;
    Ok(polled.attempts)
}
