//! Bootstrap executor: run ordered setup steps and verify each one.
//!
//! A step passes only when its verification probe exits zero; the install
//! command's own exit status is not enough. The first fatal failure stops
//! the run and every later step is reported as skipped.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use serde::Serialize;

use crate::application::ports::{FileTransfer, ProgressReporter, RemoteExecutor, RemoteTarget};
use crate::domain::{BootstrapFailure, BootstrapStep, RemoteError};

/// Longest diagnostic tail kept per failure.
const MAX_OUTPUT: usize = 4000;

/// A step that did not verify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub name: String,
    pub ordinal: u32,
    pub output: String,
}

/// Per-step outcome of a bootstrap run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// Steps that verified, in execution order.
    pub succeeded: Vec<String>,
    /// The fatal step that stopped the run.
    pub failed: Option<StepFailure>,
    /// Non-fatal steps that did not verify; the run continued past them.
    pub warnings: Vec<StepFailure>,
    /// Steps never started because of `failed`.
    pub skipped: Vec<String>,
}

impl BootstrapReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_none()
    }

    /// # Errors
    ///
    /// Returns a [`BootstrapFailure`] naming the failed step.
    pub fn into_result(self) -> Result<Self, BootstrapFailure> {
        match self.failed {
            Some(f) => Err(BootstrapFailure {
                step: f.name,
                ordinal: f.ordinal,
                output: f.output,
                succeeded: self.succeeded,
            }),
            None => Ok(self),
        }
    }
}

/// Run `steps` in ordinal order, each exactly once.
pub async fn run_steps<R>(
    remote: &R,
    target: &RemoteTarget,
    steps: &[BootstrapStep],
    reporter: &impl ProgressReporter,
) -> BootstrapReport
where
    R: RemoteExecutor + FileTransfer,
{
    let mut ordered: Vec<&BootstrapStep> = steps.iter().collect();
    ordered.sort_by_key(|s| s.ordinal);

    let mut report = BootstrapReport::default();
    for (i, step) in ordered.iter().enumerate() {
        reporter.step(&format!("[{}/{}] {}...", i + 1, ordered.len(), step.name));
        match run_step(remote, target, step).await {
            Ok(()) => {
                tracing::info!(step = %step.name, "bootstrap step verified");
                report.succeeded.push(step.name.clone());
            }
            Err(output) => {
                let failure = StepFailure {
                    name: step.name.clone(),
                    ordinal: step.ordinal,
                    output: tail(&output),
                };
                if step.fatal {
                    tracing::error!(step = %step.name, "bootstrap step failed verification");
                    report.failed = Some(failure);
                    report.skipped = ordered[i + 1..].iter().map(|s| s.name.clone()).collect();
                    break;
                }
                tracing::warn!(step = %step.name, "non-fatal bootstrap step failed");
                reporter.warn(&format!("{} did not verify, continuing", step.name));
                report.warnings.push(failure);
            }
        }
    }
    if report.is_success() {
        reporter.success("bootstrap complete");
    }
    report
}

/// Re-run only the steps marked idempotent.
pub async fn repair<R>(
    remote: &R,
    target: &RemoteTarget,
    steps: &[BootstrapStep],
    reporter: &impl ProgressReporter,
) -> BootstrapReport
where
    R: RemoteExecutor + FileTransfer,
{
    let rerunnable: Vec<BootstrapStep> = steps.iter().filter(|s| s.idempotent).cloned().collect();
    run_steps(remote, target, &rerunnable, reporter).await
}

/// Upload, run, verify. On failure returns the captured diagnostics.
async fn run_step<R>(remote: &R, target: &RemoteTarget, step: &BootstrapStep) -> Result<(), String>
where
    R: RemoteExecutor + FileTransfer,
{
    if let Some(upload) = &step.upload {
        remote
            .upload(target, &upload.local, &upload.remote)
            .await
            .map_err(|e| format!("upload of {} failed: {e}", upload.local.display()))?;
    }

    let install = remote.run_script(target, &step.script).await;
    let install_log = match &install {
        Ok(out) => format!("{}{}", out.stdout, out.stderr),
        Err(e) => describe(e),
    };
    if let Err(e @ (RemoteError::Connection { .. } | RemoteError::Timeout(_))) = &install {
        return Err(format!("step script did not run: {e}"));
    }

    match remote.exec(target, &step.probe).await {
        Ok(_) => Ok(()),
        Err(probe_err) => Err(format!(
            "verification `{}` failed: {}\n--- step output ---\n{install_log}",
            step.probe,
            describe(&probe_err)
        )),
    }
}

fn describe(e: &RemoteError) -> String {
    match e {
        RemoteError::Command {
            code,
            stdout,
            stderr,
        } => format!("exit {code}\n{stdout}{stderr}"),
        other => other.to_string(),
    }
}

/// Keep the last `MAX_OUTPUT` bytes, on a char boundary.
fn tail(s: &str) -> String {
    if s.len() <= MAX_OUTPUT {
        return s.to_string();
    }
    let mut start = s.len() - MAX_OUTPUT;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &s[start..])
}
