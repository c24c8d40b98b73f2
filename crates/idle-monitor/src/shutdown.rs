//! Terminate actions.

use anyhow::{Context, Result};

/// Powers the host off. Fire-and-forget: nothing reports back to the
/// orchestrator, which simply finds the instance stopped on its next query.
#[allow(async_fn_in_trait)]
pub trait ShutdownAction {
    async fn shutdown(&self) -> Result<()>;
}

/// Runs `shutdown -h now`.
pub struct SystemShutdown;

impl ShutdownAction for SystemShutdown {
    async fn shutdown(&self) -> Result<()> {
        let status = tokio::process::Command::new("shutdown")
            .args(["-h", "now", "station idle timeout reached"])
            .status()
            .await
            .context("failed to spawn shutdown")?;
        anyhow::ensure!(status.success(), "shutdown exited with {status}");
        Ok(())
    }
}

/// Logs the decision without touching the host.
pub struct DryRunShutdown;

impl ShutdownAction for DryRunShutdown {
    async fn shutdown(&self) -> Result<()> {
        tracing::warn!("dry run: host shutdown skipped");
        Ok(())
    }
}
