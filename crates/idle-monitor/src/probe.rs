//! Active-session probes.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Counts sessions that keep the instance alive.
#[allow(async_fn_in_trait)]
pub trait ActivityProbe {
    /// Remote-login sessions plus established connections to the editor.
    async fn active_sessions(&self) -> Result<u32>;
}

/// TCP state code for ESTABLISHED in `/proc/net/tcp{,6}`.
const TCP_ESTABLISHED: &str = "01";

/// Production probe: `who` for login sessions, procfs for editor connections.
pub struct HostActivityProbe {
    editor_port: u16,
    proc_net: PathBuf,
}

impl HostActivityProbe {
    #[must_use]
    pub fn new(editor_port: u16) -> Self {
        Self {
            editor_port,
            proc_net: PathBuf::from("/proc/net"),
        }
    }

    async fn login_sessions(&self) -> Result<u32> {
        let output = tokio::process::Command::new("who")
            .kill_on_drop(true)
            .output()
            .await
            .context("failed to run who")?;
        anyhow::ensure!(output.status.success(), "who exited with {}", output.status);
        Ok(count_login_sessions(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn editor_connections(&self) -> Result<u32> {
        let mut total = 0;
        for table in ["tcp", "tcp6"] {
            let path = self.proc_net.join(table);
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => total += count_established(&contents, self.editor_port),
                // tcp6 is absent on hosts with IPv6 disabled.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && table == "tcp6" => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("reading {}", path.display()));
                }
            }
        }
        Ok(total)
    }
}

impl ActivityProbe for HostActivityProbe {
    async fn active_sessions(&self) -> Result<u32> {
        let logins = self.login_sessions().await?;
        let editor = self.editor_connections().await?;
        tracing::debug!(logins, editor, "sampled sessions");
        Ok(logins + editor)
    }
}

/// Count non-empty lines of `who` output.
#[must_use]
pub fn count_login_sessions(who_output: &str) -> u32 {
    let n = who_output.lines().filter(|l| !l.trim().is_empty()).count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Count ESTABLISHED sockets whose local port is `port` in a procfs TCP table.
#[must_use]
pub fn count_established(table: &str, port: u16) -> u32 {
    let n = table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let local = fields.nth(1)?;
            let state = fields.nth(1)?;
            let (_, port_hex) = local.rsplit_once(':')?;
            let local_port = u16::from_str_radix(port_hex, 16).ok()?;
            (local_port == port && state == TCP_ESTABLISHED).then_some(())
        })
        .count();
    u32::try_from(n).unwrap_or(u32::MAX)
}
