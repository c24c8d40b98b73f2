//! Infrastructure implementation of the `RemoteExecutor` and `FileTransfer`
//! ports.
//!
//! Sessions go either through `gcloud compute ssh --tunnel-through-iap`
//! (no public address needed) or through plain OpenSSH to a reachable
//! address. Every session is one child process; the runner kills it on
//! timeout and `kill_on_drop` covers cancellation.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::Result;

use crate::application::ports::{
    CommandRunner, FileTransfer, RemoteExecutor, RemoteOutput, RemoteTarget,
};
use crate::domain::config::SshConfig;
use crate::domain::{RemoteError, SshMode};

/// OpenSSH reserves exit status 255 for its own failures.
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Remote sessions over `gcloud compute ssh` or `ssh`.
pub struct SshExecutor<R: CommandRunner> {
    runner: R,
    config: SshConfig,
    project: Option<String>,
}

impl<R: CommandRunner> SshExecutor<R> {
    pub fn new(runner: R, config: SshConfig, project: Option<String>) -> Self {
        Self {
            runner,
            config,
            project,
        }
    }

    fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout_secs)
    }

    fn destination(&self, target: &RemoteTarget) -> Result<String, RemoteError> {
        let host = target.address.as_deref().ok_or_else(|| RemoteError::Connection {
            target: target.instance.clone(),
            reason: "no reachable address; set ssh.host or instance.external_ip".to_string(),
        })?;
        Ok(match &self.config.user {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        })
    }

    /// OpenSSH options shared by `ssh` and `scp`. Batch mode refuses
    /// password prompts and is off only for interactive sessions.
    fn ssh_options(&self, batch: bool) -> Vec<String> {
        let mut opts = vec![
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];
        if batch {
            opts.push("-o".to_string());
            opts.push("BatchMode=yes".to_string());
        }
        if let Some(key) = &self.config.key_file {
            opts.push("-i".to_string());
            opts.push(key.display().to_string());
        }
        opts
    }

    fn gcloud_scope(&self, target: &RemoteTarget) -> Vec<String> {
        let mut args = vec![format!("--zone={}", target.zone)];
        if let Some(p) = &self.project {
            args.push(format!("--project={p}"));
        }
        args
    }

    fn gcloud_host(&self, target: &RemoteTarget) -> String {
        match &self.config.user {
            Some(user) => format!("{user}@{}", target.instance),
            None => target.instance.clone(),
        }
    }

    /// Program and argv that run `command` on the instance. `None` opens an
    /// interactive shell.
    fn session_argv(
        &self,
        target: &RemoteTarget,
        command: Option<&str>,
        interactive: bool,
    ) -> Result<(&'static str, Vec<String>), RemoteError> {
        match self.config.mode {
            SshMode::Iap => {
                let mut args = vec![
                    "compute".to_string(),
                    "ssh".to_string(),
                    self.gcloud_host(target),
                    "--tunnel-through-iap".to_string(),
                ];
                args.extend(self.gcloud_scope(target));
                if !interactive {
                    args.push("--quiet".to_string());
                }
                if let Some(key) = &self.config.key_file {
                    args.push(format!("--ssh-key-file={}", key.display()));
                }
                if let Some(cmd) = command {
                    args.push(format!("--command={cmd}"));
                }
                args.push("--".to_string());
                args.push("-o".to_string());
                args.push(format!("ConnectTimeout={}", self.config.connect_timeout_secs));
                Ok(("gcloud", args))
            }
            SshMode::Direct => {
                let mut args = self.ssh_options(!interactive);
                if interactive {
                    args.push("-t".to_string());
                }
                args.push("-p".to_string());
                args.push(self.config.port.to_string());
                args.push(self.destination(target)?);
                if let Some(cmd) = command {
                    args.push(cmd.to_string());
                }
                Ok(("ssh", args))
            }
        }
    }

    fn interpret(target: &RemoteTarget, output: Output) -> Result<RemoteOutput, RemoteError> {
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        match output.status.code() {
            Some(0) => Ok(RemoteOutput {
                exit_code: 0,
                stdout,
                stderr,
            }),
            Some(SSH_TRANSPORT_FAILURE) | None => Err(RemoteError::Connection {
                target: target.to_string(),
                reason: last_line(&stderr),
            }),
            Some(code) => Err(RemoteError::Command {
                code,
                stdout,
                stderr,
            }),
        }
    }

    fn spawn_error(&self, target: &RemoteTarget, e: &anyhow::Error) -> RemoteError {
        let msg = format!("{e:#}");
        if msg.contains("timed out") {
            RemoteError::Timeout(self.config.command_timeout_secs)
        } else {
            RemoteError::Connection {
                target: target.to_string(),
                reason: msg,
            }
        }
    }

    /// Open an interactive session with inherited stdio. Returns the remote
    /// exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be started.
    pub async fn interactive(&self, target: &RemoteTarget, command: Option<&str>) -> Result<i32> {
        let (program, args) = self.session_argv(target, command, true)?;
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let status = self.runner.run_status(program, &argv).await?;
        Ok(status.code().unwrap_or(1))
    }

    /// Forward `localhost:local_port` to `remote_port` on the instance until
    /// the child exits (Ctrl-C).
    ///
    /// # Errors
    ///
    /// Returns an error if the forwarder cannot be started.
    pub async fn tunnel(
        &self,
        target: &RemoteTarget,
        local_port: u16,
        remote_port: u16,
    ) -> Result<i32> {
        let (program, args) = match self.config.mode {
            SshMode::Iap => {
                let mut args = vec![
                    "compute".to_string(),
                    "start-iap-tunnel".to_string(),
                    target.instance.clone(),
                    remote_port.to_string(),
                    format!("--local-host-port=localhost:{local_port}"),
                ];
                args.extend(self.gcloud_scope(target));
                ("gcloud", args)
            }
            SshMode::Direct => {
                let mut args = self.ssh_options(false);
                args.extend([
                    "-N".to_string(),
                    "-L".to_string(),
                    format!("{local_port}:127.0.0.1:{remote_port}"),
                    "-p".to_string(),
                    self.config.port.to_string(),
                    self.destination(target)?,
                ]);
                ("ssh", args)
            }
        };
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let status = self.runner.run_status(program, &argv).await?;
        Ok(status.code().unwrap_or(1))
    }
}

fn last_line(s: &str) -> String {
    s.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("connection failed")
        .trim()
        .to_string()
}

impl<R: CommandRunner> RemoteExecutor for SshExecutor<R> {
    async fn exec(
        &self,
        target: &RemoteTarget,
        command: &str,
    ) -> Result<RemoteOutput, RemoteError> {
        let (program, args) = self.session_argv(target, Some(command), false)?;
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        tracing::debug!(target = %target, command, "remote exec");
        let output = self
            .runner
            .run_with_timeout(program, &argv, self.command_timeout())
            .await
            .map_err(|e| self.spawn_error(target, &e))?;
        Self::interpret(target, output)
    }

    async fn run_script(
        &self,
        target: &RemoteTarget,
        script: &str,
    ) -> Result<RemoteOutput, RemoteError> {
        let (program, args) = self.session_argv(target, Some("sudo bash -s"), false)?;
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        tracing::debug!(target = %target, bytes = script.len(), "remote script");
        let output = self
            .runner
            .run_with_stdin(program, &argv, script.as_bytes(), self.command_timeout())
            .await
            .map_err(|e| self.spawn_error(target, &e))?;
        Self::interpret(target, output)
    }
}

impl<R: CommandRunner> FileTransfer for SshExecutor<R> {
    async fn upload(
        &self,
        target: &RemoteTarget,
        local: &Path,
        remote: &str,
    ) -> Result<(), RemoteError> {
        let (program, args) = match self.config.mode {
            SshMode::Iap => {
                let mut args = vec![
                    "compute".to_string(),
                    "scp".to_string(),
                    local.display().to_string(),
                    format!("{}:{remote}", self.gcloud_host(target)),
                    "--tunnel-through-iap".to_string(),
                    "--quiet".to_string(),
                ];
                args.extend(self.gcloud_scope(target));
                ("gcloud", args)
            }
            SshMode::Direct => {
                let mut args = self.ssh_options(true);
                args.push("-P".to_string());
                args.push(self.config.port.to_string());
                args.push(local.display().to_string());
                args.push(format!("{}:{remote}", self.destination(target)?));
                ("scp", args)
            }
        };
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self
            .runner
            .run_with_timeout(program, &argv, self.command_timeout())
            .await
            .map_err(|e| self.spawn_error(target, &e))?;
        Self::interpret(target, output).map(drop)
    }
}
