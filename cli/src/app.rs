//! Application context: unified state passed to every command handler.
//!
//! `AppContext` carries the output context, the local state and config
//! stores, and the interactive/non-interactive decision. Adapters that need
//! configuration (`gcloud`, SSH) are built per command from the loaded
//! config via [`AppContext::infra`].

use std::path::PathBuf;

use anyhow::Result;

use crate::application::ports::{ConfigStore, ProgressReporter};
use crate::application::services::config_service;
use crate::application::services::lifecycle::Lifecycle;
use crate::domain::StationConfig;
use crate::infra::command_runner::{DEFAULT_CMD_TIMEOUT, TokioCommandRunner};
use crate::infra::config::YamlConfigStore;
use crate::infra::gcloud::GcloudApi;
use crate::infra::ssh::SshExecutor;
use crate::infra::state::StateManager;
use crate::output::OutputContext;

/// Overrides where the idle monitor binary is read from.
pub const MONITOR_BIN_ENV: &str = "STATIONCTL_MONITOR_BIN";
const MONITOR_BIN_NAME: &str = "station-idle-monitor";

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    pub no_color: bool,
    pub quiet: bool,
    pub json: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by `CI` / `STATIONCTL_YES` env vars).
    pub yes: bool,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    pub output: OutputFlags,
    pub behaviour: BehaviourFlags,
}

/// Adapters bound to one loaded configuration.
pub struct Infra {
    pub api: GcloudApi<TokioCommandRunner>,
    pub remote: SshExecutor<TokioCommandRunner>,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    pub config_store: YamlConfigStore,
    pub state_mgr: StateManager,
    /// When `true`, skip interactive prompts and use defaults.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` or `STATIONCTL_YES`
    /// environment variables are present.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if `StateManager::new()` fails (home directory not found).
    pub fn new(flags: &AppFlags) -> Result<Self> {
        let ci_env = std::env::var("CI").is_ok() || std::env::var("STATIONCTL_YES").is_ok();
        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };
        Ok(Self {
            // JSON mode keeps stdout for the result document.
            output: OutputContext::new(
                flags.output.no_color,
                flags.output.quiet || flags.output.json,
            ),
            mode,
            config_store: YamlConfigStore,
            state_mgr: StateManager::new()?,
            non_interactive: flags.behaviour.yes || ci_env,
        })
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Load and validate the configuration. Read once per command.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or a setting is invalid.
    pub fn load_config(&self) -> Result<StationConfig> {
        let config = config_service::load_config(&self.config_store)?;
        config.validate()?;
        tracing::debug!(
            path = ?self.config_store.path().ok(),
            instance = %config.instance.name,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Build the `gcloud` and SSH adapters for `config`, after checking that
    /// a supported gcloud is installed. Every infrastructure call goes
    /// through adapters built here.
    ///
    /// # Errors
    ///
    /// Returns an error if gcloud is missing or older than
    /// [`crate::infra::gcloud::MIN_GCLOUD_VERSION`].
    pub async fn infra(&self, config: &StationConfig) -> Result<Infra> {
        let project = config.instance.project.clone();
        let infra = Infra {
            api: GcloudApi::new(TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT), project.clone()),
            remote: SshExecutor::new(
                TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT),
                config.ssh.clone(),
                project,
            ),
        };
        let version = infra.api.check_version().await?;
        tracing::debug!(%version, "gcloud");
        Ok(infra)
    }

    /// Wire the orchestrator to this context's adapters.
    pub fn lifecycle<'a, P: ProgressReporter>(
        &'a self,
        config: &'a StationConfig,
        infra: &'a Infra,
        reporter: &'a P,
    ) -> Lifecycle<
        'a,
        GcloudApi<TokioCommandRunner>,
        SshExecutor<TokioCommandRunner>,
        StateManager,
        P,
    > {
        Lifecycle::new(config, &infra.api, &infra.remote, &self.state_mgr, reporter)
            .with_monitor_binary(monitor_binary())
    }

    /// Ask before an irreversible change. The prompt defaults to no; `--yes`,
    /// `CI` and `STATIONCTL_YES` answer yes without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails.
    pub fn confirm_destructive(&self, prompt: &str) -> Result<bool> {
        if self.non_interactive {
            return Ok(true);
        }
        self.confirm(prompt, false)
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true` (CI, `--yes` flag, or `STATIONCTL_YES`
    /// env), returns `default` immediately without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(confirmed)
    }
}

/// The idle monitor binary uploaded during bootstrap: `$STATIONCTL_MONITOR_BIN`,
/// else `station-idle-monitor` next to this executable.
#[must_use]
pub fn monitor_binary() -> PathBuf {
    if let Ok(path) = std::env::var(MONITOR_BIN_ENV) {
        return PathBuf::from(path);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(MONITOR_BIN_NAME)))
        .unwrap_or_else(|| PathBuf::from(MONITOR_BIN_NAME))
}
