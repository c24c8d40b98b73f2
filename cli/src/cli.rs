//! CLI argument parsing with clap derive

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;

/// Provision, monitor and tear down a remote development workstation
#[derive(Parser)]
#[command(
    name = "stationctl",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// Log debug detail to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to every prompt
    #[arg(short, long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Snapshot, provision and bootstrap a new workstation
    Create(commands::create::CreateArgs),

    /// Start a stopped workstation
    Start,

    /// Stop the workstation (volumes are kept)
    Stop,

    /// Show workstation, volume and idle status
    Status,

    /// Snapshot the data volume
    Backup(commands::backup::BackupArgs),

    /// Replace the data volume with one restored from a backup
    Restore(commands::restore::RestoreArgs),

    /// List backups
    Snapshots,

    /// Delete a backup
    SnapshotDelete(commands::backup::SnapshotDeleteArgs),

    /// Delete the workstation
    Delete(commands::delete::DeleteArgs),

    /// Open a shell on the workstation
    Ssh(commands::session::SshArgs),

    /// Forward the editor port to localhost
    Tunnel(commands::session::TunnelArgs),

    /// Show service logs from the workstation
    Logs(commands::logs::LogsArgs),

    /// Re-run the idempotent setup steps
    Repair,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),

    /// Show version
    Version,
}

impl Cli {
    /// Whether debug logging was requested.
    #[must_use]
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Whether errors should be rendered as JSON.
    #[must_use]
    pub fn json(&self) -> bool {
        self.json
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails. Lifecycle failures are
    /// `PipelineError`s naming the failed stage.
    pub async fn run(self) -> Result<ExitCode> {
        let Cli {
            json,
            quiet,
            no_color,
            yes,
            command,
            ..
        } = self;
        let app = AppContext::new(&AppFlags {
            output: OutputFlags {
                no_color,
                quiet,
                json,
            },
            behaviour: BehaviourFlags { yes },
        })?;

        match command {
            Command::Create(args) => commands::create::run(&app, &args).await,
            Command::Start => commands::start::run(&app).await,
            Command::Stop => commands::stop::run(&app).await,
            Command::Status => commands::status::run(&app).await,
            Command::Backup(args) => commands::backup::backup(&app, &args).await,
            Command::Restore(args) => commands::restore::run(&app, &args).await,
            Command::Snapshots => commands::backup::list(&app).await,
            Command::SnapshotDelete(args) => commands::backup::delete(&app, &args).await,
            Command::Delete(args) => commands::delete::run(&app, &args).await,
            Command::Ssh(args) => commands::session::ssh(&app, &args).await,
            Command::Tunnel(args) => commands::session::tunnel(&app, &args).await,
            Command::Logs(args) => commands::logs::run(&app, &args).await,
            Command::Repair => commands::repair::run(&app).await,
            Command::Config(cmd) => commands::config::run(&app, cmd),
            Command::Version => commands::version::run(&app),
        }
    }
}
