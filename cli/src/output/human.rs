//! Human-readable terminal renderer.

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize as _;
use station_common::{IdlePhase, IdleStatus};

use crate::application::services::bootstrap::BootstrapReport;
use crate::application::services::lifecycle::{
    CreateReport, DeleteReport, RestoreReport, StatusReport,
};
use crate::domain::{InstanceStatus, Snapshot, StationConfig};
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        if self.ctx.quiet {
            return;
        }
        self.ctx.info(&format!("stationctl v{version}"));
    }

    /// Render the instance, volume and idle status.
    pub fn render_status(&self, status: &StatusReport) {
        self.ctx.kv("Instance:", &format!("{} ({})", status.name, status.zone));
        self.ctx.kv("Status:", instance_status_display(status.status));
        if let Some(platform) = &status.platform_status {
            self.ctx.kv("Platform:", platform);
        }
        if let Some(instance) = &status.instance {
            if let Some(ip) = &instance.external_ip {
                self.ctx.kv("External IP:", ip);
            }
            if let Some(ip) = &instance.internal_ip {
                self.ctx.kv("Internal IP:", ip);
            }
            if let Some(boot) = &instance.boot_volume {
                self.ctx.kv("Boot volume:", &boot.0);
            }
            if let Some(data) = &instance.data_volume {
                self.ctx.kv("Data volume:", &data.0);
            }
        }
        self.ctx.kv("Backups:", &status.snapshots.to_string());

        if let Some(idle) = &status.idle {
            println!();
            self.ctx.header("Idle monitor:");
            match idle.phase {
                IdlePhase::Counting(_) => {
                    self.ctx.warn(&format_idle(idle));
                }
                _ => self.ctx.success(&format_idle(idle)),
            }
        }
        if status.status == InstanceStatus::NotCreated {
            println!();
            self.ctx.info("Run: stationctl create");
        } else if status.status == InstanceStatus::Stopped {
            println!();
            self.ctx.info("Run: stationctl start");
        }
    }

    /// Render the outcome of `create`.
    pub fn render_create(&self, report: &CreateReport) {
        if self.ctx.quiet {
            return;
        }
        println!();
        self.ctx.success(&format!("{} is ready", report.instance.name));
        if let Some(snapshot) = &report.snapshot {
            self.ctx.kv("Snapshot:", &snapshot.0);
        }
        self.ctx.kv("Data volume:", &report.data_volume.0);
        self.ctx.kv(
            "Readiness:",
            &format!("{} attempt(s)", report.readiness_attempts),
        );
        self.render_bootstrap(&report.bootstrap);
        println!();
        self.ctx.info("Open the editor: stationctl tunnel");
    }

    /// Render per-step bootstrap results.
    pub fn render_bootstrap(&self, report: &BootstrapReport) {
        if self.ctx.quiet {
            return;
        }
        for step in &report.succeeded {
            println!("    {} {step}", "✓".style(self.ctx.styles.success));
        }
        for warning in &report.warnings {
            println!("    {} {} (non-fatal)", "!".style(self.ctx.styles.warning), warning.name);
        }
        if let Some(failed) = &report.failed {
            println!("    {} {}", "✗".style(self.ctx.styles.error), failed.name);
        }
        for step in &report.skipped {
            println!("    {} {step} (skipped)", "-".style(self.ctx.styles.dim));
        }
    }

    pub fn render_restore(&self, report: &RestoreReport) {
        if self.ctx.quiet {
            return;
        }
        if let Some(old) = &report.detached {
            self.ctx.kv("Detached:", &format!("{old} (kept)"));
        }
        self.ctx.kv("Attached:", &report.attached.0);
    }

    pub fn render_delete(&self, report: &DeleteReport) {
        if self.ctx.quiet {
            return;
        }
        for item in &report.deleted {
            println!("    {} {item}", "✓".style(self.ctx.styles.success));
        }
        if let Some(kept) = &report.kept_data_volume {
            self.ctx.info(&format!(
                "Data volume {kept} kept. Remove it with: stationctl delete --data"
            ));
        }
    }

    /// Render the backup list, newest first.
    pub fn render_snapshots(&self, snapshots: &[Snapshot]) {
        if snapshots.is_empty() {
            if !self.ctx.quiet {
                println!("No backups. Create one: stationctl backup");
            }
            return;
        }
        println!("  {:<36} {:<20} {:>7}  {}", "NAME", "CREATED", "SIZE", "DESCRIPTION");
        for s in snapshots {
            println!(
                "  {:<36} {:<20} {:>5}GB  {}",
                s.id.0,
                format_time(s.created_at),
                s.size_gb,
                s.description.as_deref().unwrap_or("")
            );
        }
    }

    /// Render the current configuration.
    pub fn render_config(&self, config: &StationConfig, path: &std::path::Path) {
        println!();
        println!(
            "  {}",
            format!("Configuration ({})", path.display()).style(self.ctx.styles.header)
        );
        println!();
        for key in crate::domain::config::VALID_CONFIG_KEYS {
            let value = config
                .get(key)
                .ok()
                .flatten()
                .unwrap_or_else(|| "(not set)".to_string());
            println!("  {:<28} {value}", format!("{key}:"));
        }
        println!();
        println!("  {}", "Environment:".style(self.ctx.styles.bold));
        for var in [crate::infra::config::CONFIG_ENV, crate::infra::state::STATE_ENV, "NO_COLOR"] {
            println!(
                "    {:<20} {}",
                format!("{var}:"),
                std::env::var(var).unwrap_or_else(|_| "(not set)".to_string())
            );
        }
        println!();
    }
}

// ── Display helpers (used by tests and output layer) ─────────────────────────

#[must_use]
pub fn instance_status_display(status: InstanceStatus) -> &'static str {
    match status {
        InstanceStatus::NotCreated => "not created",
        InstanceStatus::Provisioning => "provisioning",
        InstanceStatus::Ready => "ready",
        InstanceStatus::IdleCountdown => "idle (countdown)",
        InstanceStatus::Stopped => "stopped",
        InstanceStatus::Deleted => "deleted",
    }
}

#[must_use]
pub fn format_idle(status: &IdleStatus) -> String {
    match status.phase {
        IdlePhase::Active => format!("active (stops after {}m idle)", status.threshold_minutes),
        IdlePhase::Counting(_) => format!(
            "idle for {}m of {}m",
            status.idle_minutes(),
            status.threshold_minutes
        ),
        IdlePhase::Terminated => "shutting down".to_string(),
    }
}

#[must_use]
pub fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}
