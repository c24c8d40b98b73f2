//! Bootstrap step definitions and generated remote artifacts: pure
//! functions, no I/O, no async.
//!
//! Each generator returns the script or unit text as a `String`; the caller
//! is responsible for shipping it to the instance.

#![allow(clippy::format_push_string)]

use std::path::PathBuf;

use station_common::IdleMonitorConfig;
use station_common::config::{MONITOR_BIN_PATH, MONITOR_UNIT};

use crate::domain::instance::{DATA_DEVICE_NAME, DATA_MOUNT_PATH};

pub const STEP_FIX_PERMISSIONS: &str = "fix-permissions";
pub const STEP_CONTAINER_RUNTIME: &str = "install-container-runtime";
pub const STEP_EDITOR: &str = "install-editor";
pub const STEP_IDLE_MONITOR: &str = "install-idle-monitor";

/// Comment line written to `/etc/fstab` once the data volume is registered.
pub const FSTAB_MARKER: &str = "# stationctl data volume";

/// Staging path for the uploaded monitor binary.
const MONITOR_UPLOAD_PATH: &str = "/tmp/station-idle-monitor";

/// A file copied to the instance before the step script runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub local: PathBuf,
    pub remote: String,
}

/// An ordered, named unit of remote work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapStep {
    pub name: String,
    /// 1-based position; steps run in ascending order.
    pub ordinal: u32,
    /// Safe to run again on an already bootstrapped instance.
    pub idempotent: bool,
    /// A failure aborts the remaining steps.
    pub fatal: bool,
    pub script: String,
    /// Verification command; exit 0 means the step took effect.
    pub probe: String,
    pub upload: Option<Upload>,
}

/// Inputs for the standard step list.
#[derive(Debug, Clone)]
pub struct BootstrapPlan {
    /// Account that owns the data volume and runs the editor.
    pub user: String,
    pub editor_port: u16,
    pub idle: IdleMonitorConfig,
    /// Local `station-idle-monitor` binary to install.
    pub monitor_binary: PathBuf,
}

impl BootstrapPlan {
    /// The four steps, in required order.
    #[must_use]
    pub fn steps(&self) -> Vec<BootstrapStep> {
        vec![
            BootstrapStep {
                name: STEP_FIX_PERMISSIONS.to_string(),
                ordinal: 1,
                idempotent: true,
                fatal: true,
                script: fix_permissions_script(&self.user),
                probe: format!(
                    "mountpoint -q {DATA_MOUNT_PATH} && test \"$(stat -c %U {DATA_MOUNT_PATH})\" = {}",
                    self.user
                ),
                upload: None,
            },
            BootstrapStep {
                name: STEP_CONTAINER_RUNTIME.to_string(),
                ordinal: 2,
                idempotent: false,
                fatal: true,
                script: container_runtime_script(&self.user),
                probe: "systemctl is-active --quiet docker".to_string(),
                upload: None,
            },
            BootstrapStep {
                name: STEP_EDITOR.to_string(),
                ordinal: 3,
                idempotent: true,
                fatal: true,
                script: editor_script(&self.user, self.editor_port),
                probe: format!(
                    "systemctl is-active --quiet code-server@{user} && ss -Hltn 'sport = :{port}' | grep -q '127.0.0.1:{port}'",
                    user = self.user,
                    port = self.editor_port,
                ),
                upload: None,
            },
            BootstrapStep {
                name: STEP_IDLE_MONITOR.to_string(),
                ordinal: 4,
                idempotent: true,
                fatal: true,
                script: idle_monitor_script(&self.idle),
                probe: format!("systemctl is-active --quiet {MONITOR_UNIT}"),
                upload: Some(Upload {
                    local: self.monitor_binary.clone(),
                    remote: MONITOR_UPLOAD_PATH.to_string(),
                }),
            },
        ]
    }
}

/// The data volume keeps the UID/GID of the machine it came from; hand it to
/// the local account.
fn fix_permissions_script(user: &str) -> String {
    format!(
        r#"set -euo pipefail
id -u {user} >/dev/null 2>&1 || sudo useradd --create-home --shell /bin/bash {user}
mountpoint -q {DATA_MOUNT_PATH}
sudo chown -R {user}:{user} {DATA_MOUNT_PATH}
"#
    )
}

fn container_runtime_script(user: &str) -> String {
    format!(
        r"set -euo pipefail
curl -fsSL https://get.docker.com | sudo sh
sudo systemctl enable --now docker
sudo usermod -aG docker {user}
"
    )
}

fn editor_script(user: &str, port: u16) -> String {
    format!(
        r#"set -euo pipefail
command -v code-server >/dev/null 2>&1 || curl -fsSL https://code-server.dev/install.sh | sudo sh
home=$(getent passwd {user} | cut -d: -f6)
sudo -u {user} mkdir -p "$home/.config/code-server"
sudo -u {user} tee "$home/.config/code-server/config.yaml" >/dev/null <<'EOF'
bind-addr: 127.0.0.1:{port}
auth: none
cert: false
EOF
sudo systemctl enable code-server@{user}
sudo systemctl restart code-server@{user}
"#
    )
}

fn idle_monitor_script(idle: &IdleMonitorConfig) -> String {
    format!(
        r"set -euo pipefail
sudo install -m 0755 {MONITOR_UPLOAD_PATH} {MONITOR_BIN_PATH}
sudo tee /etc/systemd/system/{MONITOR_UNIT} >/dev/null <<'EOF'
{unit}EOF
sudo systemctl daemon-reload
sudo systemctl enable {MONITOR_UNIT}
sudo systemctl restart {MONITOR_UNIT}
",
        unit = monitor_unit(idle),
    )
}

/// systemd unit for the idle monitor.
///
/// `RuntimeDirectory` puts the status file on tmpfs, so a restarted monitor
/// never sees the previous countdown.
#[must_use]
pub fn monitor_unit(idle: &IdleMonitorConfig) -> String {
    let mut out = String::new();
    out.push_str("[Unit]\n");
    out.push_str("Description=stationctl idle-timeout monitor\n");
    out.push_str("After=network-online.target\n");
    out.push_str("Wants=network-online.target\n");
    out.push('\n');
    out.push_str("[Service]\n");
    out.push_str("Type=simple\n");
    out.push_str(&format!("ExecStart={MONITOR_BIN_PATH}\n"));
    for (key, value) in idle.env_pairs() {
        out.push_str(&format!("Environment={key}={value}\n"));
    }
    out.push_str("RuntimeDirectory=station-idle\n");
    out.push_str("Restart=always\n");
    out.push_str("RestartSec=10\n");
    out.push('\n');
    out.push_str("[Install]\n");
    out.push_str("WantedBy=multi-user.target\n");
    out
}

/// Startup script that mounts the data volume at the canonical path and
/// registers it in `/etc/fstab`.
///
/// The platform runs it on every boot; the fstab marker makes everything
/// after the first run a plain `mount -a`. The entry uses the stable device
/// path so a volume restored into the same slot mounts without edits.
#[must_use]
pub fn first_boot_script() -> String {
    format!(
        r#"#!/bin/bash
set -euo pipefail
device=/dev/disk/by-id/google-{DATA_DEVICE_NAME}
if grep -qx '{FSTAB_MARKER}' /etc/fstab; then
  mount -a
  exit 0
fi
for _ in $(seq 1 30); do
  [ -e "$device" ] && break
  sleep 2
done
blkid "$device" >/dev/null 2>&1 || mkfs.ext4 -m 0 -E lazy_itable_init=0,lazy_journal_init=0,discard "$device"
mkdir -p {DATA_MOUNT_PATH}
echo '{FSTAB_MARKER}' >> /etc/fstab
echo "$device {DATA_MOUNT_PATH} ext4 discard,defaults,nofail 0 2" >> /etc/fstab
mount {DATA_MOUNT_PATH}
"#
    )
}
