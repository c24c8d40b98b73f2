//! Integration tests for the CLI surface: help, version, global flags and
//! failures that happen before any infrastructure call.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A `stationctl` invocation isolated from `~/.stationctl`.
fn stationctl(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("stationctl"));
    cmd.env("NO_COLOR", "1")
        .env("STATIONCTL_CONFIG", dir.path().join("config.yaml"))
        .env("STATIONCTL_STATE", dir.path().join("state.json"))
        .env_remove("STATIONCTL_LOG");
    cmd
}

#[test]
fn test_no_color_accepts_conventional_values() {
    let dir = temp();
    for value in ["1", "yes", "true", "0", ""] {
        stationctl(&dir)
            .env("NO_COLOR", value)
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::contains("stationctl"));
    }
}

fn temp() -> TempDir {
    TempDir::new().expect("temp dir")
}

// --- Help and version tests ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    let dir = temp();
    // An env-provided flag counts as an argument and would turn help into a usage error.
    stationctl(&dir)
        .env_remove("NO_COLOR")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("remote development workstation"));
}

#[test]
fn test_cli_help_lists_lifecycle_commands() {
    let dir = temp();
    let assert = stationctl(&dir).arg("--help").assert().success();
    for cmd in ["create", "start", "stop", "status", "backup", "restore", "delete", "tunnel"] {
        assert_stdout_contains(&assert, cmd);
    }
}

fn assert_stdout_contains(assert: &assert_cmd::assert::Assert, needle: &str) {
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.contains(needle), "missing `{needle}` in:\n{stdout}");
}

#[test]
fn test_cli_version_flag_shows_version() {
    let dir = temp();
    stationctl(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(concat!("stationctl ", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_version_command_shows_version() {
    let dir = temp();
    stationctl(&dir)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(concat!("stationctl v", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let dir = temp();
    let output = stationctl(&dir)
        .args(["version", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let doc: serde_json::Value = serde_json::from_slice(&output).expect("valid JSON");
    assert_eq!(doc["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_create_help_documents_fresh_flag() {
    let dir = temp();
    stationctl(&dir)
        .args(["create", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--fresh"));
}

#[test]
fn test_unknown_command_is_rejected() {
    let dir = temp();
    stationctl(&dir)
        .arg("launch")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_restore_requires_snapshot_argument() {
    let dir = temp();
    stationctl(&dir).arg("restore").assert().code(2);
}

// --- Failures before any infrastructure call ---

#[test]
fn test_invalid_config_exits_two_before_touching_the_cloud() {
    let dir = temp();
    std::fs::write(
        dir.path().join("config.yaml"),
        "idle:\n  interval_minutes: 5\n  threshold_minutes: 2\n",
    )
    .expect("write config");
    stationctl(&dir)
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("idle.threshold_minutes"));
}

#[test]
fn test_invalid_config_json_error_on_stdout() {
    let dir = temp();
    std::fs::write(dir.path().join("config.yaml"), "ssh:\n  mode: direct\n").expect("write config");
    let output = stationctl(&dir)
        .args(["start", "--json"])
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let doc: serde_json::Value = serde_json::from_slice(&output).expect("valid JSON");
    assert_eq!(doc["error"], true);
    assert_eq!(doc["code"], "config");
    assert!(doc.get("stage").is_none());
}

#[test]
fn test_logs_rejects_unit_names_with_shell_characters() {
    let dir = temp();
    stationctl(&dir)
        .args(["logs", "--unit", "x; reboot"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid unit name"));
}

#[test]
fn test_every_infrastructure_command_checks_for_gcloud_first() {
    let dir = temp();
    let empty_path = TempDir::new().expect("empty PATH dir");
    let commands: [&[&str]; 8] = [
        &["start"],
        &["stop"],
        &["status"],
        &["backup"],
        &["snapshots"],
        &["repair"],
        &["logs"],
        &["delete", "--yes"],
    ];
    for args in commands {
        stationctl(&dir)
            .env("PATH", empty_path.path())
            .args(args)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("install the Google Cloud SDK"));
    }
}
