//! Integration tests for `stationctl config` command.
//!
//! All filesystem-touching tests set `STATIONCTL_CONFIG` to a temp path so
//! they never read or write `~/.stationctl/config.yaml`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn stationctl() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("stationctl"));
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Returns a `TempDir` and the path string for a config file inside it.
fn temp_config_path() -> (TempDir, String) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir
        .path()
        .join("config.yaml")
        .to_string_lossy()
        .into_owned();
    (dir, path)
}

// ---------------------------------------------------------------------------
// Subcommand registration
// ---------------------------------------------------------------------------

#[test]
fn test_config_help_shows_subcommands() {
    stationctl()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("show"))
        .stdout(predicate::str::contains("get"))
        .stdout(predicate::str::contains("set"))
        .stdout(predicate::str::contains("path"));
}

// ---------------------------------------------------------------------------
// `stationctl config show`
// ---------------------------------------------------------------------------

#[test]
fn test_config_show_no_config_file_uses_defaults() {
    let (_dir, path) = temp_config_path();
    stationctl()
        .args(["config", "show"])
        .env("STATIONCTL_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains("instance.name:"))
        .stdout(predicate::str::contains("e2-standard-4"))
        .stdout(predicate::str::contains("STATIONCTL_CONFIG:"));
}

#[test]
fn test_config_show_json_is_the_config_document() {
    let (_dir, path) = temp_config_path();
    let output = stationctl()
        .args(["config", "show", "--json"])
        .env("STATIONCTL_CONFIG", &path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let doc: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(doc["instance"]["name"], "station");
    assert_eq!(doc["idle"]["threshold_minutes"], 120);
    assert_eq!(doc["ssh"]["mode"], "iap");
}

// ---------------------------------------------------------------------------
// `stationctl config get` / `set`
// ---------------------------------------------------------------------------

#[test]
fn test_config_get_default_value() {
    let (_dir, path) = temp_config_path();
    stationctl()
        .args(["config", "get", "editor.port"])
        .env("STATIONCTL_CONFIG", &path)
        .assert()
        .success()
        .stdout("8080\n");
}

#[test]
fn test_config_set_persists_value() {
    let (_dir, path) = temp_config_path();
    stationctl()
        .args(["config", "set", "idle.threshold_minutes", "45"])
        .env("STATIONCTL_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains("idle.threshold_minutes = 45"))
        .stdout(predicate::str::contains("stationctl repair"));

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("threshold_minutes: 45"), "{content}");

    stationctl()
        .args(["config", "get", "idle.threshold_minutes"])
        .env("STATIONCTL_CONFIG", &path)
        .assert()
        .success()
        .stdout("45\n");
}

#[cfg(unix)]
#[test]
fn test_config_file_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let (_dir, path) = temp_config_path();
    stationctl()
        .args(["config", "set", "source.disk", "workstation-home"])
        .env("STATIONCTL_CONFIG", &path)
        .assert()
        .success();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_config_set_json_echoes_key_and_value() {
    let (_dir, path) = temp_config_path();
    let output = stationctl()
        .args(["config", "set", "instance.zone", "europe-west4-b", "--json"])
        .env("STATIONCTL_CONFIG", &path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let doc: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(doc["key"], "instance.zone");
    assert_eq!(doc["value"], "europe-west4-b");
}

#[test]
fn test_config_set_unknown_key_exits_two() {
    let (_dir, path) = temp_config_path();
    stationctl()
        .args(["config", "set", "instance.colour", "blue"])
        .env("STATIONCTL_CONFIG", &path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Unknown setting: instance.colour"));
}

#[test]
fn test_config_set_invalid_value_exits_two() {
    let (_dir, path) = temp_config_path();
    stationctl()
        .args(["config", "set", "ssh.mode", "telnet"])
        .env("STATIONCTL_CONFIG", &path)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("iap, direct"));
}

#[test]
fn test_config_set_that_breaks_validation_writes_nothing() {
    let (_dir, path) = temp_config_path();
    stationctl()
        .args(["config", "set", "idle.threshold_minutes", "2"])
        .env("STATIONCTL_CONFIG", &path)
        .assert()
        .code(2);
    assert!(!std::path::Path::new(&path).exists());
}

#[test]
fn test_config_get_unknown_key_exits_two() {
    let (_dir, path) = temp_config_path();
    stationctl()
        .args(["config", "get", "nope"])
        .env("STATIONCTL_CONFIG", &path)
        .assert()
        .code(2);
}

// ---------------------------------------------------------------------------
// `stationctl config path`
// ---------------------------------------------------------------------------

#[test]
fn test_config_path_honours_env_override() {
    let (_dir, path) = temp_config_path();
    stationctl()
        .args(["config", "path"])
        .env("STATIONCTL_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::diff(format!("{path}\n")));
}
