//! Smoke tests for the droidprobe CLI
//!
//! None of these need a device: they cover parsing, configuration and the
//! error paths taken when adb or credentials are missing.

#![allow(deprecated)] // Command::cargo_bin
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// A droidprobe command isolated from the caller's environment
fn droidprobe(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("droidprobe").expect("droidprobe binary should exist");
    cmd.current_dir(dir.path())
        .env_remove("DROIDPROBE_CONFIG")
        .env_remove("DROIDPROBE_SERIAL")
        .env_remove("DROIDPROBE_ADB")
        .env_remove("DROIDPROBE_ARTIFACTS")
        .env_remove("DROIDPROBE_LOGIN_ID")
        .env_remove("DROIDPROBE_LOGIN_SECRET")
        .env_remove("RUST_LOG");
    cmd
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    let dir = TempDir::new().unwrap();
    droidprobe(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    droidprobe(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scroll-to"))
        .stdout(predicate::str::contains("stabilize"))
        .stdout(predicate::str::contains("--json-logs"));
}

#[test]
fn test_no_args_fails() {
    let dir = TempDir::new().unwrap();
    droidprobe(&dir).assert().failure();
}

#[test]
fn test_find_help() {
    let dir = TempDir::new().unwrap();
    droidprobe(&dir)
        .args(["find", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--timeout-ms"))
        .stdout(predicate::str::contains("xpath"));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_show_defaults() {
    let dir = TempDir::new().unwrap();
    droidprobe(&dir)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("poll_interval_ms: 400"))
        .stdout(predicate::str::contains("com.eatvermont.app"));
}

#[test]
fn test_config_show_reads_file_and_serial() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("probe.yaml");
    fs::write(&path, "timing:\n  poll_interval_ms: 250\n").unwrap();
    droidprobe(&dir)
        .args(["--config", path.to_str().unwrap(), "--serial", "emulator-5554", "config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("poll_interval_ms: 250"))
        .stdout(predicate::str::contains("emulator-5554"));
}

#[test]
fn test_config_picked_up_from_working_directory() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("droidprobe.yaml"), "timing:\n  settle_delay_ms: 900\n").unwrap();
    droidprobe(&dir)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("settle_delay_ms: 900"));
}

#[test]
fn test_config_init_then_refuse_overwrite() {
    let dir = TempDir::new().unwrap();
    droidprobe(&dir)
        .args(["config", "--init", "conf/droidprobe.yaml"])
        .assert()
        .success();
    let written = fs::read_to_string(dir.path().join("conf/droidprobe.yaml")).unwrap();
    assert!(written.contains("plans_upsell"));

    droidprobe(&dir)
        .args(["config", "--init", "conf/droidprobe.yaml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.yaml");
    fs::write(&path, "retry:\n  backoff_multiplier: 0.5\n").unwrap();
    droidprobe(&dir)
        .args(["--config", path.to_str().unwrap(), "config", "--show"])
        .assert()
        .code(2);
}

// ============================================================================
// Device-facing commands without a device
// ============================================================================

#[test]
fn test_missing_adb_is_transport_error() {
    let dir = TempDir::new().unwrap();
    droidprobe(&dir)
        .env("DROIDPROBE_ADB", "/nonexistent/adb")
        .args(["find", "Sign In", "--timeout-ms", "0"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Device transport failed"));
}

#[test]
fn test_login_requires_credentials() {
    let dir = TempDir::new().unwrap();
    droidprobe(&dir)
        .env("DROIDPROBE_ADB", "/nonexistent/adb")
        .arg("login")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("DROIDPROBE_LOGIN_ID"));
}
