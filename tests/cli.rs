//! Integration tests for the labvm binary.
//!
//! Every run goes against a simulated lab so no hypervisor is needed.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

const LAB: &str = r#"
[[vm]]
name = "web01"
power = "off"

[[vm]]
name = "db01"
power = "on"
tools = "ok"

[[vm]]
name = "cache01"
power = "on"
tools = "not-ready"
"#;

struct Lab {
    inventory: NamedTempFile,
    home: TempDir,
}

impl Lab {
    fn new(content: &str) -> Self {
        let mut inventory = NamedTempFile::new().unwrap();
        write!(inventory, "{content}").unwrap();
        Self {
            inventory,
            home: TempDir::new().unwrap(),
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("labvm").unwrap();
        cmd.env("NO_COLOR", "1")
            .env_remove("GOVC_URL")
            .env_remove("LABVM_HOST")
            .env_remove("LABVM_USER")
            .env_remove("LABVM_PASSWORD")
            .arg("--config")
            .arg(self.home.path().join("config.toml"))
            .arg("--simulate")
            .arg(self.inventory.path());
        cmd
    }
}

#[test]
fn test_unsupported_action_lists_supported() {
    Command::cargo_bin("labvm")
        .unwrap()
        .arg("destroy")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("supported actions"))
        .stderr(predicate::str::contains("reverttosnapshot"));
}

#[test]
fn test_missing_action_is_usage_error() {
    Command::cargo_bin("labvm").unwrap().assert().code(2);
}

#[test]
fn test_start_all() {
    Lab::new(LAB)
        .cmd()
        .arg("start")
        .assert()
        .success()
        .stdout(predicate::str::contains("powered on"))
        .stdout(predicate::str::contains("already powered on"))
        .stdout(predicate::str::contains("3 machine(s) processed"));
}

#[test]
fn test_alias_is_accepted_case_insensitively() {
    Lab::new(LAB)
        .cmd()
        .args(["PAUSE", "db01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("'pause' runs as 'suspend'"))
        .stdout(predicate::str::contains("suspended"));
}

#[test]
fn test_reset_powered_off_is_rejected_not_failed() {
    Lab::new(LAB)
        .cmd()
        .args(["reset", "web01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("powered off, cannot reset"))
        .stdout(predicate::str::contains("1 rejected"));
}

#[test]
fn test_revert_without_snapshot_fails() {
    Lab::new(LAB)
        .cmd()
        .args(["revert", "web01"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("no snapshot exists for web01"));
}

#[test]
fn test_unknown_machine_fails_only_itself() {
    Lab::new(LAB)
        .cmd()
        .args(["start", "web01;ghost"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("virtual machine not found: ghost"))
        .stdout(predicate::str::contains("1 succeeded"))
        .stdout(predicate::str::contains("1 failed"));
}

#[test]
fn test_stop_falls_back_to_hard_stop() {
    Lab::new(LAB)
        .cmd()
        .args(["stop", "cache01"])
        .args(["--poll-delay", "0", "--max-attempts", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not ready after 2 attempts"));
}

#[test]
fn test_huge_timeout_and_poll_delay_are_accepted() {
    let max = u64::MAX.to_string();
    Lab::new(LAB)
        .cmd()
        .args(["start", "web01", "--timeout", &max, "--poll-delay", &max])
        .assert()
        .success()
        .stdout(predicate::str::contains("powered on"));
}

#[test]
fn test_stop_suspended_machine_hard_stops() {
    Lab::new("[[vm]]\nname = \"idle01\"\npower = \"suspended\"\n")
        .cmd()
        .args(["stop", "idle01"])
        .args(["--poll-delay", "0", "--max-attempts", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not ready after 1 attempts"));
}

#[test]
fn test_targets_from_file() {
    let lab = Lab::new(LAB);
    let mut list = NamedTempFile::new().unwrap();
    writeln!(list, "web01\ndb01").unwrap();

    lab.cmd()
        .arg("snapshot")
        .arg(list.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("2 machine(s) processed"));
}

#[test]
fn test_json_report() {
    let output = Lab::new(LAB)
        .cmd()
        .args(["--json", "start", "web01,db01"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let reports = report["reports"].as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["vm"], "web01");
    assert_eq!(reports[0]["outcome"]["outcome"], "success");
    assert_eq!(reports[1]["outcome"]["outcome"], "no_op");
}

#[test]
fn test_explicit_host_with_password_env() {
    Lab::new(LAB)
        .cmd()
        .args(["start", "web01", "--host", "esx01", "--user", "root"])
        .env("LABVM_PASSWORD", "secret")
        .assert()
        .success()
        .stdout(predicate::str::contains("powered on"));
}

#[test]
fn test_empty_inventory_is_not_an_error() {
    Lab::new("")
        .cmd()
        .arg("stop")
        .assert()
        .success()
        .stdout(predicate::str::contains("No machines matched"));
}

#[test]
fn test_no_session_is_fatal() {
    let home = TempDir::new().unwrap();
    Command::cargo_bin("labvm")
        .unwrap()
        .env("NO_COLOR", "1")
        .env_remove("GOVC_URL")
        .env_remove("LABVM_HOST")
        .arg("--config")
        .arg(home.path().join("config.toml"))
        .arg("start")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no active session"))
        .stderr(predicate::str::contains("No machines were touched"))
        .stderr(predicate::str::contains("GOVC_URL"));
}

#[test]
fn test_malformed_config_is_fatal() {
    let lab = Lab::new(LAB);
    std::fs::write(lab.home.path().join("config.toml"), "jobs = \"lots\"").unwrap();
    lab.cmd()
        .arg("start")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid config file"));
}
