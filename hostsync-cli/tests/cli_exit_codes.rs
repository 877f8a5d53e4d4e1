use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SCRIPTS: &str = "usr/share/sonic/systemd_scripts";

fn hostsync() -> Command {
    let mut cmd = Command::cargo_bin("hostsync").expect("hostsync binary");
    cmd.env_remove("IS_V1_ENABLED").arg("--no-syslog");
    cmd
}

fn seed_image(root: &Path, names: &[&str]) {
    let scripts = root.join(SCRIPTS);
    fs::create_dir_all(&scripts).unwrap();
    for name in names {
        fs::write(scripts.join(name), b"#!/bin/sh\n").unwrap();
    }
}

#[test]
fn missing_source_exits_two_and_names_the_path() {
    let image = TempDir::new().unwrap();

    hostsync()
        .arg("--once")
        .arg("--source-root")
        .arg(image.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("sync source missing"))
        .stderr(predicate::str::contains("systemd_scripts/restapi.sh"));
}

#[test]
fn rust_log_cannot_silence_the_startup_error() {
    let image = TempDir::new().unwrap();

    hostsync()
        .env("RUST_LOG", "off")
        .arg("--once")
        .arg("--source-root")
        .arg(image.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("sync source missing"));
}

#[test]
fn v1_flag_selects_the_v1_launcher() {
    let image = TempDir::new().unwrap();
    seed_image(
        image.path(),
        &["restapi.sh", "restapi.service", "container_checker", "restapi_watchdog.sh"],
    );

    hostsync()
        .env("IS_V1_ENABLED", "true")
        .arg("--once")
        .arg("--source-root")
        .arg(image.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("restapi_v1.sh"));
}

#[test]
fn zero_interval_is_a_usage_error() {
    hostsync().args(["--interval", "0"]).assert().code(2);
}

#[test]
fn json_requires_once() {
    hostsync()
        .arg("--json")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--once"));
}

#[test]
fn unknown_log_level_is_rejected() {
    hostsync().args(["--log-level", "loud"]).assert().code(2);
}

#[test]
fn source_root_must_exist() {
    let image = TempDir::new().unwrap();

    hostsync()
        .arg("--once")
        .arg("--source-root")
        .arg(image.path().join("absent"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("is not a directory"));
}
