#![allow(deprecated)] // TODO: move from cargo_bin to cargo_bin_cmd!

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

/// Command with an empty configuration file so no local config leaks in
fn flightdeck(dir: &tempfile::TempDir) -> Command {
    let config = dir.path().join("flightdeck.yml");
    if !config.exists() {
        fs::write(&config, "region: eu-west-1\n").unwrap();
    }
    let mut cmd = Command::cargo_bin("flightdeck").unwrap();
    cmd.env("FLIGHTDECK_CONFIG", &config)
        .env_remove("FLIGHT_REGION")
        .env_remove("AWS_REGION")
        .current_dir(dir.path());
    cmd
}

#[test]
fn test_cli_help() {
    let dir = tempfile::tempdir().unwrap();
    flightdeck(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("HPC clusters"))
        .stdout(predicate::str::contains("domain"))
        .stdout(predicate::str::contains("cluster"))
        .stdout(predicate::str::contains("infra"))
        .stdout(predicate::str::contains("cleanup"));
}

#[test]
fn test_cli_version() {
    let dir = tempfile::tempdir().unwrap();
    flightdeck(&dir)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("flightdeck"));
}

#[test]
fn test_cluster_launch_help() {
    let dir = tempfile::tempdir().unwrap();
    flightdeck(&dir)
        .args(["cluster", "launch", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<CLUSTER>"))
        .stdout(predicate::str::contains("--solo"))
        .stdout(predicate::str::contains("--key-pair"));
}

#[test]
fn test_config_defaults() {
    let dir = tempfile::tempdir().unwrap();
    flightdeck(&dir)
        .args(["config", "defaults"])
        .assert()
        .success()
        .stdout(predicate::str::contains("key-pair: flight-admin"))
        .stdout(predicate::str::contains("compute-spot-price"));
}

#[test]
fn test_config_show_reads_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("custom.yml");
    fs::write(
        &config,
        "region: ap-southeast-2\nkey-pair: lab-key\nsecret-key: abcdefgh\n",
    )
    .unwrap();

    flightdeck(&dir)
        .arg("--config")
        .arg(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Region: ap-southeast-2"))
        .stdout(predicate::str::contains("Key pair: lab-key"))
        .stdout(predicate::str::contains("abcd****"))
        .stdout(predicate::str::contains("abcdefgh").not());
}

#[test]
fn test_config_region_flag_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    flightdeck(&dir)
        .args(["--region", "us-west-2", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Region: us-west-2"));
}

#[test]
fn test_config_params_writes_tables() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("params");
    flightdeck(&dir)
        .args(["config", "params"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("domain.yml"));
    assert!(target.join("domain.yml").exists());

    // A second run refuses to overwrite
    flightdeck(&dir)
        .args(["config", "params"])
        .arg(&target)
        .assert()
        .failure();
}

#[test]
fn test_config_catalog() {
    let dir = tempfile::tempdir().unwrap();
    flightdeck(&dir)
        .args(["config", "catalog"])
        .assert()
        .success()
        .stdout(predicate::str::contains("compute instance type"));
}

#[test]
fn test_invalid_master_instance_type_rejected() {
    let dir = tempfile::tempdir().unwrap();
    flightdeck(&dir)
        .args(["cluster", "launch", "hpc", "-m", "t2.large"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid instance type 't2.large'"));
}

#[test]
fn test_unknown_appliance_rejected() {
    let dir = tempfile::tempdir().unwrap();
    flightdeck(&dir)
        .args(["infra", "launch", "mail-server"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown appliance type: mail-server"));
}

#[test]
fn test_solo_conflicts_with_domain() {
    let dir = tempfile::tempdir().unwrap();
    flightdeck(&dir)
        .args(["cluster", "launch", "hpc", "--solo", "-d", "lab"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}
