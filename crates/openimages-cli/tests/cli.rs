// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CLASSES: &str = "/m/0zvk5,Helmet\n/m/01g317,Person\n/m/01lrl,Carnivore\n/m/0gxl3,Bicycle helmet\n";

fn cached_classes() -> Result<TempDir, Box<dyn std::error::Error>> {
    let cache = TempDir::new()?;
    std::fs::write(cache.path().join("class-descriptions-boxable.csv"), CLASSES)?;
    Ok(cache)
}

#[test]
fn test_help() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("openimages-mirror")?;
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("labels"));
    Ok(())
}

#[test]
fn test_version() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("openimages-mirror")?;
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn test_download_requires_labels() -> Result<(), Box<dyn std::error::Error>> {
    let output = TempDir::new()?;
    let mut cmd = Command::cargo_bin("openimages-mirror")?;
    cmd.arg("download").arg("--output").arg(output.path());
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--labels"));
    Ok(())
}

#[test]
fn test_download_rejects_bad_limit() -> Result<(), Box<dyn std::error::Error>> {
    let output = TempDir::new()?;
    let mut cmd = Command::cargo_bin("openimages-mirror")?;
    cmd.arg("download")
        .arg("--output")
        .arg(output.path())
        .args(["--labels", "Helmet", "--limit", "-3"]);
    cmd.assert().failure();
    Ok(())
}

#[test]
fn test_labels_from_cache() -> Result<(), Box<dyn std::error::Error>> {
    let cache = cached_classes()?;
    let mut cmd = Command::cargo_bin("openimages-mirror")?;
    cmd.arg("labels").arg("--cache-dir").arg(cache.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("/m/0zvk5 Helmet"))
        .stdout(predicate::str::contains("/m/01lrl Carnivore"));
    Ok(())
}

#[test]
fn test_labels_filter() -> Result<(), Box<dyn std::error::Error>> {
    let cache = cached_classes()?;
    let mut cmd = Command::cargo_bin("openimages-mirror")?;
    cmd.arg("labels")
        .arg("--cache-dir")
        .arg(cache.path())
        .args(["--name", "helmet"]);

    let stdout = String::from_utf8(cmd.ok()?.stdout)?;
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, ["/m/0zvk5 Helmet", "/m/0gxl3 Bicycle helmet"]);
    Ok(())
}

#[test]
fn test_download_unknown_label() -> Result<(), Box<dyn std::error::Error>> {
    let cache = cached_classes()?;
    let output = TempDir::new()?;
    let mut cmd = Command::cargo_bin("openimages-mirror")?;
    cmd.arg("download")
        .arg("--cache-dir")
        .arg(cache.path())
        .arg("--output")
        .arg(output.path())
        .args(["--labels", "Helmet,Unicorn"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Unicorn"));
    assert!(!output.path().join("Helmet").exists());
    Ok(())
}
