//! Start-up behaviour of the binary.
//!
//! None of these reach the browser: every case exits during argument,
//! configuration or category handling.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

/// Helper: get a Command for the mapharvest binary.
fn mapharvest() -> assert_cmd::Command {
    cargo_bin_cmd!("mapharvest")
}

/// Helper: copy the real config into a temp dir so the binary finds
/// `./config/mapharvest.toml` relative to its working directory.
fn setup_config_dir(tmp: &TempDir) {
    let src = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
    let dst = tmp.path().join("config");
    fs::create_dir_all(&dst).unwrap();
    fs::copy(src.join("mapharvest.toml"), dst.join("mapharvest.toml")).unwrap();
}

#[test]
fn test_missing_config_exits_with_init_hint() {
    let tmp = TempDir::new().expect("create temp dir");

    mapharvest()
        .current_dir(tmp.path())
        .args(["--categories", "cafe", "--location", "Cairo", "--output", "out.csv"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found").and(predicate::str::contains("--init")));
}

#[test]
fn test_init_creates_config_file() {
    let tmp = TempDir::new().expect("create temp dir");
    let config_path = tmp.path().join("config").join("mapharvest.toml");

    mapharvest()
        .current_dir(tmp.path())
        .arg("--init")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Created default configuration file"));

    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[harvest]"), "config should have [harvest] section");
    assert!(content.contains("[pagination]"), "config should have [pagination] section");
}

#[test]
fn test_help_works_without_config() {
    let tmp = TempDir::new().expect("create temp dir");

    mapharvest()
        .current_dir(tmp.path())
        .arg("--help")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("--categories-file").and(predicate::str::contains("--restart-every")));
}

#[test]
fn test_location_is_required() {
    let tmp = TempDir::new().expect("create temp dir");

    mapharvest()
        .current_dir(tmp.path())
        .args(["--categories", "cafe", "--output", "out.csv"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--location"));
}

#[test]
fn test_empty_category_list_exits_non_zero() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);

    mapharvest()
        .current_dir(tmp.path())
        .args(["--categories", " , ,", "--location", "Cairo", "--output", "out.csv"])
        .timeout(Duration::from_secs(10))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No categories provided"));

    assert!(!tmp.path().join("out.csv").exists(), "no output before categories are known");
}

#[test]
fn test_comment_only_categories_file_exits_non_zero() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);
    let list = tmp.path().join("categories.txt");
    fs::write(&list, "# nothing yet\n\n").unwrap();

    mapharvest()
        .current_dir(tmp.path())
        .arg("--categories-file")
        .arg(&list)
        .args(["--location", "Cairo", "--output", "out.csv"])
        .timeout(Duration::from_secs(10))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No categories provided"));
}

#[test]
fn test_unreadable_categories_file_exits_non_zero() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);

    mapharvest()
        .current_dir(tmp.path())
        .args(["--categories-file", "missing.txt", "--location", "Cairo", "--output", "out.csv"])
        .timeout(Duration::from_secs(10))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to read categories file"));
}

#[test]
fn test_unknown_log_level_rejected() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);

    mapharvest()
        .current_dir(tmp.path())
        .args(["--categories", "cafe", "--location", "Cairo", "--output", "out.csv", "--log", "CHATTY"])
        .timeout(Duration::from_secs(10))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unknown log level"));
}

#[test]
fn test_invalid_config_values_rejected() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);
    let path = tmp.path().join("config").join("mapharvest.toml");
    let content = fs::read_to_string(&path).unwrap().replace("scroll_steps_min = 3", "scroll_steps_min = 9");
    fs::write(&path, content).unwrap();

    mapharvest()
        .current_dir(tmp.path())
        .args(["--categories", "cafe", "--location", "Cairo", "--output", "out.csv"])
        .timeout(Duration::from_secs(10))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}
