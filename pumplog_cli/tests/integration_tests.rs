//! Integration tests for the pumplog binary.
//!
//! These tests verify end-to-end behavior including:
//! - Decoding page files
//! - Parsing to stdout and to a locked output file
//! - Strict and lenient correlation
//! - Rejection of malformed input

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Alarm suspend at 2018-05-05T21:15:08, user-cleared resume 959 s later
const SUSPEND_RESUME: &str = "1e000c81ee52f6a0928866011f000c81ee56b5a092886602";

/// Temp basal completion with no basal segment before it
const ORPHAN_TEMP_BASAL: &str = "220015819638a1a101dbab000000004e2000001e00";

/// Basal segment start, pattern 1 at 0.85 U/h
const BASAL_SEGMENT: &str = "1d001181960000a101dbab010000002134";

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Helper to get the path to the CLI binary, isolated from the user's config
fn cli(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pumplog"));
    cmd.env("XDG_CONFIG_HOME", dir.join("config"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_pages(dir: &Path, name: &str, pages: &[&str]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, pages.join("\n") + "\n").expect("Failed to write pages");
    path
}

fn json_lines(text: &str) -> Vec<serde_json::Value> {
    text.lines()
        .map(|line| serde_json::from_str(line).expect("Invalid JSON line"))
        .collect()
}

#[test]
fn test_cli_help() {
    let temp_dir = setup_test_dir();
    cli(temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Medtronic 600-series pump history decoder",
        ));
}

#[test]
fn test_decode_lists_events() {
    let temp_dir = setup_test_dir();
    let pages = write_pages(temp_dir.path(), "pages.txt", &[SUSPEND_RESUME]);

    cli(temp_dir.path())
        .arg("decode")
        .arg(&pages)
        .assert()
        .success()
        .stdout(predicate::str::contains("INSULIN_DELIVERY_STOPPED"))
        .stdout(predicate::str::contains("INSULIN_DELIVERY_RESTARTED"))
        .stdout(predicate::str::contains("2018-05-05 21:15:08"))
        .stderr(predicate::str::contains("Decoded 2 events"));
}

#[test]
fn test_parse_to_stdout() {
    let temp_dir = setup_test_dir();
    let pages = write_pages(temp_dir.path(), "pages.txt", &[SUSPEND_RESUME]);

    let output = cli(temp_dir.path())
        .arg("parse")
        .arg(&pages)
        .arg("--now")
        .arg("2018-05-06T00:00:00Z")
        .output()
        .expect("Failed to run pumplog");
    assert!(output.status.success());

    let records = json_lines(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["type"], "suspend_resume");
    assert_eq!(records[0]["duration_ms"], 959_000);
    assert_eq!(records[0]["resolved"], true);
    assert_eq!(records[1]["type"], "suspend_basal");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Parsed 2 events into 2 records"));
}

#[test]
fn test_pages_span_lines_and_files() {
    let temp_dir = setup_test_dir();
    let first = write_pages(temp_dir.path(), "a.txt", &[BASAL_SEGMENT, ""]);
    let second = write_pages(
        temp_dir.path(),
        "b.txt",
        &[&SUSPEND_RESUME[..24], &SUSPEND_RESUME[24..]],
    );

    cli(temp_dir.path())
        .arg("parse")
        .arg(&first)
        .arg(&second)
        .assert()
        .success()
        .stderr(predicate::str::contains("Parsed 3 events into 3 records"));
}

#[test]
fn test_verbose_logs_stay_off_stdout() {
    let temp_dir = setup_test_dir();
    let pages = write_pages(temp_dir.path(), "pages.txt", &[SUSPEND_RESUME]);

    let output = cli(temp_dir.path())
        .arg("--verbose")
        .arg("parse")
        .arg(&pages)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Read 1 pages"));
    assert!(stderr.contains("Correlated 2 events into 2 records"));
    assert_eq!(json_lines(&String::from_utf8_lossy(&output.stdout)).len(), 2);
}

#[test]
fn test_parse_appends_to_output_file() {
    let temp_dir = setup_test_dir();
    let pages = write_pages(temp_dir.path(), "pages.txt", &[SUSPEND_RESUME]);
    let out = temp_dir.path().join("out/records.jsonl");

    for _ in 0..2 {
        cli(temp_dir.path())
            .arg("parse")
            .arg(&pages)
            .arg("--output")
            .arg(&out)
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }

    let content = fs::read_to_string(&out).expect("Failed to read output");
    assert_eq!(json_lines(&content).len(), 4);
}

#[test]
fn test_save_uses_configured_output_dir() {
    let temp_dir = setup_test_dir();
    let pages = write_pages(temp_dir.path(), "pages.txt", &[SUSPEND_RESUME]);
    let output_dir = temp_dir.path().join("saved");
    let config = temp_dir.path().join("pumplog.toml");
    fs::write(
        &config,
        format!(
            "[device]\ntimezone = \"America/New_York\"\n\n[output]\noutput_dir = {:?}\n",
            output_dir.display().to_string()
        ),
    )
    .unwrap();

    cli(temp_dir.path())
        .arg("--config")
        .arg(&config)
        .arg("parse")
        .arg(&pages)
        .arg("--save")
        .assert()
        .success();

    let content = fs::read_to_string(output_dir.join("records.jsonl")).unwrap();
    let records = json_lines(&content);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["timezone_offset"], -240);
    assert_eq!(records[0]["time"], "2018-05-06T01:15:08Z");
}

#[test]
fn test_timezone_flag_overrides_config() {
    let temp_dir = setup_test_dir();
    let pages = write_pages(temp_dir.path(), "pages.txt", &[SUSPEND_RESUME]);

    let output = cli(temp_dir.path())
        .arg("parse")
        .arg(&pages)
        .arg("--timezone")
        .arg("Asia/Tokyo")
        .output()
        .unwrap();
    assert!(output.status.success());
    let records = json_lines(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(records[0]["timezone_offset"], 540);
}

#[test]
fn test_settings_file_adds_snapshot() {
    let temp_dir = setup_test_dir();
    let pages = write_pages(temp_dir.path(), "pages.txt", &[SUSPEND_RESUME]);
    let settings = temp_dir.path().join("settings.json");
    fs::write(
        &settings,
        r#"{
            "timestamp": { "counter": 2179880629, "offset": -1601009562 },
            "model": "MMT-1780",
            "active_schedule": "Pattern 1"
        }"#,
    )
    .unwrap();

    let output = cli(temp_dir.path())
        .arg("parse")
        .arg(&pages)
        .arg("--settings")
        .arg(&settings)
        .output()
        .unwrap();
    assert!(output.status.success());

    let records = json_lines(&String::from_utf8_lossy(&output.stdout));
    assert_eq!(records.len(), 3);
    let snapshot = records
        .iter()
        .find(|r| r["type"] == "pump_settings")
        .expect("No settings snapshot");
    assert_eq!(snapshot["model"], "MMT-1780");
}

#[test]
fn test_strict_violation_fails_without_output() {
    let temp_dir = setup_test_dir();
    let page = format!("{SUSPEND_RESUME}{ORPHAN_TEMP_BASAL}");
    let pages = write_pages(temp_dir.path(), "pages.txt", &[page.as_str()]);
    let out = temp_dir.path().join("records.jsonl");

    cli(temp_dir.path())
        .arg("parse")
        .arg(&pages)
        .arg("--output")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("MissingSuppressedBasal"));
    assert!(!out.exists());
}

#[test]
fn test_lenient_skips_violation() {
    let temp_dir = setup_test_dir();
    let page = format!("{SUSPEND_RESUME}{ORPHAN_TEMP_BASAL}");
    let pages = write_pages(temp_dir.path(), "pages.txt", &[page.as_str()]);

    cli(temp_dir.path())
        .arg("parse")
        .arg(&pages)
        .arg("--lenient")
        .assert()
        .success()
        .stderr(predicate::str::contains("(1 skipped"));
}
