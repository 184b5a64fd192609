//! Binary-level tests of the command-line interface

use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("report-downloader").unwrap();
    cmd.env_remove("REPORT_STAGING_DIR")
        .env_remove("REPORT_OUTPUT_DIR")
        .env("RUST_LOG", "off");
    cmd
}

#[test]
fn test_modules_json_lists_registry() {
    let output = cmd()
        .args(["--output-format", "json", "modules"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = doc["modules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["module"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["CCM", "PRR", "SOL"]);
    assert_eq!(doc["default_variants"].as_array().unwrap().len(), 7);
}

#[test]
fn test_validate_reports_then_creates_layout() {
    let temp_dir = TempDir::new().unwrap();
    let staging = temp_dir.path().join("staging");
    let output = temp_dir.path().join("output");
    let roots = [
        "--staging-dir",
        staging.to_str().unwrap(),
        "--output-dir",
        output.to_str().unwrap(),
    ];

    cmd()
        .args(roots)
        .args(["validate", "--modules", "CCM"])
        .assert()
        .failure();
    assert!(!staging.exists());

    cmd()
        .args(roots)
        .args(["validate", "--modules", "CCM", "--create"])
        .assert()
        .success();
    assert!(staging.join("CCM").is_dir());
    assert!(output.join("CCM").is_dir());
}

#[test]
fn test_optimize_writes_requested_formats() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input");
    fs::create_dir_all(&input).unwrap();
    fs::write(
        input.join("2024_A.csv"),
        "Reporte\n\n\nTramite,Monto\nLM1,3.5\nLM2,4\n",
    )
    .unwrap();
    let output = temp_dir.path().join("output");

    let result = cmd()
        .args([
            "--output-format",
            "json",
            "--output-dir",
            output.to_str().unwrap(),
            "optimize",
            "--module",
            "PRR",
            "--input",
            input.to_str().unwrap(),
            "--formats",
            "csv,parquet",
        ])
        .output()
        .unwrap();
    assert!(result.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&result.stdout).unwrap();
    assert_eq!(doc["status"], "all succeeded");
    assert_eq!(doc["processing"][0]["rows"], 2);
    assert!(output.join("PRR/prr_consolidated.csv").is_file());
    assert!(output.join("PRR/prr_consolidated.parquet").is_file());
    assert!(!output.join("PRR/prr_consolidated.xlsx").exists());
}

#[test]
fn test_download_without_credentials_fails() {
    let temp_dir = TempDir::new().unwrap();
    cmd()
        .env_remove("REPORT_USERNAME")
        .env_remove("REPORT_PASSWORD")
        .args([
            "--staging-dir",
            temp_dir.path().to_str().unwrap(),
            "download",
            "--modules",
            "CCM",
            "--from",
            "2024",
            "--to",
            "2024",
        ])
        .assert()
        .failure();
}

#[test]
fn test_invalid_worker_count_rejected() {
    cmd()
        .args(["--max-workers", "0", "modules"])
        .assert()
        .failure();
}
