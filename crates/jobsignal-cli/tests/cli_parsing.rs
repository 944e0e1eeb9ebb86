//! CLI parsing tests for the jobsignal command
//!
//! Every command runs with HOME pointed at a temp dir so no real global
//! config is picked up.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a Command for the jobsignal binary, isolated in `home`
#[allow(deprecated)]
fn jobsignal(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("jobsignal").expect("Failed to find jobsignal binary");
    cmd.env("HOME", home)
        .env_remove("JOBSIGNAL_CONFIG")
        .env_remove("JOBSIGNAL_EMBEDDING_PROVIDER")
        .env_remove("JOBSIGNAL_MODEL")
        .current_dir(home);
    cmd
}

fn write_jobs(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("jobs.json");
    std::fs::write(
        &path,
        r#"[
            {"id": "b", "title": "Backend engineer", "location": "Berlin", "skills": ["Rust"]},
            {"id": "a", "title": "Analyst", "posted_at": "2025-06-01"}
        ]"#,
    )
    .unwrap();
    path
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_shows_all_commands() {
    let home = TempDir::new().unwrap();
    jobsignal(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("rank"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    jobsignal(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("jobsignal"));
}

#[test]
fn test_global_options_in_help() {
    let home = TempDir::new().unwrap();
    jobsignal(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--verbose"))
        .stdout(predicate::str::contains("--quiet"))
        .stdout(predicate::str::contains("--embedding-provider"))
        .stdout(predicate::str::contains("--model"));
}

#[test]
fn test_invalid_embedding_provider_rejected() {
    let home = TempDir::new().unwrap();
    jobsignal(home.path())
        .args(["--embedding-provider", "word2vec", "config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown embedding provider"));
}

// ============================================================================
// Rank Command Tests
// ============================================================================

#[test]
fn test_rank_help() {
    let home = TempDir::new().unwrap();
    jobsignal(home.path())
        .args(["rank", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--jobs"))
        .stdout(predicate::str::contains("--profile"))
        .stdout(predicate::str::contains("--output"));
}

#[test]
fn test_rank_requires_jobs() {
    let home = TempDir::new().unwrap();
    jobsignal(home.path())
        .arg("rank")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--jobs"));
}

#[test]
fn test_rank_missing_jobs_file() {
    let home = TempDir::new().unwrap();
    jobsignal(home.path())
        .args(["rank", "--jobs", "nope.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read jobs file"));
}

#[test]
fn test_rank_malformed_jobs_file() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("jobs.json");
    std::fs::write(&path, r#"{"not": "an array"}"#).unwrap();

    jobsignal(home.path())
        .args(["rank", "--jobs"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse jobs file"));
}

#[test]
fn test_rank_without_profile_keeps_discovery_order() {
    let home = TempDir::new().unwrap();
    let jobs = write_jobs(home.path());

    let output = jobsignal(home.path())
        .args(["--quiet", "rank", "--output", "json", "--jobs"])
        .arg(&jobs)
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "unranked");
    assert_eq!(report["reason"]["kind"], "no_profile");
    assert_eq!(report["jobs"][0]["id"], "b");
    assert_eq!(report["jobs"][1]["id"], "a");
}

#[test]
fn test_rank_without_profile_text_output() {
    let home = TempDir::new().unwrap();
    let jobs = write_jobs(home.path());

    jobsignal(home.path())
        .args(["-q", "rank", "--jobs"])
        .arg(&jobs)
        .assert()
        .success()
        .stdout(predicate::str::contains("discovery order"))
        .stdout(predicate::str::contains("1. Backend engineer (Berlin)"));
}

#[test]
fn test_rank_rejects_invalid_top_n() {
    let home = TempDir::new().unwrap();
    let jobs = write_jobs(home.path());

    jobsignal(home.path())
        .args(["rank", "--top-n", "0", "--jobs"])
        .arg(&jobs)
        .assert()
        .failure();
}

// ============================================================================
// Config Command Tests
// ============================================================================

#[test]
fn test_config_init_creates_file() {
    let home = TempDir::new().unwrap();
    jobsignal(home.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));

    let path = home.path().join(".jobsignal").join("config.toml");
    assert!(path.exists());
    let content = std::fs::read_to_string(path).unwrap();
    assert!(content.contains("[embedding]"));
    assert!(content.contains("[ranking]"));
}

#[test]
fn test_config_validate_defaults() {
    let home = TempDir::new().unwrap();
    jobsignal(home.path())
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("provider: local"));
}

#[test]
fn test_config_validate_rejects_bad_weights() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("bad.toml");
    std::fs::write(
        &path,
        "[ranking.weights]\nsimilarity = 0.9\nlocation = 0.1\nrecency = 0.1\nskill_overlap = 0.1\n",
    )
    .unwrap();

    jobsignal(home.path())
        .args(["config", "validate", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config file"));
}

#[test]
fn test_config_show_applies_overrides() {
    let home = TempDir::new().unwrap();
    let output = jobsignal(home.path())
        .args([
            "--embedding-provider",
            "openai",
            "--model",
            "nomic-embed-text",
            "config",
            "show",
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["embedding"]["provider"], "openai");
    assert_eq!(config["embedding"]["openai"]["model"], "nomic-embed-text");
}

#[test]
fn test_config_path_json() {
    let home = TempDir::new().unwrap();
    let output = jobsignal(home.path())
        .args(["config", "path", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let paths: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(paths["local_exists"], false);
    assert_eq!(paths["global_exists"], false);
}

// ============================================================================
// Status Command Tests
// ============================================================================

#[test]
fn test_status_help() {
    let home = TempDir::new().unwrap();
    jobsignal(home.path())
        .args(["status", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--warmup"))
        .stdout(predicate::str::contains("--json"));
}
