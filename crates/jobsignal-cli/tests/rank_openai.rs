//! End-to-end `jobsignal rank` against a mock OpenAI-compatible server

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Two-dimensional embeddings: texts mentioning Rust point one way, the rest
/// the other. Inputs containing "REJECT" fail the whole request.
struct RustAxis;

impl Respond for RustAxis {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let inputs: Vec<String> = body["input"]
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        if inputs.iter().any(|t| t.contains("REJECT")) {
            return ResponseTemplate::new(400).set_body_string("rejected");
        }

        let data: Vec<serde_json::Value> = inputs
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let v = if t.contains("Rust") { [1.0, 0.0] } else { [0.0, 1.0] };
                serde_json::json!({"embedding": v, "index": i})
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": data}))
    }
}

async fn mock_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(RustAxis)
        .mount(&server)
        .await;
    server
}

fn write_inputs(dir: &Path, server_url: &str) -> (PathBuf, PathBuf, PathBuf) {
    let config = dir.join("jobsignal.toml");
    std::fs::write(
        &config,
        format!(
            "[embedding]\nprovider = \"openai\"\n\n[embedding.openai]\nurl = \"{}\"\nmodel = \"mock-embed\"\nmax_retries = 0\n",
            server_url
        ),
    )
    .unwrap();

    let jobs = dir.join("jobs.json");
    std::fs::write(
        &jobs,
        r#"[
            {"id": "go", "title": "Go developer", "skills": ["Go"]},
            {"id": "broken", "title": "REJECT me"},
            {"id": "rust", "title": "Rust engineer", "skills": ["Rust", "Tokio"]}
        ]"#,
    )
    .unwrap();

    let profile = dir.join("profile.json");
    std::fs::write(
        &profile,
        r#"{"summary": "Rust developer", "skills": ["rust"]}"#,
    )
    .unwrap();

    (config, jobs, profile)
}

#[allow(deprecated)]
fn jobsignal(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("jobsignal").expect("Failed to find jobsignal binary");
    cmd.env("HOME", home)
        .env_remove("OPENAI_API_KEY")
        .env_remove("JOBSIGNAL_EMBEDDING_PROVIDER")
        .env_remove("JOBSIGNAL_MODEL")
        .current_dir(home);
    cmd
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rank_json_report() {
    let server = mock_server().await;
    let home = TempDir::new().unwrap();
    let (config, jobs, profile) = write_inputs(home.path(), &server.uri());

    let output = jobsignal(home.path())
        .arg("--quiet")
        .arg("--config")
        .arg(&config)
        .args(["rank", "--output", "json", "--jobs"])
        .arg(&jobs)
        .arg("--profile")
        .arg(&profile)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "ranked");
    assert_eq!(report["scored"][0]["job"]["id"], "rust");
    assert_eq!(report["scored"][1]["job"]["id"], "go");
    assert_eq!(report["scored"][0]["missing_skills"][0], "Tokio");
    assert_eq!(report["errors"][0]["job_id"], "broken");
    assert_eq!(report["recommendations"][0]["skill"], "Tokio");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rank_text_report() {
    let server = mock_server().await;
    let home = TempDir::new().unwrap();
    let (config, jobs, profile) = write_inputs(home.path(), &server.uri());

    jobsignal(home.path())
        .arg("-q")
        .arg("--config")
        .arg(&config)
        .args(["rank", "--jobs"])
        .arg(&jobs)
        .arg("--profile")
        .arg(&profile)
        .assert()
        .success()
        .stdout(predicate::str::contains("Ranked 2 jobs"))
        .stdout(predicate::str::contains("1. "))
        .stdout(predicate::str::contains("Rust engineer"))
        .stdout(predicate::str::contains("Skipped 1 jobs"))
        .stdout(predicate::str::contains("Skills to learn"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rank_unreachable_provider_falls_back() {
    let home = TempDir::new().unwrap();
    let (config, jobs, profile) = write_inputs(home.path(), "http://127.0.0.1:9/v1");

    let output = jobsignal(home.path())
        .arg("--config")
        .arg(&config)
        .args(["rank", "--output", "json", "--jobs"])
        .arg(&jobs)
        .arg("--profile")
        .arg(&profile)
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "unranked");
    assert_eq!(report["reason"]["kind"], "candidate_embedding_failed");
    assert_eq!(report["jobs"][0]["id"], "go");
}
