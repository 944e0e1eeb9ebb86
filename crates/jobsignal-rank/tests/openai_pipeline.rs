//! Ranking sessions against a mock OpenAI-compatible embeddings server
//!
//! Exercises the full path: config -> ProviderHandle -> OpenAIProvider ->
//! HTTP -> index -> ranking.
//!
//! An optional test at the bottom talks to a real Ollama instance:
//! ```bash
//! ollama pull nomic-embed-text
//! cargo test -p jobsignal-rank --test openai_pipeline -- --ignored
//! ```

mod common;

use std::sync::Arc;

use jobsignal_config::{EmbeddingConfig, EmbeddingProviderType, OpenAISettings};
use jobsignal_rank::{
    CandidateProfile, JobRecord, ProviderHandle, RankError, RankingConfig, RankingPipeline,
    RankingReport,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use common::{today, FakeProvider};

// ============================================================================
// Mock server
// ============================================================================

/// Answers every embeddings request with bag-of-words vectors.
///
/// Requests containing "REJECT" anywhere get a 400, like a provider refusing
/// one malformed input.
struct BagOfWords;

impl Respond for BagOfWords {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(_) => return ResponseTemplate::new(400),
        };
        let inputs: Vec<String> = body["input"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        if inputs.iter().any(|t| t.contains("REJECT")) {
            return ResponseTemplate::new(400).set_body_string("input rejected");
        }

        let data: Vec<serde_json::Value> = inputs
            .iter()
            .enumerate()
            .map(|(i, text)| {
                serde_json::json!({
                    "object": "embedding",
                    "embedding": FakeProvider::vector(text),
                    "index": i,
                })
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "object": "list",
            "data": data,
            "model": body["model"],
        }))
    }
}

async fn mock_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(BagOfWords)
        .mount(&server)
        .await;
    server
}

fn openai_config(url: &str, model: &str) -> EmbeddingConfig {
    EmbeddingConfig {
        provider: EmbeddingProviderType::Openai,
        openai: Some(OpenAISettings {
            url: url.to_string(),
            api_key_env: None,
            model: model.to_string(),
            timeout_secs: 5,
            max_retries: 0,
            azure_mode: false,
        }),
        ..Default::default()
    }
}

fn pipeline_for(handle: Arc<ProviderHandle>) -> RankingPipeline {
    RankingPipeline::new(handle, RankingConfig::default())
        .unwrap()
        .with_now(today())
}

fn jobs() -> Vec<JobRecord> {
    vec![
        JobRecord::new("pastry", "Pastry chef")
            .with_location("Paris")
            .with_skills(["Baking"])
            .with_description("Croissants and tarts every morning"),
        JobRecord::new("rust", "Rust engineer")
            .with_location("Remote")
            .with_skills(["Rust", "Tokio"])
            .with_description("Async network services in Rust")
            .with_posted_at(today()),
    ]
}

fn rust_candidate() -> CandidateProfile {
    CandidateProfile::new("Rust engineer who writes async network services")
        .with_skills(["Rust"])
}

// ============================================================================
// Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_ranks_through_http_provider() {
    let server = mock_server().await;
    let handle = Arc::new(ProviderHandle::new(openai_config(&server.uri(), "mock-embed")));
    let mut pipeline = pipeline_for(handle.clone());

    let report = pipeline.run(Some(rust_candidate()), jobs()).await.unwrap();

    assert_eq!(report.job_ids(), vec!["rust", "pastry"]);
    assert!(report.errors().is_empty());
    assert!(handle.is_initialized());

    let RankingReport::Ranked { scored, .. } = report else {
        panic!("expected ranked report");
    };
    assert_eq!(scored[0].missing_skills, vec!["Tokio"]);
    assert!(scored[0].sub_scores.similarity > scored[1].sub_scores.similarity);
}

#[tokio::test]
async fn test_rejected_posting_reported_by_id() {
    let server = mock_server().await;
    let handle = Arc::new(ProviderHandle::new(openai_config(&server.uri(), "mock-embed")));
    let mut pipeline = pipeline_for(handle);

    let mut batch = jobs();
    batch.push(JobRecord::new("broken", "REJECT this posting"));

    let report = pipeline.run(Some(rust_candidate()), batch).await.unwrap();

    assert_eq!(report.job_ids(), vec!["rust", "pastry"]);
    let errors = report.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].job_id, "broken");
    assert!(matches!(
        &errors[0].error,
        RankError::Embedding { provider, index: 2, .. } if provider == "openai:mock-embed"
    ));
}

#[tokio::test]
async fn test_unreachable_provider_leaves_jobs_unranked() {
    // Nothing listens on the discard port.
    let handle = Arc::new(ProviderHandle::new(openai_config(
        "http://127.0.0.1:9/v1",
        "mock-embed",
    )));
    let mut pipeline = pipeline_for(handle);

    let report = pipeline.run(Some(rust_candidate()), jobs()).await.unwrap();

    assert!(!report.is_ranked());
    assert_eq!(report.job_ids(), vec!["pastry", "rust"]);
}

#[tokio::test]
async fn test_reconfigure_switches_provider_and_rebuilds() {
    let first = mock_server().await;
    let second = mock_server().await;
    let handle = Arc::new(ProviderHandle::new(openai_config(&first.uri(), "mock-embed")));
    let mut pipeline = pipeline_for(handle.clone());

    pipeline.run(Some(rust_candidate()), jobs()).await.unwrap();
    assert_eq!(pipeline.index_generation(), 1);
    assert!(second.received_requests().await.unwrap().is_empty());

    // Same settings: nothing changes.
    assert!(!handle
        .reconfigure(openai_config(&first.uri(), "mock-embed"))
        .unwrap());
    pipeline.run(Some(rust_candidate()), jobs()).await.unwrap();
    assert_eq!(pipeline.index_generation(), 1);

    assert!(handle
        .reconfigure(openai_config(&second.uri(), "mock-embed"))
        .unwrap());
    let report = pipeline.run(Some(rust_candidate()), jobs()).await.unwrap();

    assert!(report.is_ranked());
    assert_eq!(pipeline.index_generation(), 2);
    // One batch for the jobs, one for the profile.
    assert_eq!(second.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_reconfigure_keeps_current_provider() {
    let server = mock_server().await;
    let handle = Arc::new(ProviderHandle::new(openai_config(&server.uri(), "mock-embed")));
    let mut pipeline = pipeline_for(handle.clone());

    let broken = EmbeddingConfig {
        provider: EmbeddingProviderType::Openai,
        openai: None,
        ..Default::default()
    };
    let err = handle.reconfigure(broken).unwrap_err();
    assert!(matches!(err, RankError::Configuration(_)));

    let report = pipeline.run(Some(rust_candidate()), jobs()).await.unwrap();
    assert!(report.is_ranked());
}

// ============================================================================
// Live Ollama (ignored by default)
// ============================================================================

const OLLAMA_URL: &str = "http://localhost:11434/v1";

/// Check if Ollama answers on its default port
async fn ollama_available() -> bool {
    reqwest::Client::new()
        .get("http://localhost:11434/api/tags")
        .send()
        .await
        .map(|r| r.status().is_success())
        .unwrap_or(false)
}

macro_rules! require_ollama {
    () => {
        if !ollama_available().await {
            eprintln!("Skipping test: Ollama not available at {}", OLLAMA_URL);
            return;
        }
    };
}

#[tokio::test]
#[ignore = "requires a running Ollama with nomic-embed-text"]
async fn test_ollama_semantic_ranking() {
    require_ollama!();

    let handle = Arc::new(ProviderHandle::new(openai_config(
        OLLAMA_URL,
        "nomic-embed-text",
    )));
    let mut pipeline = pipeline_for(handle);

    let report = pipeline.run(Some(rust_candidate()), jobs()).await.unwrap();

    assert_eq!(report.job_ids()[0], "rust");
}
