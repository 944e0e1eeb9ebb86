//! Embeddings over an OpenAI-compatible HTTP API.
//!
//! Works against api.openai.com, Azure OpenAI deployments and local servers
//! such as Ollama that expose `/v1/embeddings`. Large batches are split into
//! chunks, transient failures are retried with exponential backoff, and each
//! response is checked for count, order and dimension before it is returned.
//!
//! ```ignore
//! use jobsignal_rank::embeddings::openai::{OpenAIConfig, OpenAIProvider};
//!
//! let provider = OpenAIProvider::new(OpenAIConfig::ollama())?;
//! let vectors = provider.embed_batch(vec!["Rust engineer | Berlin".into()]).await?;
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use jobsignal_config::OpenAISettings;

use super::provider::{EmbeddingProvider, EmbeddingProviderType, ProviderStatus};
use crate::error::{ProviderFailure, RankError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FIRST_BACKOFF: Duration = Duration::from_millis(500);
const RETRY_AFTER_CAP: Duration = Duration::from_secs(30);
const DEFAULT_RETRIES: u32 = 2;

/// Inputs per HTTP request; larger batches are split.
const CHUNK_SIZE: usize = 256;

#[cfg(feature = "rate-limit")]
mod throttle {
    use std::num::NonZeroU32;

    use governor::clock::DefaultClock;
    use governor::state::{InMemoryState, NotKeyed};
    use governor::{Quota, RateLimiter};

    pub(super) const DEFAULT_RPS: u32 = 10;

    /// Client-side request pacing.
    pub(super) struct Throttle(RateLimiter<NotKeyed, InMemoryState, DefaultClock>);

    impl Throttle {
        pub(super) fn per_second(rps: u32) -> Self {
            let rps = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
            Self(RateLimiter::direct(Quota::per_second(rps)))
        }

        pub(super) async fn wait(&self) {
            self.0.until_ready().await;
        }
    }
}

#[cfg(not(feature = "rate-limit"))]
mod throttle {
    pub(super) struct Throttle;

    impl Throttle {
        pub(super) async fn wait(&self) {}
    }
}

use throttle::Throttle;

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// Base URL, with or without a trailing `/v1`
    pub base_url: String,
    /// Omitted for servers without auth (Ollama)
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    /// Retries after the first attempt, transient failures only
    pub max_retries: u32,
    /// Wait before the first retry; doubles afterwards
    pub retry_base_delay: Duration,
    /// Send the key as `api-key` rather than a bearer token
    pub azure_mode: bool,
    #[cfg(feature = "rate-limit")]
    pub requests_per_second: u32,
}

impl OpenAIConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            timeout: REQUEST_TIMEOUT,
            max_retries: DEFAULT_RETRIES,
            retry_base_delay: FIRST_BACKOFF,
            azure_mode: false,
            #[cfg(feature = "rate-limit")]
            requests_per_second: throttle::DEFAULT_RPS,
        }
    }

    /// A local Ollama server running `nomic-embed-text`.
    pub fn ollama() -> Self {
        Self::new("http://localhost:11434/v1", "nomic-embed-text")
    }

    /// The hosted OpenAI API with its default embedding model.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new(
            "https://api.openai.com/v1",
            jobsignal_config::DEFAULT_OPENAI_MODEL,
        )
        .with_api_key(api_key)
    }

    /// Build from the `[embedding.openai]` section. The key itself is read
    /// from the environment variable the section names; an unset or empty
    /// variable means no key.
    pub fn from_settings(settings: &OpenAISettings) -> Self {
        let mut config = Self::new(settings.url.clone(), settings.model.clone())
            .with_timeout(Duration::from_secs(settings.timeout_secs))
            .with_max_retries(settings.max_retries);
        config.api_key = settings
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty());
        config.azure_mode = settings.azure_mode;
        config
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    #[cfg(feature = "rate-limit")]
    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }
}

/// How requests prove who they are.
enum Credential {
    Anonymous,
    Bearer(String),
    AzureKey(String),
}

impl Credential {
    fn from_config(config: &OpenAIConfig) -> Self {
        match (&config.api_key, config.azure_mode) {
            (None, _) => Credential::Anonymous,
            (Some(key), true) => Credential::AzureKey(key.clone()),
            (Some(key), false) => Credential::Bearer(key.clone()),
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credential::Anonymous => request,
            Credential::Bearer(key) => request.bearer_auth(key),
            Credential::AzureKey(key) => request.header("api-key", key),
        }
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct WireResponse {
    data: Vec<WireItem>,
}

#[derive(Deserialize)]
struct WireItem {
    embedding: Vec<f32>,
    index: usize,
}

/// Embedding provider backed by an OpenAI-compatible `/v1/embeddings` API.
pub struct OpenAIProvider {
    client: Client,
    endpoint: String,
    credential: Credential,
    config: OpenAIConfig,
    /// 0 until the first response reveals it
    dimension: AtomicUsize,
    throttle: Throttle,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RankError::Configuration(format!("cannot build HTTP client: {e}")))?;

        #[cfg(feature = "rate-limit")]
        let throttle = Throttle::per_second(config.requests_per_second);
        #[cfg(not(feature = "rate-limit"))]
        let throttle = Throttle;

        Ok(Self {
            client,
            endpoint: embeddings_endpoint(&config.base_url),
            credential: Credential::from_config(&config),
            config,
            dimension: AtomicUsize::new(0),
            throttle,
        })
    }

    fn label(&self) -> String {
        format!("openai:{}", self.config.model)
    }

    /// Embed one chunk. `offset` is the chunk's position in the caller's
    /// batch, so errors point at the right input.
    async fn embed_chunk(&self, texts: &[String], offset: usize) -> Result<Vec<Vec<f32>>> {
        let first = texts.first().map(String::as_str).unwrap_or_default();
        let items = self
            .post_with_retry(texts)
            .await
            .map_err(|cause| RankError::embedding(self.label(), offset, first, cause))?;

        let vectors = order_by_index(items, texts.len()).map_err(|(position, cause)| {
            let text = texts.get(position).map(String::as_str).unwrap_or(first);
            RankError::embedding(self.label(), offset + position, text, cause)
        })?;

        if let Some(dim) = vectors.first().map(Vec::len) {
            self.check_dimension(dim)?;
        }
        Ok(vectors)
    }

    /// Remember the first dimension seen and reject any later change.
    fn check_dimension(&self, dim: usize) -> Result<()> {
        match self
            .dimension
            .compare_exchange(0, dim, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                debug!(dimension = dim, model = %self.config.model, "Learned embedding dimension");
                Ok(())
            }
            Err(known) if known == dim => Ok(()),
            Err(known) => Err(RankError::DimensionMismatch {
                expected: known,
                actual: dim,
            }),
        }
    }

    async fn post_with_retry(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<WireItem>, ProviderFailure> {
        let mut backoff = self.config.retry_base_delay;
        let mut attempt = 0;

        loop {
            self.throttle.wait().await;

            let failure = match self.post(texts).await {
                Ok(items) => return Ok(items),
                Err(failure) => failure,
            };
            if !failure.is_transient() || attempt >= self.config.max_retries {
                return Err(failure);
            }

            let delay = retry_delay(&failure, backoff);
            warn!(
                attempt = attempt + 1,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Embedding request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            backoff *= 2;
            attempt += 1;
        }
    }

    async fn post(&self, texts: &[String]) -> std::result::Result<Vec<WireItem>, ProviderFailure> {
        let body = WireRequest {
            model: &self.config.model,
            input: texts,
        };
        let request = self.client.post(&self.endpoint).json(&body);
        let response = self
            .credential
            .apply(request)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        if status.is_success() {
            let parsed: WireResponse = response
                .json()
                .await
                .map_err(|e| ProviderFailure::InvalidResponse(e.to_string()))?;
            return Ok(parsed.data);
        }

        let retry_after = retry_after_secs(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(status_failure(status, retry_after, body, &self.config.model))
    }

    /// Round-trip a one-word request and report how long it took.
    async fn probe(&self) -> std::result::Result<Duration, ProviderFailure> {
        let started = Instant::now();
        match self.post(&["health check".to_string()]).await {
            Ok(items) => {
                if let Some(item) = items.first() {
                    let _ = self.check_dimension(item.embedding.len());
                }
                Ok(started.elapsed())
            }
            // reachable, just busy
            Err(ProviderFailure::RateLimited { .. }) => Ok(started.elapsed()),
            Err(failure) => Err(failure),
        }
    }
}

fn embeddings_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = base.strip_suffix("/v1").unwrap_or(base);
    format!("{base}/v1/embeddings")
}

fn transport_failure(err: reqwest::Error) -> ProviderFailure {
    let what = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    ProviderFailure::Unavailable(format!("{what}: {err}"))
}

fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}

/// Map a non-success HTTP status to a failure kind. Only rate limits and
/// server errors are retried.
fn status_failure(
    status: StatusCode,
    retry_after: Option<u64>,
    body: String,
    model: &str,
) -> ProviderFailure {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderFailure::Auth(body),
        StatusCode::NOT_FOUND => ProviderFailure::InvalidModel(format!("{model}: {body}")),
        StatusCode::TOO_MANY_REQUESTS => ProviderFailure::RateLimited { retry_after },
        s if s.is_server_error() => ProviderFailure::Unavailable(format!("server returned {s}")),
        s => ProviderFailure::InvalidResponse(format!("unexpected status {s}: {body}")),
    }
}

/// A server-requested wait (capped) wins over our own backoff when longer.
fn retry_delay(failure: &ProviderFailure, backoff: Duration) -> Duration {
    match failure {
        ProviderFailure::RateLimited {
            retry_after: Some(secs),
        } => backoff.max(Duration::from_secs(*secs).min(RETRY_AFTER_CAP)),
        _ => backoff,
    }
}

/// Put response items back into input order.
///
/// On failure returns the input position to blame and the reason.
fn order_by_index(
    items: Vec<WireItem>,
    expected: usize,
) -> std::result::Result<Vec<Vec<f32>>, (usize, ProviderFailure)> {
    if items.len() != expected {
        return Err((
            items.len().min(expected.saturating_sub(1)),
            ProviderFailure::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                expected,
                items.len()
            )),
        ));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for item in items {
        let position = item.index;
        let Some(slot) = slots.get_mut(position) else {
            return Err((
                0,
                ProviderFailure::InvalidResponse(format!("index {} out of range", position)),
            ));
        };
        if slot.is_some() {
            return Err((
                position,
                ProviderFailure::InvalidResponse(format!("duplicate index {}", position)),
            ));
        }
        if item.embedding.is_empty() || item.embedding.iter().any(|v| !v.is_finite()) {
            return Err((
                position,
                ProviderFailure::InvalidResponse("empty or non-finite embedding".into()),
            ));
        }
        *slot = Some(item.embedding);
    }

    let mut vectors = Vec::with_capacity(expected);
    let mut dim = None;
    for (position, slot) in slots.into_iter().enumerate() {
        let vector = slot.ok_or_else(|| {
            (
                position,
                ProviderFailure::InvalidResponse(format!("missing index {}", position)),
            )
        })?;
        match dim {
            None => dim = Some(vector.len()),
            Some(d) if d != vector.len() => {
                return Err((
                    position,
                    ProviderFailure::InvalidResponse(format!(
                        "mixed dimensions in one response ({} vs {})",
                        d,
                        vector.len()
                    )),
                ))
            }
            Some(_) => {}
        }
        vectors.push(vector);
    }
    Ok(vectors)
}

/// Published output size of well-known models, used until a response
/// reveals the real one.
fn nominal_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        "nomic-embed-text" => 768,
        "all-minilm" => 384,
        _ => 1536,
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for (n, chunk) in texts.chunks(CHUNK_SIZE).enumerate() {
            vectors.extend(self.embed_chunk(chunk, n * CHUNK_SIZE).await?);
        }
        Ok(vectors)
    }

    async fn check_status(&self) -> Result<ProviderStatus> {
        let kind = EmbeddingProviderType::Openai;
        let status = match self.probe().await {
            Ok(latency) => {
                let status = ProviderStatus::healthy(kind, &self.config.model, "Remote")
                    .with_latency(latency.as_millis() as u64);
                match self.dimension.load(Ordering::Acquire) {
                    0 => status,
                    dim => status.with_dimension(dim),
                }
            }
            Err(failure) => {
                ProviderStatus::unavailable(kind, &self.config.model, failure.to_string())
            }
        };
        Ok(status)
    }

    async fn warmup(&self) -> Result<()> {
        self.probe()
            .await
            .map(|_| ())
            .map_err(|cause| RankError::embedding(self.label(), 0, "health check", cause))
    }

    fn embedding_dim(&self) -> usize {
        match self.dimension.load(Ordering::Acquire) {
            0 => nominal_dimension(&self.config.model),
            dim => dim,
        }
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Openai
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

impl std::fmt::Debug for OpenAIProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIProvider")
            .field("endpoint", &self.endpoint)
            .field("model", &self.config.model)
            .field("max_retries", &self.config.max_retries)
            .field("azure_mode", &self.config.azure_mode)
            .finish_non_exhaustive()
    }
}
