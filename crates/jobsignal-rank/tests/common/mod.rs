//! Common test utilities for jobsignal-rank integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jobsignal_rank::{
    EmbeddingProvider, EmbeddingProviderType, ProviderFailure, ProviderHandle, ProviderStatus,
    RankError, RankingConfig, RankingPipeline, Result,
};

/// Vector width of the fake provider
pub const FAKE_DIM: usize = 64;

/// Deterministic bag-of-words embedder.
///
/// Each lowercase token is hashed into one of `FAKE_DIM` buckets, so texts
/// sharing words point the same way. Texts containing any of the configured
/// poison markers fail to embed.
pub struct FakeProvider {
    poison: Vec<String>,
    batch_calls: AtomicUsize,
    texts_embedded: AtomicUsize,
    fail_batches: bool,
    flaky: Option<(String, AtomicUsize)>,
    down: bool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            poison: Vec::new(),
            batch_calls: AtomicUsize::new(0),
            texts_embedded: AtomicUsize::new(0),
            fail_batches: false,
            flaky: None,
            down: false,
        }
    }

    /// Fail any text containing `marker`.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.poison.push(marker.to_string());
        self
    }

    /// Reject every call with more than one text, like a flaky batch endpoint.
    pub fn single_text_only(mut self) -> Self {
        self.fail_batches = true;
        self
    }

    /// Time out on texts containing `marker` for the next `times` calls
    /// that include one, then recover.
    pub fn flaky_on(mut self, marker: &str, times: usize) -> Self {
        self.flaky = Some((marker.to_string(), AtomicUsize::new(times)));
        self
    }

    /// Refuse every call, like an unreachable server.
    pub fn unreachable(mut self) -> Self {
        self.down = true;
        self
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn texts_embedded(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; FAKE_DIM];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            v[bucket(token)] += 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        v
    }
}

fn bucket(token: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % FAKE_DIM as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);

        if self.down {
            return Err(RankError::embedding(
                "fake",
                0,
                &texts[0],
                ProviderFailure::Unavailable("connection refused".into()),
            ));
        }

        if let Some((marker, left)) = &self.flaky {
            if let Some(i) = texts.iter().position(|t| t.contains(marker.as_str())) {
                let still_failing = left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if still_failing {
                    return Err(RankError::embedding(
                        "fake",
                        i,
                        &texts[i],
                        ProviderFailure::Unavailable("request timed out".into()),
                    ));
                }
            }
        }

        if self.fail_batches && texts.len() > 1 {
            return Err(RankError::embedding(
                "fake",
                0,
                &texts[0],
                ProviderFailure::Unavailable("batch endpoint down".into()),
            ));
        }

        let mut out = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            if self.poison.iter().any(|p| text.contains(p.as_str())) {
                return Err(RankError::embedding(
                    "fake",
                    i,
                    text,
                    ProviderFailure::InvalidResponse("poisoned text".into()),
                ));
            }
            out.push(Self::vector(text));
        }
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(out)
    }

    async fn check_status(&self) -> Result<ProviderStatus> {
        Ok(ProviderStatus::healthy(EmbeddingProviderType::Local, "fake", "CPU").with_dimension(FAKE_DIM))
    }

    async fn warmup(&self) -> Result<()> {
        Ok(())
    }

    fn embedding_dim(&self) -> usize {
        FAKE_DIM
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Local
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}

/// Fixed "today" for recency.
pub fn today() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 9, 0, 0).unwrap()
}

/// Pipeline over `provider` with default ranking settings.
pub fn pipeline_with(provider: Arc<FakeProvider>) -> RankingPipeline {
    let handle = Arc::new(ProviderHandle::with_provider(provider));
    RankingPipeline::new(handle, RankingConfig::default())
        .unwrap()
        .with_now(today())
}
