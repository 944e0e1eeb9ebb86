//! The text-to-vector seam.
//!
//! Two backends implement [`EmbeddingProvider`]: `LocalProvider` runs a
//! sentence-transformer with Candle, `OpenAIProvider` calls a remote
//! `/v1/embeddings` API.

use async_trait::async_trait;
use serde::Serialize;

pub use jobsignal_config::EmbeddingProviderType;

use crate::error::{ProviderFailure, RankError, Result};

/// Health snapshot reported by `jobsignal status`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    /// Provider can embed right now
    pub available: bool,
    pub provider_type: EmbeddingProviderType,
    pub model: String,
    /// "CPU", "Metal", "CUDA" or "Remote"
    pub device: String,
    /// Vector dimension, when known
    pub dimension: Option<usize>,
    /// Round trip of the status probe
    pub latency_ms: Option<u64>,
    /// Weights resident in memory; remote providers report true
    pub model_loaded: bool,
    /// Why the provider is unavailable
    pub error: Option<String>,
}

impl ProviderStatus {
    pub fn healthy(
        provider_type: EmbeddingProviderType,
        model: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        Self {
            available: true,
            provider_type,
            model: model.into(),
            device: device.into(),
            dimension: None,
            latency_ms: None,
            model_loaded: true,
            error: None,
        }
    }

    pub fn unavailable(
        provider_type: EmbeddingProviderType,
        model: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            available: false,
            provider_type,
            model: model.into(),
            device: "N/A".into(),
            dimension: None,
            latency_ms: None,
            model_loaded: false,
            error: Some(error.into()),
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Mark model weights as not yet loaded
    pub fn not_loaded(mut self) -> Self {
        self.model_loaded = false;
        self
    }
}

/// Turns text into fixed-length vectors.
///
/// # Contract
///
/// `embed_batch` returns exactly one vector per input, in input order, each of
/// `embedding_dim()` length. On failure it returns `RankError::Embedding`
/// naming the offending text's index; it never yields a partial or zero vector.
///
/// One instance is shared by every ranking run through `ProviderHandle`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// One vector per text, in input order.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(vec![text.to_string()]).await?;
        match (vectors.pop(), vectors.is_empty()) {
            (Some(vector), true) => Ok(vector),
            _ => Err(RankError::embedding(
                self.provider_type().to_string(),
                0,
                text,
                ProviderFailure::InvalidResponse(
                    "expected exactly one embedding for a single text".to_string(),
                ),
            )),
        }
    }

    /// Report health. Local providers answer without loading weights; remote
    /// ones send a one-word request.
    async fn check_status(&self) -> Result<ProviderStatus>;

    /// Load weights, or learn the remote dimension, ahead of the first batch.
    async fn warmup(&self) -> Result<()>;

    /// Vector length; a best guess for remote models until the first response.
    fn embedding_dim(&self) -> usize;

    fn provider_type(&self) -> EmbeddingProviderType;

    fn model_name(&self) -> &str;
}
