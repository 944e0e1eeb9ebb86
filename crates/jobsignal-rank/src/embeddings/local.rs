//! Local embedding provider using Candle and sentence-transformers models
//!
//! Runs a BERT-family sentence encoder in-process:
//! - **Default**: `sentence-transformers/all-MiniLM-L6-v2` (384 dimensions)
//!
//! Embeddings are mean-pooled over the attention mask and L2-normalized, so
//! the vectors are ready for inner-product search.
//!
//! GPU acceleration via compile-time features:
//! - `--features metal` for macOS Metal/MPS
//! - `--features cuda` for NVIDIA CUDA

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::{api::sync::Api, Cache, Repo, RepoType};
use once_cell::sync::OnceCell;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::{debug, info};

use jobsignal_config::LocalModelSettings;

use super::provider::{EmbeddingProvider, EmbeddingProviderType, ProviderStatus};
use crate::error::{ProviderFailure, RankError, Result};

/// Dimension of the default MiniLM model
pub const MINILM_DIM: usize = 384;

/// Data type for model inference
const DTYPE: DType = DType::F32;

/// Longest token sequence fed to the encoder
const MAX_SEQUENCE_TOKENS: usize = 256;

type EncodeResult<T> = std::result::Result<T, ProviderFailure>;

/// Local embedding provider using Candle for inference
///
/// Uses `Arc<LocalProviderInner>` for interior clonability, which is required
/// for `spawn_blocking` to move the provider into the blocking task.
///
/// Thread-safe: Uses `OnceCell` for lazy model initialization.
#[derive(Clone)]
pub struct LocalProvider {
    inner: Arc<LocalProviderInner>,
}

/// Inner state for LocalProvider (not Clone due to OnceCell)
struct LocalProviderInner {
    model: OnceCell<SentenceModel>,
    model_id: String,
    revision: String,
    device: Device,
    batch_size: usize,
}

/// Loaded sentence encoder
struct SentenceModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

impl LocalProvider {
    /// Create a provider for the configured model
    ///
    /// Device is selected automatically: Metal > CUDA > CPU. Model weights are
    /// not touched until the first embedding or `warmup`.
    pub fn new(settings: &LocalModelSettings) -> Result<Self> {
        let device = select_device()?;
        Ok(Self::with_device(settings, device))
    }

    /// Create with a specific device
    pub fn with_device(settings: &LocalModelSettings, device: Device) -> Self {
        Self {
            inner: Arc::new(LocalProviderInner {
                model: OnceCell::new(),
                model_id: settings.model.clone(),
                revision: settings.revision.clone(),
                device,
                batch_size: settings.batch_size.max(1),
            }),
        }
    }

    /// Get the device being used
    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    /// Get device name as string
    fn device_name(&self) -> String {
        match &self.inner.device {
            Device::Cpu => "CPU".to_string(),
            #[cfg(feature = "metal")]
            Device::Metal(_) => "Metal".to_string(),
            #[cfg(feature = "cuda")]
            Device::Cuda(_) => "CUDA".to_string(),
            #[allow(unreachable_patterns)]
            _ => "Unknown".to_string(),
        }
    }

    fn provider_label(&self) -> String {
        format!("local:{}", self.inner.model_id)
    }

    /// Ensure model is loaded (thread-safe lazy initialization)
    fn ensure_model(&self) -> EncodeResult<&SentenceModel> {
        self.inner.model.get_or_try_init(|| {
            load_sentence_model(&self.inner.model_id, &self.inner.revision, &self.inner.device)
        })
    }

    /// Check if the model is loaded
    pub fn is_loaded(&self) -> bool {
        self.inner.model.get().is_some()
    }

    /// Synchronous encoding (internal)
    ///
    /// Texts are processed in `batch_size` chunks; an error names the first
    /// text of the failing chunk.
    fn embed_sync(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Encoding {} texts with {}", texts.len(), self.inner.model_id);

        let model_data = self
            .ensure_model()
            .map_err(|cause| RankError::embedding(self.provider_label(), 0, &texts[0], cause))?;

        let mut vectors = Vec::with_capacity(texts.len());
        for (chunk_idx, chunk) in texts.chunks(self.inner.batch_size).enumerate() {
            let offset = chunk_idx * self.inner.batch_size;
            let inputs: Vec<&str> = chunk
                .iter()
                .map(|t| if t.trim().is_empty() { " " } else { t.as_str() })
                .collect();
            let encoded = encode_with_model(model_data, &inputs).map_err(|cause| {
                RankError::embedding(self.provider_label(), offset, &chunk[0], cause)
            })?;
            vectors.extend(encoded);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let provider = self.clone();
        let first = texts.first().cloned().unwrap_or_default();
        tokio::task::spawn_blocking(move || provider.embed_sync(&texts))
            .await
            .map_err(|e| {
                RankError::embedding(
                    self.provider_label(),
                    0,
                    &first,
                    ProviderFailure::Model(format!("blocking task panicked: {}", e)),
                )
            })?
    }

    async fn check_status(&self) -> Result<ProviderStatus> {
        let loaded = self.is_loaded();
        let cached = loaded || is_model_cached(&self.inner.model_id, &self.inner.revision);

        let status = if cached {
            ProviderStatus::healthy(
                EmbeddingProviderType::Local,
                &self.inner.model_id,
                self.device_name(),
            )
        } else {
            let mut status = ProviderStatus::unavailable(
                EmbeddingProviderType::Local,
                &self.inner.model_id,
                "Model not cached - it will be downloaded on first use",
            );
            status.device = self.device_name();
            status
        };

        let status = status.with_dimension(self.embedding_dim());
        Ok(if loaded { status } else { status.not_loaded() })
    }

    async fn warmup(&self) -> Result<()> {
        let provider = self.clone();
        let start = Instant::now();

        tokio::task::spawn_blocking(move || provider.ensure_model().map(|_| ()))
            .await
            .map_err(|e| ProviderFailure::Model(format!("warmup task panicked: {}", e)))
            .and_then(|r| r)
            .map_err(|cause| RankError::embedding(self.provider_label(), 0, "warmup", cause))?;

        info!("LocalProvider warmup complete in {:?}", start.elapsed());
        Ok(())
    }

    fn embedding_dim(&self) -> usize {
        match self.inner.model.get() {
            Some(model) => model.dimension,
            None => known_dimension(&self.inner.model_id),
        }
    }

    fn provider_type(&self) -> EmbeddingProviderType {
        EmbeddingProviderType::Local
    }

    fn model_name(&self) -> &str {
        &self.inner.model_id
    }
}

impl std::fmt::Debug for LocalProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalProvider")
            .field("model", &self.inner.model_id)
            .field("revision", &self.inner.revision)
            .field("device", &self.device_name())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Dimension advertised before the model's config has been read.
fn known_dimension(model_id: &str) -> usize {
    match model_id.rsplit('/').next().unwrap_or(model_id) {
        "all-mpnet-base-v2" | "all-distilroberta-v1" => 768,
        "bge-base-en-v1.5" => 768,
        "bge-large-en-v1.5" | "all-roberta-large-v1" => 1024,
        _ => MINILM_DIM,
    }
}

/// Select the best available device for inference
fn select_device() -> Result<Device> {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Using Metal/MPS GPU acceleration");
                return Ok(device);
            }
            Err(e) => {
                debug!("Metal not available: {}", e);
            }
        }
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("Using CUDA GPU acceleration");
                return Ok(device);
            }
            Err(e) => {
                debug!("CUDA not available: {}", e);
            }
        }
    }

    debug!("Using CPU (no GPU acceleration available)");
    Ok(Device::Cpu)
}

/// Check the local HuggingFace cache without touching the network
fn is_model_cached(model_id: &str, revision: &str) -> bool {
    let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, revision.to_string());
    let cache = Cache::default().repo(repo);
    ["config.json", "tokenizer.json", "model.safetensors"]
        .iter()
        .all(|file| cache.get(file).is_some())
}

/// Download model files from HuggingFace Hub
fn download_model_files(model_id: &str, revision: &str) -> EncodeResult<(PathBuf, PathBuf, PathBuf)> {
    let api = Api::new()
        .map_err(|e| ProviderFailure::Model(format!("failed to create HF API: {}", e)))?;
    let repo = Repo::with_revision(model_id.to_string(), RepoType::Model, revision.to_string());
    let api_repo = api.repo(repo);

    let fetch = |file: &str| {
        api_repo
            .get(file)
            .map_err(|e| ProviderFailure::Model(format!("failed to download {}: {}", file, e)))
    };

    Ok((
        fetch("config.json")?,
        fetch("tokenizer.json")?,
        fetch("model.safetensors")?,
    ))
}

/// Load a BERT sentence encoder and its tokenizer
fn load_sentence_model(model_id: &str, revision: &str, device: &Device) -> EncodeResult<SentenceModel> {
    info!("Loading embedding model ({})...", model_id);
    let start = Instant::now();

    let (config_path, tokenizer_path, weights_path) = download_model_files(model_id, revision)?;

    let config_str = std::fs::read_to_string(&config_path)
        .map_err(|e| ProviderFailure::Model(format!("failed to read config: {}", e)))?;
    let config: BertConfig = serde_json::from_str(&config_str)
        .map_err(|e| ProviderFailure::Model(format!("failed to parse config: {}", e)))?;

    let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| ProviderFailure::Model(format!("failed to load tokenizer: {}", e)))?;
    tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::BatchLongest,
        ..Default::default()
    }));
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_SEQUENCE_TOKENS,
            ..Default::default()
        }))
        .map_err(|e| ProviderFailure::Model(format!("failed to configure truncation: {}", e)))?;

    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, device)
            .map_err(|e| ProviderFailure::Model(format!("failed to load weights: {}", e)))?
    };

    let model = BertModel::load(vb, &config)
        .map_err(|e| ProviderFailure::Model(format!("failed to create model: {}", e)))?;

    info!(
        "Embedding model loaded (dim={}) in {:?}",
        config.hidden_size,
        start.elapsed()
    );

    Ok(SentenceModel {
        model,
        tokenizer,
        device: device.clone(),
        dimension: config.hidden_size,
    })
}

/// L2 normalize embeddings
fn normalize_l2(v: &Tensor) -> EncodeResult<Tensor> {
    Ok(v.broadcast_div(&v.sqr()?.sum_keepdim(1)?.sqrt()?)?)
}

/// Mean pooling with attention mask
fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> EncodeResult<Tensor> {
    let attention_mask_expanded = attention_mask.to_dtype(DTYPE)?.unsqueeze(2)?;

    let sum_mask = attention_mask_expanded.sum(1)?;
    let masked_embeddings = embeddings.broadcast_mul(&attention_mask_expanded)?;
    let summed = masked_embeddings.sum(1)?;

    Ok(summed.broadcast_div(&sum_mask)?)
}

/// Encode one chunk of texts
fn encode_with_model(model: &SentenceModel, texts: &[&str]) -> EncodeResult<Vec<Vec<f32>>> {
    let encodings = model
        .tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| ProviderFailure::Model(format!("tokenization failed: {}", e)))?;

    let token_ids = encodings
        .iter()
        .map(|enc| Tensor::new(enc.get_ids(), &model.device))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let attention_masks = encodings
        .iter()
        .map(|enc| Tensor::new(enc.get_attention_mask(), &model.device))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let token_ids = Tensor::stack(&token_ids, 0)?;
    let attention_mask = Tensor::stack(&attention_masks, 0)?;
    let token_type_ids = token_ids.zeros_like()?;

    let embeddings = model
        .model
        .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;

    let pooled = mean_pool(&embeddings, &attention_mask)?;
    let normalized = normalize_l2(&pooled)?;

    let result = normalized.to_vec2::<f32>()?;
    if result.len() != texts.len() {
        return Err(ProviderFailure::InvalidResponse(format!(
            "model returned {} vectors for {} texts",
            result.len(),
            texts.len()
        )));
    }
    Ok(result)
}
