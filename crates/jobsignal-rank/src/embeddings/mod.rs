//! Embedding generation for job and profile text
//!
//! This module provides embedding generation with two provider backends:
//!
//! - **Local** - Candle-based inference with sentence-transformers models (CPU/Metal/CUDA)
//! - **OpenAI** - OpenAI-compatible APIs (OpenAI, Azure OpenAI, Ollama)
//!
//! # Architecture
//!
//! ```text
//! ProviderHandle           - memoized, reconfigurable
//!     └── EmbeddingProvider (trait)
//!             ├── LocalProvider   - Candle + BERT sentence encoder
//!             └── OpenAIProvider  - HTTP client for /v1/embeddings API
//! ```
//!
//! # Example
//!
//! ```ignore
//! use jobsignal_config::EmbeddingConfig;
//! use jobsignal_rank::embeddings::ProviderHandle;
//!
//! let handle = ProviderHandle::new(EmbeddingConfig::default());
//! let provider = handle.get_or_init()?;
//! let vectors = provider.embed_batch(vec!["Rust engineer".into()]).await?;
//! ```

pub mod factory;
mod handle;
mod local;
pub mod openai;
mod provider;

// Re-export provider types
pub use provider::{EmbeddingProvider, EmbeddingProviderType, ProviderStatus};

// Re-export factory function
pub use factory::create as create_provider;

// Re-export the memoized handle
pub use handle::ProviderHandle;

// Re-export LocalProvider
pub use local::{LocalProvider, MINILM_DIM};

// Re-export OpenAIProvider
pub use openai::{OpenAIConfig, OpenAIProvider};
