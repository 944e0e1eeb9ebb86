//! Provider factory for creating embedding providers from configuration
//!
//! Creates the appropriate provider implementation based on the
//! `[embedding]` section of the JobSignal configuration.

use std::sync::Arc;

use jobsignal_config::{EmbeddingConfig, EmbeddingProviderType};
use tracing::debug;

use crate::error::{RankError, Result};

use super::local::LocalProvider;
use super::openai::{OpenAIConfig, OpenAIProvider};
use super::provider::EmbeddingProvider;

/// Create an embedding provider from configuration
///
/// Returns an `Arc<dyn EmbeddingProvider>` that can be shared across
/// async tasks and threads. Construction is cheap; the local model is only
/// loaded on first use.
///
/// # Errors
/// * `RankError::Configuration` - if the configuration is incomplete for the
///   selected provider
///
/// # Example
///
/// ```ignore
/// use jobsignal_config::EmbeddingConfig;
/// use jobsignal_rank::embeddings::create_provider;
///
/// let provider = create_provider(&EmbeddingConfig::default())?;
/// println!("Using {} provider", provider.provider_type());
/// ```
pub fn create(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    config.validate()?;

    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingProviderType::Local => Arc::new(LocalProvider::new(&config.local)?),
        EmbeddingProviderType::Openai => {
            let settings = config.openai.as_ref().ok_or_else(|| {
                RankError::Configuration("missing [embedding.openai] settings".into())
            })?;
            Arc::new(OpenAIProvider::new(OpenAIConfig::from_settings(settings))?)
        }
    };

    debug!(
        provider = %provider.provider_type(),
        model = provider.model_name(),
        "Created embedding provider"
    );
    Ok(provider)
}
