//! Memoized provider handle
//!
//! Building a provider (and loading a local model) is expensive, so one
//! instance is kept for the life of the process and shared by every ranking
//! session. The handle rebuilds it only when the embedding configuration
//! actually changes.

use std::sync::{Arc, RwLock};

use jobsignal_config::EmbeddingConfig;
use once_cell::sync::OnceCell;
use tracing::info;

use crate::error::Result;

use super::factory;
use super::provider::EmbeddingProvider;

type ProviderFactory =
    dyn Fn(&EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync;

/// Lazily built, shared embedding provider.
///
/// `get_or_init` constructs the provider at most once per generation, even
/// under concurrent first use. `reconfigure` with a different config drops the
/// memoized instance and bumps `generation`.
pub struct ProviderHandle {
    state: RwLock<HandleState>,
    factory: Arc<ProviderFactory>,
}

struct HandleState {
    config: EmbeddingConfig,
    cell: Arc<OnceCell<Arc<dyn EmbeddingProvider>>>,
    generation: u64,
}

impl ProviderHandle {
    /// Create a handle that builds providers with [`factory::create`].
    pub fn new(config: EmbeddingConfig) -> Self {
        Self::with_factory(config, factory::create)
    }

    /// Create a handle with a custom construction function.
    pub fn with_factory<F>(config: EmbeddingConfig, factory: F) -> Self
    where
        F: Fn(&EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync + 'static,
    {
        Self {
            state: RwLock::new(HandleState {
                config,
                cell: Arc::new(OnceCell::new()),
                generation: 0,
            }),
            factory: Arc::new(factory),
        }
    }

    /// Create a handle around an already built provider.
    ///
    /// Reconfiguring such a handle falls back to [`factory::create`].
    pub fn with_provider(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let handle = Self::new(EmbeddingConfig::default());
        let cell = OnceCell::new();
        let _ = cell.set(provider);
        handle.write_state().cell = Arc::new(cell);
        handle
    }

    /// Return the memoized provider, building it on first use.
    pub fn get_or_init(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let (cell, config) = {
            let state = self.read_state();
            (Arc::clone(&state.cell), state.config.clone())
        };
        cell.get_or_try_init(|| {
            info!(
                provider = %config.provider,
                model = config.model_name(),
                "Initializing embedding provider"
            );
            (self.factory)(&config)
        })
        .map(Arc::clone)
    }

    /// Replace the configuration.
    ///
    /// Returns `true` when the config differed and the provider was dropped.
    /// An invalid config is rejected and leaves the handle untouched.
    pub fn reconfigure(&self, config: EmbeddingConfig) -> Result<bool> {
        config.validate()?;

        let mut state = self.write_state();
        if state.config == config {
            return Ok(false);
        }

        state.config = config;
        state.cell = Arc::new(OnceCell::new());
        state.generation += 1;
        info!(
            generation = state.generation,
            provider = %state.config.provider,
            "Embedding configuration changed, provider will be rebuilt"
        );
        Ok(true)
    }

    /// Number of times the memoized provider has been invalidated.
    pub fn generation(&self) -> u64 {
        self.read_state().generation
    }

    /// Whether a provider has been built for the current generation.
    pub fn is_initialized(&self) -> bool {
        self.read_state().cell.get().is_some()
    }

    /// Current embedding configuration.
    pub fn config(&self) -> EmbeddingConfig {
        self.read_state().config.clone()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, HandleState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, HandleState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read_state();
        f.debug_struct("ProviderHandle")
            .field("provider", &state.config.provider)
            .field("model", &state.config.model_name())
            .field("generation", &state.generation)
            .field("initialized", &state.cell.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{EmbeddingProviderType, ProviderStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Unit;

    #[async_trait]
    impl EmbeddingProvider for Unit {
        async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }

        async fn check_status(&self) -> Result<ProviderStatus> {
            Ok(ProviderStatus::healthy(EmbeddingProviderType::Local, "unit", "CPU"))
        }

        async fn warmup(&self) -> Result<()> {
            Ok(())
        }

        fn embedding_dim(&self) -> usize {
            1
        }

        fn provider_type(&self) -> EmbeddingProviderType {
            EmbeddingProviderType::Local
        }

        fn model_name(&self) -> &str {
            "unit"
        }
    }

    fn counting_handle() -> (ProviderHandle, Arc<AtomicUsize>) {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let handle = ProviderHandle::with_factory(EmbeddingConfig::default(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Unit) as Arc<dyn EmbeddingProvider>)
        });
        (handle, builds)
    }

    #[test]
    fn test_builds_once() {
        let (handle, builds) = counting_handle();
        assert!(!handle.is_initialized());

        let a = handle.get_or_init().unwrap();
        let b = handle.get_or_init().unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(handle.is_initialized());
    }

    #[test]
    fn test_concurrent_first_use_builds_once() {
        let (handle, builds) = counting_handle();
        let handle = Arc::new(handle);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || handle.get_or_init().map(|_| ()))
            })
            .collect();
        for t in threads {
            t.join().unwrap().unwrap();
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reconfigure_same_config_keeps_provider() {
        let (handle, builds) = counting_handle();
        handle.get_or_init().unwrap();

        assert!(!handle.reconfigure(EmbeddingConfig::default()).unwrap());
        handle.get_or_init().unwrap();

        assert_eq!(handle.generation(), 0);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reconfigure_new_config_rebuilds() {
        let (handle, builds) = counting_handle();
        handle.get_or_init().unwrap();

        let mut config = EmbeddingConfig::default();
        config.local.model = "sentence-transformers/all-mpnet-base-v2".into();
        assert!(handle.reconfigure(config.clone()).unwrap());
        assert!(!handle.is_initialized());

        handle.get_or_init().unwrap();
        assert_eq!(handle.generation(), 1);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(handle.config(), config);
    }

    #[test]
    fn test_reconfigure_rejects_invalid_config() {
        let (handle, _) = counting_handle();
        let config = EmbeddingConfig {
            provider: EmbeddingProviderType::Openai,
            openai: None,
            ..Default::default()
        };

        let err = handle.reconfigure(config).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(handle.generation(), 0);
    }

    #[test]
    fn test_with_provider_is_prebuilt() {
        let handle = ProviderHandle::with_provider(Arc::new(Unit));
        assert!(handle.is_initialized());
        assert_eq!(handle.get_or_init().unwrap().model_name(), "unit");
    }

    #[test]
    fn test_factory_error_is_not_memoized() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let handle = ProviderHandle::with_factory(EmbeddingConfig::default(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(crate::RankError::Configuration("no device".into()))
        });

        assert!(handle.get_or_init().is_err());
        assert!(handle.get_or_init().is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
