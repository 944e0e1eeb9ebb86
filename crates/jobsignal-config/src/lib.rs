//! Settings for JobSignal: which embedding backend to use, how jobs are
//! scored, and how much to log.
//!
//! Values come from `~/.jobsignal/config.toml`, then `.jobsignal/config.toml`
//! in the working directory, then command-line flags ([`ConfigOverrides`]).
//! See [`ConfigLoader`] for the resolution rules.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};

/// Tolerance used when checking that score weights sum to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Effective settings after every layer is merged.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct JobSignalConfig {
    pub embedding: EmbeddingConfig,
    pub ranking: RankingSettings,
    pub logging: LoggingConfig,
}

/// Which backend turns job and profile text into vectors.
///
///
/// ```toml
/// [embedding]
/// provider = "local"  # or "openai"
///
/// [embedding.local]
/// model = "sentence-transformers/all-MiniLM-L6-v2"
///
/// [embedding.openai]
/// url = "https://api.openai.com/v1"
/// api_key_env = "OPENAI_API_KEY"
/// model = "text-embedding-3-small"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderType,

    /// Local sentence-embedding model settings
    pub local: LocalModelSettings,

    /// Must be present when `provider = "openai"`
    pub openai: Option<OpenAISettings>,
}

impl EmbeddingConfig {
    /// Validate that required settings exist for the selected provider.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.provider {
            EmbeddingProviderType::Local => {
                if self.local.model.trim().is_empty() {
                    return Err(ConfigError::ValidationError(
                        "embedding.local.model is required".to_string(),
                    ));
                }
                Ok(())
            }
            EmbeddingProviderType::Openai => {
                let Some(settings) = self.openai.as_ref() else {
                    return Err(ConfigError::ValidationError(
                        "embedding.provider is 'openai' but [embedding.openai] section is missing"
                            .to_string(),
                    ));
                };
                if settings.url.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "embedding.openai.url is required".to_string(),
                    ));
                }
                if settings.model.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "embedding.openai.model is required".to_string(),
                    ));
                }
                if settings.timeout_secs == 0 {
                    return Err(ConfigError::invalid_value(
                        "embedding.openai.timeout_secs",
                        "must be greater than zero",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Model name used by the selected provider.
    pub fn model_name(&self) -> &str {
        match self.provider {
            EmbeddingProviderType::Local => &self.local.model,
            EmbeddingProviderType::Openai => self
                .openai
                .as_ref()
                .map(|s| s.model.as_str())
                .unwrap_or(DEFAULT_OPENAI_MODEL),
        }
    }
}

/// Embedding backend named in config and on the command line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProviderType {
    /// Local sentence-embedding model run with Candle (default)
    #[default]
    Local,
    /// OpenAI-compatible embeddings API (OpenAI, Azure OpenAI, Ollama, etc.)
    Openai,
}

impl std::fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Openai => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "sentence-transformers" | "sentence_transformers" => Ok(Self::Local),
            "openai" => Ok(Self::Openai),
            _ => Err(ConfigError::ValidationError(format!(
                "Unknown embedding provider: '{}'. Valid values: local, openai",
                s
            ))),
        }
    }
}

/// Default local sentence-embedding model.
pub const DEFAULT_LOCAL_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Default remote embedding model.
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";

/// Local model settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocalModelSettings {
    /// HuggingFace model repository
    pub model: String,

    /// Repository revision
    pub revision: String,

    /// Texts per forward pass
    pub batch_size: usize,
}

impl Default for LocalModelSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_LOCAL_MODEL.to_string(),
            revision: "main".to_string(),
            batch_size: 32,
        }
    }
}

/// `[embedding.openai]`: any server speaking the OpenAI embeddings API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAISettings {
    /// Base URL, e.g. `http://localhost:11434/v1` for Ollama
    pub url: String,

    /// Name of the variable holding the key; the key never lives in the file
    pub api_key_env: Option<String>,

    pub model: String,

    pub timeout_secs: u64,

    /// Extra attempts after a rate limit, timeout or 5xx
    pub max_retries: u32,

    /// Send the key in an `api-key` header (Azure) instead of `Authorization`
    pub azure_mode: bool,
}

impl Default for OpenAISettings {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            timeout_secs: 30,
            max_retries: 2,
            azure_mode: false,
        }
    }
}

/// Weights of the composite score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeightSettings {
    pub similarity: f64,
    pub location: f64,
    pub recency: f64,
    pub skill_overlap: f64,
}

impl Default for WeightSettings {
    fn default() -> Self {
        Self {
            similarity: 0.7,
            location: 0.1,
            recency: 0.1,
            skill_overlap: 0.1,
        }
    }
}

impl WeightSettings {
    pub fn sum(&self) -> f64 {
        self.similarity + self.location + self.recency + self.skill_overlap
    }

    /// Every weight must be finite and non-negative, and the total must be one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("similarity", self.similarity),
            ("location", self.location),
            ("recency", self.recency),
            ("skill_overlap", self.skill_overlap),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid_value(
                    format!("ranking.weights.{}", name),
                    format!("must be a non-negative number, got {}", value),
                ));
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::ValidationError(format!(
                "ranking.weights must sum to 1.0, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// Ranking configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RankingSettings {
    /// Posting age (days) at which recency reaches zero
    pub recency_horizon_days: u32,

    /// Recency assigned to postings without a date
    pub undated_recency: f64,

    /// Number of top-ranked jobs considered for skill recommendations
    pub top_n: usize,

    /// Composite score weights
    pub weights: WeightSettings,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            recency_horizon_days: 30,
            undated_recency: 0.5,
            top_n: 10,
            weights: WeightSettings::default(),
        }
    }
}

impl RankingSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        if self.recency_horizon_days == 0 {
            return Err(ConfigError::invalid_value(
                "ranking.recency_horizon_days",
                "must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.undated_recency) {
            return Err(ConfigError::invalid_value(
                "ranking.undated_recency",
                format!("must be within [0, 1], got {}", self.undated_recency),
            ));
        }
        if self.top_n == 0 {
            return Err(ConfigError::invalid_value(
                "ranking.top_n",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// `[logging]`: filter and output shape for the tracing subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive; `RUST_LOG` wins when set
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Values from command-line flags; `None` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub embedding_provider: Option<EmbeddingProviderType>,

    /// Applies to whichever provider ends up selected
    pub model: Option<String>,

    pub recency_horizon_days: Option<u32>,

    pub top_n: Option<usize>,

    pub log_level: Option<String>,
}

impl JobSignalConfig {
    /// Layer command-line values on top. Selecting `openai` without a
    /// `[embedding.openai]` section fills in the hosted-API defaults.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
            if provider == EmbeddingProviderType::Openai && self.embedding.openai.is_none() {
                self.embedding.openai = Some(OpenAISettings::default());
            }
        }

        if let Some(ref model) = overrides.model {
            match self.embedding.provider {
                EmbeddingProviderType::Local => self.embedding.local.model = model.clone(),
                EmbeddingProviderType::Openai => {
                    self.embedding
                        .openai
                        .get_or_insert_with(OpenAISettings::default)
                        .model = model.clone();
                }
            }
        }

        if let Some(days) = overrides.recency_horizon_days {
            self.ranking.recency_horizon_days = days;
        }

        if let Some(top_n) = overrides.top_n {
            self.ranking.top_n = top_n;
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.ranking.validate()?;
        Ok(())
    }
}
