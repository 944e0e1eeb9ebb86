//! Error types for jobsignal-rank

use thiserror::Error;

/// Longest text excerpt attached to an embedding error.
const EXCERPT_CHARS: usize = 80;

/// Why a provider could not produce a vector.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderFailure {
    /// Credentials rejected by a remote API
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Remote API does not know the configured model
    #[error("model not found: {0}")]
    InvalidModel(String),

    /// Remote API asked us to slow down
    #[error("rate limited, retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },

    /// Network failure, timeout or 5xx
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Response could not be used (bad JSON, wrong count, non-finite values)
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Local model failed to load or run
    #[error("model error: {0}")]
    Model(String),
}

impl ProviderFailure {
    /// Whether a retry can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderFailure::RateLimited { .. } | ProviderFailure::Unavailable(_)
        )
    }
}

/// Errors that can occur in jobsignal-rank operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RankError {
    /// A text could not be vectorized
    #[error("embedding failed ({provider}) for text #{index} \"{excerpt}\": {cause}")]
    Embedding {
        provider: String,
        index: usize,
        excerpt: String,
        #[source]
        cause: ProviderFailure,
    },

    /// Vectors handed to the index were empty, unnormalized or inconsistent
    #[error("index build failed: {0}")]
    IndexBuild(String),

    /// Similarity query before any successful build
    #[error("vector index queried before it was built")]
    IndexNotBuilt,

    /// A vector that cannot take part in cosine similarity (zero or non-finite)
    #[error("invalid vector: {0}")]
    InvalidVector(String),

    /// Unknown provider, invalid weights or similar setup problems
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Vectors from different dimensions met in one session
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Job or candidate reached ranking without an embedding
    #[error("no embedding for '{0}'")]
    MissingEmbedding(String),

    /// Job carries an embedding but is absent from the current index
    #[error("job '{0}' is not in the current index")]
    NotIndexed(String),
}

impl RankError {
    /// Build an embedding error with an excerpt of the offending text.
    pub fn embedding(
        provider: impl Into<String>,
        index: usize,
        text: &str,
        cause: ProviderFailure,
    ) -> Self {
        RankError::Embedding {
            provider: provider.into(),
            index,
            excerpt: excerpt(text),
            cause,
        }
    }

    /// Re-point an embedding error at a position in a larger batch.
    pub fn at_index(self, new_index: usize) -> Self {
        match self {
            RankError::Embedding {
                provider,
                excerpt,
                cause,
                ..
            } => RankError::Embedding {
                provider,
                index: new_index,
                excerpt,
                cause,
            },
            other => other,
        }
    }

    /// The provider itself is down or throttling, whatever the input.
    pub fn is_outage(&self) -> bool {
        matches!(self, RankError::Embedding { cause, .. } if cause.is_transient())
    }

    /// The same failure, attributed to another text of the batch.
    pub fn for_text(&self, index: usize, text: &str) -> Self {
        match self {
            RankError::Embedding {
                provider, cause, ..
            } => RankError::embedding(provider.clone(), index, text, cause.clone()),
            other => other.clone(),
        }
    }

    /// Setup errors are surfaced immediately and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RankError::Configuration(_) | RankError::DimensionMismatch { .. }
        )
    }
}

impl From<jobsignal_config::ConfigError> for RankError {
    fn from(err: jobsignal_config::ConfigError) -> Self {
        RankError::Configuration(err.to_string())
    }
}

impl From<candle_core::Error> for ProviderFailure {
    fn from(err: candle_core::Error) -> Self {
        ProviderFailure::Model(err.to_string())
    }
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(EXCERPT_CHARS).collect();
    out.push('…');
    out
}

/// Result type for jobsignal-rank operations
pub type Result<T> = std::result::Result<T, RankError>;
