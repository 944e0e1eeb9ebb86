//! JobSignal Rank - personalized ranking of discovered job postings
//!
//! Scores a batch of jobs against a candidate profile and explains the gap
//! between them.
//!
//! # Features
//!
//! - **Pluggable embeddings**: local sentence-transformers (Candle) or any
//!   OpenAI-compatible API, memoized for the life of the process
//! - **Exact search**: a flat inner-product index rebuilt per batch
//! - **Explainable scores**: similarity, location, recency and skill overlap
//!   are kept alongside the composite
//! - **Skill gap**: missing skills per job and aggregated recommendations
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use jobsignal_config::EmbeddingConfig;
//! use jobsignal_rank::{ProviderHandle, RankingConfig, RankingPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handle = Arc::new(ProviderHandle::new(EmbeddingConfig::default()));
//!     let mut pipeline = RankingPipeline::new(handle, RankingConfig::default())?;
//!
//!     let report = pipeline.run(Some(profile), jobs).await?;
//!     println!("{:?}", report.job_ids());
//!     Ok(())
//! }
//! ```

pub mod embeddings;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod ranker;
pub mod schema;
pub mod semantic_text;
pub mod skill_gap;

// Re-exports for convenience
pub use embeddings::{
    create_provider, EmbeddingProvider, EmbeddingProviderType, LocalProvider, OpenAIConfig,
    OpenAIProvider, ProviderHandle, ProviderStatus,
};
pub use error::{ProviderFailure, RankError, Result};
pub use index::{batch_key, normalize_l2, VectorIndex};
pub use pipeline::{JobError, RankingPipeline, RankingReport, UnrankedReason};
pub use ranker::{Ranker, Ranking, RankingConfig, Weights};
pub use schema::{normalize_skills, CandidateProfile, JobRecord, ScoredJob, SubScores};
pub use skill_gap::{aggregate_recommendations, missing_skills, SkillRecommendation};
