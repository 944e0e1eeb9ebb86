//! End-to-end ranking session.
//!
//! ```text
//! jobs ─┬─ embed (batch, per-job fallback) ─ normalize ─ VectorIndex::build ─┐
//!       │                                                                      ├─ Ranker ─ skill gap ─ RankingReport
//! profile ─ embed ─ normalize ───────────────────────────────────────────────┘
//! ```
//!
//! Job and profile embedding run concurrently. A job that cannot be embedded
//! is dropped and reported; a profile that cannot be embedded turns the whole
//! session into an unranked report in discovery order. Setup errors (bad
//! configuration, dimension mismatch, invalid batch) are returned as `Err`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::embeddings::{EmbeddingProvider, ProviderHandle};
use crate::error::{RankError, Result};
use crate::index::{batch_key, normalize_l2, VectorIndex};
use crate::ranker::{Ranker, RankingConfig};
use crate::schema::{normalize_skills, CandidateProfile, JobRecord, ScoredJob};
use crate::semantic_text::{candidate_text, job_text};
use crate::skill_gap::{aggregate_recommendations, SkillRecommendation};

/// Consecutive outage failures in the one-by-one fallback before the
/// remaining jobs are given up on.
const OUTAGE_THRESHOLD: usize = 2;

/// A job left out of the ranking and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobError {
    pub job_id: String,
    #[serde(serialize_with = "serialize_display")]
    pub error: RankError,
}

impl JobError {
    pub fn new(job_id: impl Into<String>, error: RankError) -> Self {
        Self {
            job_id: job_id.into(),
            error,
        }
    }
}

fn serialize_display<S: Serializer>(error: &RankError, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Why a session fell back to discovery order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnrankedReason {
    /// No resume was supplied
    NoProfile,
    /// The profile could not be embedded
    CandidateEmbeddingFailed { message: String },
}

impl std::fmt::Display for UnrankedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoProfile => write!(f, "no candidate profile"),
            Self::CandidateEmbeddingFailed { message } => {
                write!(f, "candidate profile could not be embedded: {}", message)
            }
        }
    }
}

/// Outcome handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RankingReport {
    Ranked {
        scored: Vec<ScoredJob>,
        errors: Vec<JobError>,
        recommendations: Vec<SkillRecommendation>,
    },
    Unranked {
        jobs: Vec<JobRecord>,
        reason: UnrankedReason,
    },
}

impl RankingReport {
    pub fn is_ranked(&self) -> bool {
        matches!(self, Self::Ranked { .. })
    }

    /// Job ids in presentation order.
    pub fn job_ids(&self) -> Vec<&str> {
        match self {
            Self::Ranked { scored, .. } => scored.iter().map(|s| s.job.id.as_str()).collect(),
            Self::Unranked { jobs, .. } => jobs.iter().map(|j| j.id.as_str()).collect(),
        }
    }

    /// Per-job failures (always empty when unranked).
    pub fn errors(&self) -> &[JobError] {
        match self {
            Self::Ranked { errors, .. } => errors,
            Self::Unranked { .. } => &[],
        }
    }
}

/// Embeddings for one job batch, aligned with the batch.
#[derive(Debug, Clone)]
struct JobEmbeddings {
    vectors: Vec<Option<Vec<f32>>>,
    errors: Vec<JobError>,
}

#[derive(Debug)]
struct BatchCache {
    key: String,
    provider_generation: u64,
    embeddings: JobEmbeddings,
}

/// Owns the index for a stream of ranking sessions.
///
/// Re-running the same batch (same ids, same order, same provider generation)
/// reuses the embeddings and the index; any change triggers a full rebuild.
pub struct RankingPipeline {
    provider: Arc<ProviderHandle>,
    ranker: Ranker,
    index: VectorIndex,
    cache: Option<BatchCache>,
}

impl RankingPipeline {
    /// Create a pipeline; rejects invalid ranking configuration.
    pub fn new(provider: Arc<ProviderHandle>, config: RankingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            ranker: Ranker::new(config),
            index: VectorIndex::new(),
            cache: None,
        })
    }

    /// Fix "today" for recency scoring.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.ranker = self.ranker.with_now(now);
        self
    }

    pub fn config(&self) -> &RankingConfig {
        self.ranker.config()
    }

    pub fn provider(&self) -> &Arc<ProviderHandle> {
        &self.provider
    }

    /// Successful index builds so far.
    pub fn index_generation(&self) -> u64 {
        self.index.generation()
    }

    /// Rank `jobs` for `candidate`.
    ///
    /// Without a candidate nothing is embedded and the jobs come back in
    /// discovery order.
    pub async fn run(
        &mut self,
        candidate: Option<CandidateProfile>,
        mut jobs: Vec<JobRecord>,
    ) -> Result<RankingReport> {
        let Some(mut candidate) = candidate else {
            info!(jobs = jobs.len(), "No candidate profile, keeping discovery order");
            return Ok(RankingReport::Unranked {
                jobs,
                reason: UnrankedReason::NoProfile,
            });
        };

        let start = Instant::now();
        check_unique_ids(&jobs)?;
        for job in &mut jobs {
            job.skills = normalize_skills(&job.skills);
        }
        candidate.skills = normalize_skills(&candidate.skills);

        if jobs.is_empty() {
            return Ok(RankingReport::Ranked {
                scored: Vec::new(),
                errors: Vec::new(),
                recommendations: Vec::new(),
            });
        }

        let provider = self.provider.get_or_init()?;
        let key = batch_key(jobs.iter().map(|j| j.id.as_str()));
        let generation = self.provider.generation();
        // A batch with failed jobs is embedded again; the failures may have been transient.
        let reuse = self.cache.as_ref().is_some_and(|c| {
            c.key == key && c.provider_generation == generation && c.embeddings.errors.is_empty()
        });

        let (job_outcome, candidate_outcome) = tokio::join!(
            async {
                if reuse {
                    None
                } else {
                    Some(embed_jobs(provider.as_ref(), &jobs).await)
                }
            },
            embed_candidate(provider.as_ref(), &candidate),
        );

        // Everything below runs after the last await; nothing is published
        // if the future is dropped earlier.
        if let Some(outcome) = job_outcome {
            let embeddings = outcome?;
            let entries: Vec<(String, Vec<f32>)> = jobs
                .iter()
                .zip(&embeddings.vectors)
                .filter_map(|(job, v)| v.clone().map(|v| (job.id.clone(), v)))
                .collect();
            if !entries.is_empty() {
                self.index.build(entries)?;
            }
            self.cache = Some(BatchCache {
                key,
                provider_generation: generation,
                embeddings,
            });
        } else {
            debug!(generation = self.index.generation(), "Reusing index for unchanged batch");
        }

        let candidate_vector = match candidate_outcome {
            Ok(vector) => vector,
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Candidate embedding failed, falling back to discovery order");
                return Ok(RankingReport::Unranked {
                    jobs,
                    reason: UnrankedReason::CandidateEmbeddingFailed {
                        message: e.to_string(),
                    },
                });
            }
        };
        candidate.embedding = Some(candidate_vector);

        let Some(cache) = self.cache.as_ref() else {
            return Err(RankError::IndexNotBuilt);
        };
        for (job, vector) in jobs.iter_mut().zip(&cache.embeddings.vectors) {
            job.embedding = vector.clone();
        }
        let embed_errors: HashMap<&str, &RankError> = cache
            .embeddings
            .errors
            .iter()
            .map(|e| (e.job_id.as_str(), &e.error))
            .collect();

        let ranking = if jobs.iter().any(|j| j.embedding.is_some()) {
            self.ranker.rank(&candidate, &jobs, &self.index)?
        } else {
            crate::ranker::Ranking {
                scored: Vec::new(),
                errors: jobs
                    .iter()
                    .map(|j| JobError::new(&j.id, RankError::MissingEmbedding(j.id.clone())))
                    .collect(),
            }
        };

        // Report the embedding failure rather than its downstream symptom.
        let errors: Vec<JobError> = ranking
            .errors
            .into_iter()
            .map(|e| match embed_errors.get(e.job_id.as_str()) {
                Some(cause) => JobError::new(e.job_id, (*cause).clone()),
                None => e,
            })
            .collect();

        let recommendations = aggregate_recommendations(&ranking.scored, self.config().top_n);

        info!(
            scored = ranking.scored.len(),
            failed = errors.len(),
            recommendations = recommendations.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Ranking complete"
        );

        Ok(RankingReport::Ranked {
            scored: ranking.scored,
            errors,
            recommendations,
        })
    }
}

fn check_unique_ids(jobs: &[JobRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(jobs.len());
    for job in jobs {
        if !seen.insert(job.id.as_str()) {
            return Err(RankError::IndexBuild(format!(
                "duplicate job id '{}' in batch",
                job.id
            )));
        }
    }
    Ok(())
}

/// Embed every job that has no vector yet.
///
/// Tries one batch call first; if that fails for a non-configuration reason
/// each job is embedded on its own so one bad posting cannot sink the batch.
async fn embed_jobs(provider: &dyn EmbeddingProvider, jobs: &[JobRecord]) -> Result<JobEmbeddings> {
    let mut vectors: Vec<Option<Vec<f32>>> = vec![None; jobs.len()];
    let mut errors = Vec::new();

    let mut pending = Vec::new();
    for (i, job) in jobs.iter().enumerate() {
        match job.embedding.as_deref() {
            Some(existing) => match normalize_l2(existing) {
                Ok(v) => vectors[i] = Some(v),
                Err(e) => errors.push(JobError::new(&job.id, e)),
            },
            None => pending.push(i),
        }
    }

    if !pending.is_empty() {
        let texts: Vec<String> = pending.iter().map(|&i| job_text(&jobs[i])).collect();
        debug!(jobs = texts.len(), provider = %provider.provider_type(), "Embedding jobs");

        let results: Vec<Result<Vec<f32>>> = match provider.embed_batch(texts.clone()).await {
            Ok(batch) if batch.len() == texts.len() => batch.into_iter().map(Ok).collect(),
            Err(e) if e.is_configuration() => return Err(e),
            outcome => {
                match outcome {
                    Err(e) => warn!(error = %e, "Batch embedding failed, embedding jobs individually"),
                    Ok(batch) => warn!(
                        expected = texts.len(),
                        got = batch.len(),
                        "Batch embedding returned wrong count, embedding jobs individually"
                    ),
                }
                embed_one_by_one(provider, &texts, &pending).await?
            }
        };

        for (&i, result) in pending.iter().zip(results) {
            match result.and_then(|v| normalize_l2(&v)) {
                Ok(v) => vectors[i] = Some(v),
                Err(e) => {
                    warn!(job_id = %jobs[i].id, error = %e, "Excluding job from ranking");
                    errors.push(JobError::new(&jobs[i].id, e));
                }
            }
        }
    }

    // Keep errors in batch order regardless of how they were discovered.
    let position: HashMap<&str, usize> =
        jobs.iter().enumerate().map(|(i, j)| (j.id.as_str(), i)).collect();
    errors.sort_by_key(|e| position.get(e.job_id.as_str()).copied().unwrap_or(usize::MAX));

    Ok(JobEmbeddings { vectors, errors })
}

/// Embed texts one call each. After `OUTAGE_THRESHOLD` consecutive outage
/// failures the provider is treated as down and the remaining texts fail
/// with the same cause without being sent.
async fn embed_one_by_one(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    pending: &[usize],
) -> Result<Vec<Result<Vec<f32>>>> {
    let mut results = Vec::with_capacity(texts.len());
    let mut outages = 0;
    let mut down: Option<RankError> = None;

    for (text, &index) in texts.iter().zip(pending) {
        if let Some(cause) = &down {
            results.push(Err(cause.for_text(index, text)));
            continue;
        }

        let result = provider.embed(text).await.map_err(|e| e.at_index(index));
        match &result {
            Err(e) if e.is_configuration() => return Err(e.clone()),
            Err(e) if e.is_outage() => {
                outages += 1;
                if outages >= OUTAGE_THRESHOLD {
                    warn!(error = %e, "Provider unavailable, skipping remaining jobs");
                    down = Some(e.clone());
                }
            }
            _ => outages = 0,
        }
        results.push(result);
    }
    Ok(results)
}

async fn embed_candidate(provider: &dyn EmbeddingProvider, candidate: &CandidateProfile) -> Result<Vec<f32>> {
    let raw = match candidate.embedding.as_deref() {
        Some(existing) => existing.to_vec(),
        None => provider.embed(&candidate_text(candidate)).await?,
    };
    normalize_l2(&raw)
}
