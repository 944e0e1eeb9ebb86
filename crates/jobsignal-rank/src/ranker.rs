//! Composite scoring of jobs against a candidate.
//!
//! ```text
//! score = w_sim * (cos + 1) / 2
//!       + w_loc * location_match
//!       + w_rec * recency
//!       + w_skill * skill_overlap
//! ```
//!
//! Every sub-score lies in [0,1] and the weights sum to one, so the composite
//! does too. Ranking is synchronous and pure: all embedding has already
//! happened by the time `rank` is called.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use jobsignal_config::{RankingSettings, WeightSettings};
use tracing::debug;

use crate::error::{RankError, Result};
use crate::index::VectorIndex;
use crate::pipeline::JobError;
use crate::schema::{skill_key, CandidateProfile, JobRecord, ScoredJob, SubScores};
use crate::skill_gap::missing_skills;

/// Weights of the four sub-scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub similarity: f64,
    pub location: f64,
    pub recency: f64,
    pub skill_overlap: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            similarity: 0.7,
            location: 0.1,
            recency: 0.1,
            skill_overlap: 0.1,
        }
    }
}

impl From<WeightSettings> for Weights {
    fn from(w: WeightSettings) -> Self {
        Self {
            similarity: w.similarity,
            location: w.location,
            recency: w.recency,
            skill_overlap: w.skill_overlap,
        }
    }
}

impl From<Weights> for WeightSettings {
    fn from(w: Weights) -> Self {
        Self {
            similarity: w.similarity,
            location: w.location,
            recency: w.recency,
            skill_overlap: w.skill_overlap,
        }
    }
}

impl Weights {
    /// Same rules as the `[ranking.weights]` file section.
    pub fn validate(&self) -> Result<()> {
        Ok(WeightSettings::from(*self).validate()?)
    }

    /// Weighted sum, clamped to [0,1].
    pub fn composite(&self, s: &SubScores) -> f64 {
        let raw = self.similarity * s.similarity
            + self.location * s.location
            + self.recency * s.recency
            + self.skill_overlap * s.skill_overlap;
        raw.clamp(0.0, 1.0)
    }
}

/// Tunables for one ranking session.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingConfig {
    pub weights: Weights,
    /// Age in days at which recency reaches 0
    pub recency_horizon_days: u32,
    /// Recency assigned to postings without a date
    pub undated_recency: f64,
    /// Jobs considered for skill recommendations
    pub top_n: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            recency_horizon_days: 30,
            undated_recency: 0.5,
            top_n: 10,
        }
    }
}

impl RankingConfig {
    /// Convert and validate file settings.
    pub fn from_settings(settings: &RankingSettings) -> Result<Self> {
        let config = Self {
            weights: settings.weights.into(),
            recency_horizon_days: settings.recency_horizon_days,
            undated_recency: settings.undated_recency,
            top_n: settings.top_n,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if self.recency_horizon_days == 0 {
            return Err(RankError::Configuration(
                "recency horizon must be at least one day".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.undated_recency) {
            return Err(RankError::Configuration(format!(
                "undated recency must be within [0,1], got {}",
                self.undated_recency
            )));
        }
        if self.top_n == 0 {
            return Err(RankError::Configuration("top_n must be at least 1".into()));
        }
        Ok(())
    }
}

/// Result of one `rank` call.
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    /// Sorted by composite score, highest first
    pub scored: Vec<ScoredJob>,
    /// Jobs left out, with the reason
    pub errors: Vec<JobError>,
}

/// Scores and orders a batch of embedded jobs.
#[derive(Debug, Clone)]
pub struct Ranker {
    config: RankingConfig,
    now: Option<DateTime<Utc>>,
}

impl Ranker {
    pub fn new(config: RankingConfig) -> Self {
        Self { config, now: None }
    }

    /// Fix "today" for recency; defaults to the wall clock.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Score `jobs` against `candidate` and sort them.
    ///
    /// Jobs without an embedding, or whose embedding is not in `index`, are
    /// left out and reported in `Ranking::errors`. Equal scores keep input
    /// order.
    ///
    /// # Errors
    /// - `MissingEmbedding` if the candidate has no vector
    /// - `IndexNotBuilt` if `index` was never built
    /// - `DimensionMismatch` if candidate and index dimensions differ
    pub fn rank(
        &self,
        candidate: &CandidateProfile,
        jobs: &[JobRecord],
        index: &VectorIndex,
    ) -> Result<Ranking> {
        let query = candidate
            .embedding
            .as_deref()
            .ok_or_else(|| RankError::MissingEmbedding("candidate".into()))?;

        let similarities: HashMap<String, f32> = index.similarity(query)?.into_iter().collect();
        let now = self.now.unwrap_or_else(Utc::now);
        let candidate_skills = candidate.skill_keys();

        let mut ranking = Ranking::default();
        for job in jobs {
            if job.embedding.is_none() {
                ranking.errors.push(JobError::new(
                    &job.id,
                    RankError::MissingEmbedding(job.id.clone()),
                ));
                continue;
            }
            let Some(&cosine) = similarities.get(&job.id) else {
                ranking
                    .errors
                    .push(JobError::new(&job.id, RankError::NotIndexed(job.id.clone())));
                continue;
            };

            let sub_scores = SubScores {
                similarity: rescale_similarity(cosine),
                location: location_match(candidate.target_location.as_deref(), &job.location),
                recency: self.recency(job.posted_at, now),
                skill_overlap: skill_overlap(&candidate_skills, &job.skills),
            };
            ranking.scored.push(ScoredJob {
                job: job.clone(),
                score: self.config.weights.composite(&sub_scores),
                missing_skills: missing_skills(candidate, job),
                sub_scores,
            });
        }

        // Vec::sort_by is stable; ties keep input order.
        ranking.scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!(
            scored = ranking.scored.len(),
            skipped = ranking.errors.len(),
            "Ranked job batch"
        );
        Ok(ranking)
    }

    /// 1.0 today, falling linearly to 0.0 at the horizon.
    pub fn recency(&self, posted_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        let Some(posted_at) = posted_at else {
            return self.config.undated_recency;
        };
        let age_days = (now.date_naive() - posted_at.date_naive()).num_days().max(0) as f64;
        let horizon = f64::from(self.config.recency_horizon_days);
        (1.0 - age_days / horizon).clamp(0.0, 1.0)
    }
}

/// Map cosine similarity from [-1,1] to [0,1].
pub fn rescale_similarity(cosine: f32) -> f64 {
    ((f64::from(cosine) + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// 1.0 with no preference or when the target appears in the job's location.
pub fn location_match(target: Option<&str>, job_location: &str) -> f64 {
    let target = target.map(str::trim).unwrap_or_default();
    if target.is_empty() || job_location.to_lowercase().contains(&target.to_lowercase()) {
        1.0
    } else {
        0.0
    }
}

/// Share of the job's skills the candidate has; 0.0 for a job with none.
pub fn skill_overlap(candidate_skills: &HashSet<String>, job_skills: &[String]) -> f64 {
    let job_keys: HashSet<String> = job_skills
        .iter()
        .map(|s| skill_key(s))
        .filter(|k| !k.is_empty())
        .collect();
    if job_keys.is_empty() {
        return 0.0;
    }
    let shared = job_keys.intersection(candidate_skills).count();
    shared as f64 / job_keys.len() as f64
}
