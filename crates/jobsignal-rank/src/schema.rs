//! Job, candidate and scored-result types
//!
//! These are the records exchanged with the discovery pipeline (jobs in),
//! the resume pipeline (optional profile in) and the presentation layer
//! (scored jobs out). All of them round-trip through JSON.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discovered job posting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRecord {
    /// Identifier, unique within a batch
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Free-text location as scraped ("Berlin, Germany", "Remote (EU)")
    #[serde(default)]
    pub location: String,

    /// Posting timestamp; accepts RFC 3339 or a bare `YYYY-MM-DD`
    #[serde(default, with = "posted_date")]
    pub posted_at: Option<DateTime<Utc>>,

    /// Required skills, deduplicated case-insensitively
    #[serde(default)]
    pub skills: Vec<String>,

    /// Where the posting was found (e.g. "LinkedIn")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// Unit-normalized vector, assigned by the embedding step
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
}

impl JobRecord {
    /// Create a job with only the mandatory fields set.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            company: None,
            description: String::new(),
            location: String::new(),
            posted_at: None,
            skills: Vec::new(),
            source: None,
            source_url: None,
            embedding: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_posted_at(mut self, posted_at: DateTime<Utc>) -> Self {
        self.posted_at = Some(posted_at);
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }
}

/// The candidate a batch is ranked for, derived from an uploaded resume.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CandidateProfile {
    pub summary: String,

    pub skills: Vec<String>,

    /// Preferred location; `None` or blank means no preference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_location: Option<String>,

    /// Industry focus (e.g. "Data", "Fintech")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    pub tools: Vec<String>,

    /// Free-form experience, e.g. "5" or "2-3"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience_years: Option<String>,

    #[serde(skip_serializing)]
    pub embedding: Option<Vec<f32>>,
}

impl CandidateProfile {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_target_location(mut self, location: impl Into<String>) -> Self {
        self.target_location = Some(location.into());
        self
    }

    /// Lowercased skill keys for set comparisons.
    pub fn skill_keys(&self) -> HashSet<String> {
        self.skills.iter().map(|s| skill_key(s)).collect()
    }
}

/// Per-component scores in [0,1], kept for explainability.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SubScores {
    /// Cosine similarity rescaled from [-1,1]
    pub similarity: f64,
    pub location: f64,
    pub recency: f64,
    pub skill_overlap: f64,
}

/// A job with its composite score and skill gap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredJob {
    pub job: JobRecord,
    /// Composite score in [0,1]
    pub score: f64,
    /// Job skills the candidate lacks, in the job's casing
    pub missing_skills: Vec<String>,
    pub sub_scores: SubScores,
}

/// Comparison key for a skill.
pub fn skill_key(skill: &str) -> String {
    skill.trim().to_lowercase()
}

/// Trim, drop blanks and deduplicate case-insensitively.
///
/// The first spelling of each skill is kept.
pub fn normalize_skills<I, S>(skills: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for skill in skills {
        let trimmed = skill.as_ref().trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(skill_key(trimmed)) {
            out.push(trimmed.to_string());
        }
    }
    out
}

/// Serde adapter for posting dates.
mod posted_date {
    use chrono::{DateTime, NaiveDate, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(dt.with_timezone(&Utc)));
        }
        NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| Some(naive.and_utc()))
            .ok_or_else(|| de::Error::custom(format!("invalid posting date '{}'", raw)))
    }
}
