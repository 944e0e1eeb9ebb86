//! Text sent to the embedding provider.
//!
//! Jobs and profiles are flattened into one `" | "`-separated line each, so
//! that title, skills and summary all land in the same vector space.
//!
//! ## Example Output
//!
//! ```text
//! Senior Data Engineer | Acme | Python, Spark, AWS | Build batch pipelines...
//! Skills: Python, SQL | Domain: Data | Tools: Airflow | Experience: 5
//! ```

use crate::schema::{CandidateProfile, JobRecord};

/// Longest description excerpt included in a job's text
const MAX_DESCRIPTION_CHARS: usize = 2000;

const SEPARATOR: &str = " | ";

/// Build the embedding text for a job.
pub fn job_text(job: &JobRecord) -> String {
    let mut parts: Vec<String> = Vec::new();
    push_nonempty(&mut parts, &job.title);
    if let Some(company) = &job.company {
        push_nonempty(&mut parts, company);
    }
    if !job.skills.is_empty() {
        parts.push(job.skills.join(", "));
    }
    let description = job.description.trim();
    if !description.is_empty() {
        parts.push(description.chars().take(MAX_DESCRIPTION_CHARS).collect());
    }
    finish(parts)
}

/// Build the embedding text for a candidate.
pub fn candidate_text(profile: &CandidateProfile) -> String {
    let mut parts: Vec<String> = Vec::new();
    push_nonempty(&mut parts, &profile.summary);
    if !profile.skills.is_empty() {
        parts.push(format!("Skills: {}", profile.skills.join(", ")));
    }
    if let Some(domain) = profile.domain.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        parts.push(format!("Domain: {}", domain));
    }
    if !profile.tools.is_empty() {
        parts.push(format!("Tools: {}", profile.tools.join(", ")));
    }
    if let Some(years) = profile
        .experience_years
        .as_deref()
        .map(str::trim)
        .filter(|y| !y.is_empty())
    {
        parts.push(format!("Experience: {}", years));
    }
    finish(parts)
}

fn push_nonempty(parts: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        parts.push(value.to_string());
    }
}

// Providers reject empty input.
fn finish(parts: Vec<String>) -> String {
    if parts.is_empty() {
        " ".to_string()
    } else {
        parts.join(SEPARATOR)
    }
}
