//! Skill-gap analysis.
//!
//! Compares required job skills against the candidate's and recommends the
//! skills most often missing among the best-ranked jobs.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::schema::{skill_key, CandidateProfile, JobRecord, ScoredJob};

/// A skill to learn and how many top jobs ask for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkillRecommendation {
    pub skill: String,
    pub frequency: usize,
}

/// Job skills the candidate lacks.
///
/// Comparison is case-insensitive; the job's spelling is kept. The result is
/// ordered by first appearance in the job and holds each skill once.
pub fn missing_skills(candidate: &CandidateProfile, job: &JobRecord) -> Vec<String> {
    let have = candidate.skill_keys();
    let mut seen = HashSet::new();
    job.skills
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| {
            let key = skill_key(s);
            !have.contains(&key) && seen.insert(key)
        })
        .map(str::to_string)
        .collect()
}

/// Most frequently missing skills over the first `top_n` scored jobs.
///
/// Each skill counts once per job. Sorted by frequency, highest first; ties
/// keep the order in which skills were first seen. The first spelling seen is
/// displayed.
pub fn aggregate_recommendations(scored: &[ScoredJob], top_n: usize) -> Vec<SkillRecommendation> {
    let mut order: Vec<SkillRecommendation> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for job in scored.iter().take(top_n) {
        let mut counted = HashSet::new();
        for skill in &job.missing_skills {
            let key = skill_key(skill);
            if key.is_empty() || !counted.insert(key.clone()) {
                continue;
            }
            match positions.get(&key) {
                Some(&pos) => order[pos].frequency += 1,
                None => {
                    positions.insert(key, order.len());
                    order.push(SkillRecommendation {
                        skill: skill.trim().to_string(),
                        frequency: 1,
                    });
                }
            }
        }
    }

    // Stable: equal frequencies stay in first-seen order.
    order.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    order
}
