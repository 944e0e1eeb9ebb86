//! Rank command - Score a job batch against a candidate profile

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use jobsignal_config::ConfigOverrides;
use jobsignal_rank::{CandidateProfile, JobRecord, RankingReport, ScoredJob};

use super::{create_pipeline, load_config, print_info, print_warning, read_json};
use crate::progress::Spinner;
use crate::GlobalOptions;

/// Output format
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable listing
    #[default]
    Text,
    /// The full report as JSON
    Json,
}

/// Arguments for the rank command
#[derive(Args, Debug)]
pub struct RankArgs {
    /// JSON file with an array of job postings
    #[arg(long, short = 'j')]
    jobs: PathBuf,

    /// JSON file with the candidate profile (omit to keep discovery order)
    #[arg(long, short = 'p')]
    profile: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Maximum jobs to list in text output
    #[arg(long, short = 'n')]
    limit: Option<usize>,

    /// Jobs considered for skill recommendations
    #[arg(long)]
    top_n: Option<usize>,

    /// Age in days at which a posting stops counting as recent
    #[arg(long)]
    recency_days: Option<u32>,
}

/// Execute the rank command
pub async fn execute(args: RankArgs, global: GlobalOptions) -> Result<()> {
    let overrides = ConfigOverrides {
        top_n: args.top_n,
        recency_horizon_days: args.recency_days,
        ..global.to_config_overrides()
    };
    let config = load_config(&global, &overrides)?;

    let jobs: Vec<JobRecord> = read_json(&args.jobs, "jobs")?;
    let profile: Option<CandidateProfile> = args
        .profile
        .as_deref()
        .map(|path| read_json(path, "profile"))
        .transpose()?;

    print_info(
        &format!(
            "Loaded {} jobs{}",
            jobs.len(),
            if profile.is_some() { " and a profile" } else { "" }
        ),
        global.quiet,
    );

    let mut pipeline = create_pipeline(&config)?;

    let spinner = if profile.is_some() {
        Spinner::start(
            format!("Embedding with {} ...", config.embedding.model_name()),
            global.quiet,
        )
    } else {
        Spinner::hidden()
    };

    let report = match pipeline.run(profile, jobs).await {
        Ok(report) => report,
        Err(e) => {
            spinner.fail("Ranking failed");
            return Err(e.into());
        }
    };

    match &report {
        RankingReport::Ranked { scored, errors, .. } if errors.is_empty() => {
            spinner.done(format!("Ranked {} jobs", scored.len()))
        }
        RankingReport::Ranked { scored, errors, .. } => spinner.warn(format!(
            "Ranked {} jobs, {} skipped",
            scored.len(),
            errors.len()
        )),
        RankingReport::Unranked { reason, .. } => {
            spinner.warn("Ranking unavailable");
            if args.profile.is_some() {
                print_warning(&reason.to_string());
            }
        }
    }

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_text(&report, args.limit)),
    }

    Ok(())
}

/// Render a report for the terminal.
pub fn render_text(report: &RankingReport, limit: Option<usize>) -> String {
    let mut out = String::new();
    let limit = limit.unwrap_or(usize::MAX);

    match report {
        RankingReport::Ranked {
            scored,
            errors,
            recommendations,
        } => {
            let _ = writeln!(out, "Ranked {} jobs\n", scored.len());
            for (i, job) in scored.iter().take(limit).enumerate() {
                write_scored(&mut out, i + 1, job);
            }
            if scored.len() > limit {
                let _ = writeln!(out, "  ... {} more", scored.len() - limit);
            }

            if !errors.is_empty() {
                let _ = writeln!(out, "\nSkipped {} jobs:", errors.len());
                for e in errors {
                    let _ = writeln!(out, "  {}: {}", e.job_id, e.error);
                }
            }

            if !recommendations.is_empty() {
                let _ = writeln!(out, "\nSkills to learn:");
                for rec in recommendations {
                    let _ = writeln!(
                        out,
                        "  {} ({} {})",
                        rec.skill,
                        rec.frequency,
                        if rec.frequency == 1 { "job" } else { "jobs" }
                    );
                }
            }
        }
        RankingReport::Unranked { jobs, reason } => {
            let _ = writeln!(
                out,
                "Showing {} jobs in discovery order ({})\n",
                jobs.len(),
                reason
            );
            for (i, job) in jobs.iter().take(limit).enumerate() {
                let _ = writeln!(out, "{:>3}. {}", i + 1, headline(job));
            }
            if jobs.len() > limit {
                let _ = writeln!(out, "  ... {} more", jobs.len() - limit);
            }
        }
    }
    out
}

fn write_scored(out: &mut String, rank: usize, scored: &ScoredJob) {
    let s = &scored.sub_scores;
    let _ = writeln!(out, "{:>3}. {:.3}  {}", rank, scored.score, headline(&scored.job));
    let _ = writeln!(
        out,
        "            similarity {:.2} | location {:.2} | recency {:.2} | skills {:.2}",
        s.similarity, s.location, s.recency, s.skill_overlap
    );
    if !scored.missing_skills.is_empty() {
        let _ = writeln!(out, "            missing: {}", scored.missing_skills.join(", "));
    }
}

fn headline(job: &JobRecord) -> String {
    let mut line = job.title.clone();
    if let Some(company) = job.company.as_deref().filter(|c| !c.is_empty()) {
        line.push_str(" at ");
        line.push_str(company);
    }
    if !job.location.is_empty() {
        line.push_str(&format!(" ({})", job.location));
    }
    line
}
