//! Status command - Show embedding provider and ranking settings

use anyhow::{Context, Result};
use clap::Args;
use jobsignal_rank::{create_provider, ProviderStatus};

use super::load_config;
use crate::progress::Spinner;
use crate::GlobalOptions;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Load the model (or contact the API) before reporting
    #[arg(long)]
    warmup: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Execute the status command
pub async fn execute(args: StatusArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global, &global.to_config_overrides())?;
    let provider =
        create_provider(&config.embedding).context("Failed to create embedding provider")?;

    let warmup_error = if args.warmup {
        let spinner = Spinner::start(
            format!("Warming up {} ...", provider.model_name()),
            global.quiet || args.json,
        );
        match provider.warmup().await {
            Ok(()) => {
                spinner.done("Provider ready");
                None
            }
            Err(e) => {
                spinner.fail("Warmup failed");
                Some(e.to_string())
            }
        }
    } else {
        None
    };

    let status = match provider.check_status().await {
        Ok(status) => status,
        Err(e) => ProviderStatus::unavailable(
            provider.provider_type(),
            provider.model_name(),
            e.to_string(),
        ),
    };

    let weights = &config.ranking.weights;

    if args.json {
        let report = serde_json::json!({
            "provider": status,
            "warmup_error": warmup_error,
            "ranking": {
                "weights": {
                    "similarity": weights.similarity,
                    "location": weights.location,
                    "recency": weights.recency,
                    "skill_overlap": weights.skill_overlap,
                },
                "recency_horizon_days": config.ranking.recency_horizon_days,
                "undated_recency": config.ranking.undated_recency,
                "top_n": config.ranking.top_n,
            },
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("JobSignal Status");
    println!("================\n");

    println!("Embedding Provider:");
    println!("  Type:      {}", status.provider_type);
    println!("  Model:     {}", status.model);
    println!("  Device:    {}", status.device);
    if let Some(dim) = status.dimension {
        println!("  Dimension: {}", dim);
    }
    if let Some(ms) = status.latency_ms {
        println!("  Latency:   {} ms", ms);
    }
    let state = match (status.available, status.model_loaded) {
        (true, true) => "Ready",
        (true, false) => "Available (model loads on first ranking)",
        (false, _) => "Unavailable",
    };
    println!("  Status:    {}", state);
    if let Some(ref err) = status.error {
        println!("  Error:     {}", err);
    }
    if let Some(ref err) = warmup_error {
        println!("  Warmup:    {}", err);
    }
    if !status.available {
        println!("\n  Profiles cannot be embedded; jobs will be listed in discovery order.");
    }

    println!("\nRanking:");
    println!(
        "  Weights:   similarity {:.2} | location {:.2} | recency {:.2} | skills {:.2}",
        weights.similarity, weights.location, weights.recency, weights.skill_overlap
    );
    println!("  Recency:   {} days", config.ranking.recency_horizon_days);
    println!("  Undated:   {:.2}", config.ranking.undated_recency);
    println!("  Top N:     {}", config.ranking.top_n);

    Ok(())
}
