//! JobSignal CLI - personalized job ranking
//!
//! Ranks a batch of discovered job postings against a candidate profile and
//! reports the skills worth learning.
//!
//! # Usage
//!
//! ```bash
//! # Rank jobs for a profile
//! jobsignal rank --jobs jobs.json --profile me.json
//!
//! # Without a profile the jobs come back in discovery order
//! jobsignal rank --jobs jobs.json --output json
//!
//! # Check the embedding provider
//! jobsignal status
//!
//! # Create a local config file
//! jobsignal config init
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use jobsignal_config::{ConfigOverrides, EmbeddingProviderType, LogFormat};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;
mod progress;

/// JobSignal - Rank job postings by fit and find your skill gaps
#[derive(Parser, Debug)]
#[command(name = "jobsignal")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Path to a configuration file (skips global/local lookup)
    #[arg(long, short = 'c', global = true, env = "JOBSIGNAL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Embedding provider type (local, openai)
    #[arg(long, global = true, env = "JOBSIGNAL_EMBEDDING_PROVIDER", value_parser = parse_embedding_provider)]
    embedding_provider: Option<EmbeddingProviderType>,

    /// Embedding model for the selected provider
    #[arg(long, global = true, env = "JOBSIGNAL_MODEL")]
    model: Option<String>,
}

/// Parse embedding provider from string
fn parse_embedding_provider(s: &str) -> Result<EmbeddingProviderType, String> {
    s.parse()
        .map_err(|e: jobsignal_config::ConfigError| e.to_string())
}

impl GlobalOptions {
    /// Convert global options to config overrides
    pub fn to_config_overrides(&self) -> ConfigOverrides {
        let log_level = if self.quiet {
            Some("error".to_string())
        } else if self.verbose {
            Some("debug".to_string())
        } else {
            None
        };

        ConfigOverrides {
            embedding_provider: self.embedding_provider,
            model: self.model.clone(),
            log_level,
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rank a batch of job postings against a candidate profile
    Rank(commands::rank::RankArgs),

    /// Show embedding provider and ranking settings
    Status(commands::status::StatusArgs),

    /// View and manage configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

fn init_tracing(global: &GlobalOptions) -> Result<()> {
    let overrides = global.to_config_overrides();
    // A broken config must not stop `config validate` from reporting it.
    let logging = commands::load_config(global, &overrides)
        .map(|c| c.logging)
        .unwrap_or_default();

    let level = overrides.log_level.unwrap_or(logging.level);
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => {
            tracing::subscriber::set_global_default(builder.with_ansi(true).finish())?
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.global)?;

    match cli.command {
        Commands::Rank(args) => commands::rank::execute(args, cli.global).await,
        Commands::Status(args) => commands::status::execute(args, cli.global).await,
        Commands::Config(cmd) => commands::config::execute(cmd, cli.global).await,
    }
}
