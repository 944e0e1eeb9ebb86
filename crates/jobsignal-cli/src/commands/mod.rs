//! CLI command implementations

pub mod config;
pub mod rank;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use jobsignal_config::{ConfigLoader, ConfigOverrides, JobSignalConfig};
use jobsignal_rank::{ProviderHandle, RankingConfig, RankingPipeline};
use serde::de::DeserializeOwned;

use crate::GlobalOptions;

/// Directory used for local config lookup.
pub fn working_dir() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to get current directory")
}

/// Load configuration: an explicit `--config` file, or global then local.
pub fn load_config(global: &GlobalOptions, overrides: &ConfigOverrides) -> Result<JobSignalConfig> {
    let mut loader = ConfigLoader::new();

    if let Some(ref config_path) = global.config {
        return loader
            .load_file(config_path, Some(overrides))
            .with_context(|| format!("Failed to load config file {}", config_path.display()));
    }

    loader
        .load(&working_dir()?, Some(overrides))
        .context("Failed to load configuration")
}

/// Build a ranking pipeline from loaded configuration.
///
/// The embedding provider is created lazily on first use.
pub fn create_pipeline(config: &JobSignalConfig) -> Result<RankingPipeline> {
    let ranking = RankingConfig::from_settings(&config.ranking)
        .context("Invalid ranking configuration")?;
    let handle = Arc::new(ProviderHandle::new(config.embedding.clone()));
    RankingPipeline::new(handle, ranking).context("Failed to create ranking pipeline")
}

/// Read and parse a JSON input file.
pub fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} file {}", what, path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} file {}", what, path.display()))
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}

/// Print a warning message to stderr.
pub fn print_warning(message: &str) {
    eprintln!("warning: {}", message);
}
