//! Config command - View and manage configuration
//!
//! - Show the effective configuration (defaults, global, local, CLI flags)
//! - Create a local config file with defaults
//! - Validate the effective configuration
//! - Show configuration file paths

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use jobsignal_config::ConfigLoader;
use serde::Serialize;

use super::{load_config, print_info, working_dir};
use crate::GlobalOptions;

/// Config management commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show(ShowArgs),

    /// Create .jobsignal/config.toml in the current directory
    Init,

    /// Check that the effective configuration is valid
    Validate,

    /// Show configuration file paths
    Path(PathArgs),
}

/// Arguments for the show command
#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Output as JSON instead of TOML
    #[arg(long)]
    json: bool,
}

/// Arguments for the path command
#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Configuration file locations
#[derive(Debug, Clone, Serialize)]
pub struct ConfigPaths {
    /// Global config file path
    pub global: Option<PathBuf>,
    /// Local config file path
    pub local: PathBuf,
    /// Explicit --config file, if given
    pub explicit: Option<PathBuf>,
    pub global_exists: bool,
    pub local_exists: bool,
}

/// Execute the config command
pub async fn execute(cmd: ConfigCommand, global: GlobalOptions) -> Result<()> {
    match cmd {
        ConfigCommand::Show(args) => execute_show(args, global),
        ConfigCommand::Init => execute_init(global),
        ConfigCommand::Validate => execute_validate(global),
        ConfigCommand::Path(args) => execute_path(args, global),
    }
}

fn execute_show(args: ShowArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global, &global.to_config_overrides())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!(
            "{}",
            toml::to_string_pretty(&config).context("Failed to serialize configuration")?
        );
    }
    Ok(())
}

fn execute_init(global: GlobalOptions) -> Result<()> {
    let root = working_dir()?;
    let loader = ConfigLoader::new();
    let path = loader.local_config_path(&root);
    let existed = path.exists();

    let path = loader
        .init_local(&root)
        .context("Failed to create local configuration")?;

    if existed {
        print_info(
            &format!("Config already exists at {}", path.display()),
            global.quiet,
        );
    } else {
        println!("Created {}", path.display());
    }
    Ok(())
}

fn execute_validate(global: GlobalOptions) -> Result<()> {
    let config = load_config(&global, &global.to_config_overrides())?;
    println!(
        "Configuration is valid (provider: {}, model: {})",
        config.embedding.provider,
        config.embedding.model_name()
    );
    Ok(())
}

fn execute_path(args: PathArgs, global: GlobalOptions) -> Result<()> {
    let root = working_dir()?;
    let loader = ConfigLoader::new();
    let global_path = loader.global_config_path();
    let local_path = loader.local_config_path(&root);

    let paths = ConfigPaths {
        global_exists: global_path.as_ref().is_some_and(|p| p.exists()),
        local_exists: local_path.exists(),
        global: global_path,
        local: local_path,
        explicit: global.config.clone(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&paths)?);
        return Ok(());
    }

    let mark = |exists: bool| if exists { "" } else { " (not found)" };
    match paths.global {
        Some(ref p) => println!("Global: {}{}", p.display(), mark(paths.global_exists)),
        None => println!("Global: (no home directory)"),
    }
    println!("Local:  {}{}", paths.local.display(), mark(paths.local_exists));
    if let Some(ref p) = paths.explicit {
        println!("Explicit: {}{}", p.display(), mark(p.exists()));
    }
    Ok(())
}
