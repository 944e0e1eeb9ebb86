//! Layered configuration loading.
//!
//! Settings are resolved from, in increasing priority: built-in defaults,
//! `~/.jobsignal/config.toml`, `.jobsignal/config.toml` under the working
//! directory, then command-line overrides. An explicit `--config` file
//! replaces both file layers.
//!
//! Layers are merged as TOML tables before they are typed, so a later file
//! overrides exactly the keys it writes, including a key set back to its
//! default value. `[ranking.weights]` is the exception: it is replaced as a
//! whole, since mixing weights from two files would break their sum.

use crate::error::ConfigError;
use crate::{ConfigOverrides, JobSignalConfig};
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::{debug, trace};

const CONFIG_DIR: &str = ".jobsignal";
const CONFIG_FILE: &str = "config.toml";

/// Tables replaced wholesale instead of merged key by key.
const ATOMIC_TABLES: &[&str] = &["weights"];

/// Finds and merges configuration files.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// `None` when there is no home directory
    global_dir: Option<PathBuf>,

    /// Global layer as read on first use
    global_cache: Option<Table>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader whose global layer lives under the user's home directory.
    pub fn new() -> Self {
        Self {
            global_dir: dirs::home_dir().map(|home| home.join(CONFIG_DIR)),
            global_cache: None,
        }
    }

    /// Loader with the global layer somewhere else (tests, sandboxes).
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_dir: Some(global_dir.into()),
            global_cache: None,
        }
    }

    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_dir.as_ref().map(|dir| dir.join(CONFIG_FILE))
    }

    pub fn local_config_path(&self, root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Resolve the effective configuration for `root`.
    pub fn load(
        &mut self,
        root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<JobSignalConfig, ConfigError> {
        let mut merged = Table::new();
        if let Some(global) = self.global_layer()? {
            merge_tables(&mut merged, global);
        }
        if let Some(local) = read_layer_if_present(&self.local_config_path(root))? {
            merge_tables(&mut merged, local);
        }

        let config = Value::Table(merged).try_into().map_err(|e: toml::de::Error| {
            ConfigError::ValidationError(format!("merged configuration is inconsistent: {e}"))
        })?;
        finish(config, overrides)
    }

    /// Resolve from defaults plus one explicit file, which must exist.
    pub fn load_file(
        &self,
        path: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<JobSignalConfig, ConfigError> {
        debug!(path = %path.display(), "Loading explicit config file");
        let config = typed(path, read_layer(path)?)?;
        finish(config, overrides)
    }

    /// The global file on its own, over defaults. Read once, then served
    /// from cache until [`clear_cache`](Self::clear_cache).
    pub fn load_global(&mut self) -> Result<Option<JobSignalConfig>, ConfigError> {
        let Some(table) = self.global_layer()? else {
            return Ok(None);
        };
        let path = self.global_config_path().unwrap_or_default();
        typed(&path, table).map(Some)
    }

    /// The local file under `root` on its own, over defaults.
    pub fn load_local(&self, root: &Path) -> Result<Option<JobSignalConfig>, ConfigError> {
        let path = self.local_config_path(root);
        match read_layer_if_present(&path)? {
            Some(table) => typed(&path, table).map(Some),
            None => Ok(None),
        }
    }

    /// Forget the cached global layer; the next load reads the file again.
    pub fn clear_cache(&mut self) {
        self.global_cache = None;
    }

    /// Write `config` to the local layer under `root`.
    pub fn save_local(&self, root: &Path, config: &JobSignalConfig) -> Result<(), ConfigError> {
        write_config(&self.local_config_path(root), config)
    }

    /// Write a default local config unless one already exists. Returns its path.
    pub fn init_local(&self, root: &Path) -> Result<PathBuf, ConfigError> {
        let path = self.local_config_path(root);
        if path.exists() {
            debug!(path = %path.display(), "Local config already present");
        } else {
            write_config(&path, &JobSignalConfig::default())?;
        }
        Ok(path)
    }

    fn global_layer(&mut self) -> Result<Option<Table>, ConfigError> {
        if let Some(cached) = &self.global_cache {
            return Ok(Some(cached.clone()));
        }
        let Some(path) = self.global_config_path() else {
            debug!("No home directory, skipping global config");
            return Ok(None);
        };
        let layer = read_layer_if_present(&path)?;
        self.global_cache.clone_from(&layer);
        Ok(layer)
    }
}

fn finish(
    mut config: JobSignalConfig,
    overrides: Option<&ConfigOverrides>,
) -> Result<JobSignalConfig, ConfigError> {
    if let Some(overrides) = overrides {
        config.apply_overrides(overrides);
    }
    config.validate()?;
    Ok(config)
}

fn typed(path: &Path, table: Table) -> Result<JobSignalConfig, ConfigError> {
    Value::Table(table)
        .try_into()
        .map_err(|e| ConfigError::parse_toml(path, e))
}

fn read_layer_if_present(path: &Path) -> Result<Option<Table>, ConfigError> {
    if !path.is_file() {
        trace!(path = %path.display(), "No config file");
        return Ok(None);
    }
    debug!(path = %path.display(), "Loading config file");
    read_layer(path).map(Some)
}

/// Read one file as a raw table, rejecting it if it does not type-check on
/// its own so errors name the file at fault.
fn read_layer(path: &Path) -> Result<Table, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let table: Table = toml::from_str(&text).map_err(|e| ConfigError::parse_toml(path, e))?;
    typed(path, table.clone())?;
    Ok(table)
}

fn write_config(path: &Path, config: &JobSignalConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.exists()) {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::create_dir(dir, e))?;
    }
    let text = toml::to_string_pretty(config)?;
    std::fs::write(path, text).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge `overlay` into `base`, recursing into tables.
fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match value {
            Value::Table(incoming) if !ATOMIC_TABLES.contains(&key.as_str()) => {
                if let Some(Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, incoming);
                } else {
                    base.insert(key, Value::Table(incoming));
                }
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}
