//! Configuration module for triage settings
//!
//! Settings are read from a YAML file. Every field has a default, so an
//! empty file (or no file at all) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::catalog::{CatalogSource, PatternCatalog};
use crate::error::TriageError;
use crate::matcher::MatchOptions;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Catalog used when a request brings none; the built-in
    /// Checkpoint catalog when unset
    #[serde(default)]
    pub default_catalog: Option<PathBuf>,

    /// General settings
    #[serde(default)]
    pub settings: Settings,
}

/// General triage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Fold case when matching patterns
    #[serde(default)]
    pub case_insensitive: bool,

    /// Cap applied when a request does not set one
    #[serde(default)]
    pub max_errors: Option<i64>,

    /// Lines between progress log events
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            case_insensitive: false,
            max_errors: None,
            progress_interval: default_progress_interval(),
        }
    }
}

fn default_progress_interval() -> usize {
    10_000
}

impl Config {
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            case_insensitive: self.settings.case_insensitive,
        }
    }

    /// Load the catalog shared by every request
    pub fn load_default_catalog(&self) -> Result<PatternCatalog, TriageError> {
        match &self.default_catalog {
            Some(path) => PatternCatalog::load(&CatalogSource::from_path(path)?, self.match_options()),
            None => PatternCatalog::builtin(self.match_options()),
        }
    }
}

/// Per-user config location, `~/.log-triage/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".log-triage").join("config.yaml"))
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse configuration from YAML string
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    // serde_yaml rejects an empty document, treat it as all defaults
    if yaml.trim().is_empty() {
        return Ok(Config::default());
    }

    let config: Config = serde_yaml::from_str(yaml)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load the explicit config file, else the per-user one if present,
/// else defaults
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            tracing::info!("Using config file: {}", path.display());
            load_config(path)
        }
        _ => Ok(Config::default()),
    }
}

/// Validate a configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if let Some(max) = config.settings.max_errors {
        if max < 1 {
            return Err(ConfigError::Invalid(format!(
                "max_errors must be at least 1, got {}",
                max
            )));
        }
    }

    if config.settings.progress_interval == 0 {
        return Err(ConfigError::Invalid(
            "progress_interval must be greater than 0".to_string(),
        ));
    }

    Ok(())
}
