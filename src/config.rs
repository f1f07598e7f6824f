//! Optional YAML configuration.
//!
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration. Command-line flags are applied on top afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::render::DEFAULT_BINS;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Where and what to write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_bins")]
    pub histogram_bins: usize,
    #[serde(default = "default_true")]
    pub write_csv: bool,
    #[serde(default = "default_true")]
    pub write_reports: bool,
}

/// How traces are read and checked
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Fail the run unless every rank reported
    #[serde(default)]
    pub require_complete: bool,
    /// Worker threads for parsing; 0 parses on the calling thread
    #[serde(default)]
    pub threads: usize,
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_bins() -> usize {
    DEFAULT_BINS
}

fn default_true() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            histogram_bins: default_bins(),
            write_csv: true,
            write_reports: true,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid output configuration: {0}")]
    InvalidOutput(String),
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output.histogram_bins == 0 {
            return Err(ConfigError::InvalidOutput(
                "histogram_bins must be at least 1".to_string(),
            ));
        }
        if self.output.directory.as_os_str().is_empty() {
            return Err(ConfigError::InvalidOutput(
                "directory cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load and validate configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read configuration {}", config_path.display()))?;

    let config: Config = if content.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration {}", config_path.display()))?
    };

    config.validate()?;
    Ok(config)
}
