//! Application Configuration
//!
//! Selector table, readiness polling and output settings stored in TOML format.

pub mod selectors;

pub use selectors::{ConfigError, SelectorConfig, SelectorKey, SelectorTable};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// DOM selectors per tracked quantity
    pub selectors: SelectorConfig,
    /// Sink readiness polling
    pub readiness: ReadinessSettings,
    /// Where and how records are written
    pub output: OutputSettings,
}

/// Readiness polling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    /// Interval between readiness checks in milliseconds
    pub poll_interval_ms: u64,
    /// Give up after this many milliseconds (unset = wait forever)
    pub timeout_ms: Option<u64>,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 300,
            timeout_ms: None,
        }
    }
}

impl ReadinessSettings {
    /// Polling interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Overall timeout as a duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Output record format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human readable log lines
    Log,
}

/// Output settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Record format
    pub format: OutputFormat,
    /// Output file; stdout when unset
    pub path: Option<PathBuf>,
}

impl TelemetryConfig {
    /// Compile the selector table, validating every selector
    pub fn compile_selectors(&self) -> Result<SelectorTable, ConfigError> {
        self.selectors.compile()
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<TelemetryConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: TelemetryConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &TelemetryConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Get the per-user configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "slottelemetry", "SlotTelemetry")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(proj_dirs.config_dir().to_path_buf())
}
