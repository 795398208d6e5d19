//! Persistent user settings for Endurance
//!
//! Settings are stored in a TOML configuration file at:
//! - Linux/macOS: `~/.config/endurance/endurance_config.toml`
//! - Windows: `%APPDATA%\endurance\endurance_config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! [run]
//! unit_size = "1G"
//! units = "auto"
//! cycles = "10"
//! safety_margin = "2G"
//! chunk_size = "1M"
//! sync = true
//! file_prefix = "endurance"
//!
//! [behavior]
//! on_mismatch = "prompt"
//! quiet = false
//!
//! [report]
//! format = "csv"
//! directory = "/var/log/endurance"
//! ```

use crate::config::{CycleCount, TestConfig, UnitCount, DEFAULT_FILE_PREFIX};
use crate::format::parse_size;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration file name
const CONFIG_FILE_NAME: &str = "endurance_config.toml";

/// Application name for config directory
const APP_NAME: &str = "endurance";

/// User settings loaded from configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Run parameters
    pub run: RunSettings,

    /// Behavior settings
    pub behavior: BehaviorSettings,

    /// Report export settings
    pub report: ReportSettings,
}

/// Default run parameters, as size and count strings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunSettings {
    /// Unit size (e.g., "1G", "512M")
    pub unit_size: String,

    /// Units per cycle, a number or "auto"
    pub units: String,

    /// Cycles per run, a number or "unbounded"
    pub cycles: String,

    /// Space kept free on the volume (e.g., "2G")
    pub safety_margin: String,

    /// Streaming chunk size (e.g., "1M")
    pub chunk_size: String,

    /// Sync unit data before read-back
    pub sync: bool,

    /// Prefix for unit file names
    pub file_prefix: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            unit_size: "1G".to_string(),
            units: "1".to_string(),
            cycles: "1".to_string(),
            safety_margin: "2G".to_string(),
            chunk_size: "1M".to_string(),
            sync: true,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }
}

/// What to do when a unit fails verification
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MismatchAction {
    /// Ask the operator
    #[default]
    Prompt,
    /// Stop the run
    Abort,
    /// Keep going
    Continue,
}

/// General behavior settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehaviorSettings {
    /// Reaction to checksum mismatches
    pub on_mismatch: MismatchAction,

    /// Whether to suppress non-error output
    pub quiet: bool,
}

/// Export format for cycle records
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// JSON array of records
    #[default]
    Json,
    /// Comma separated values with a header row
    Csv,
}

/// Report export settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportSettings {
    /// Default export format
    pub format: ReportFormat,

    /// Directory that receives reports when no explicit path is given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the configuration file
    ///
    /// Returns default settings if the file doesn't exist or can't be parsed
    pub fn load() -> Self {
        Self::load_from_path(Self::config_path())
    }

    /// Load settings from a specific path
    pub fn load_from_path(path: Option<PathBuf>) -> Self {
        let Some(path) = path else {
            tracing::debug!("No config path available, using defaults");
            return Self::default();
        };

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(settings) => {
                    tracing::debug!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save settings to the configuration file
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        self.save_to_path(Self::config_path())
    }

    /// Save settings to a specific path
    pub fn save_to_path(&self, path: Option<PathBuf>) -> Result<PathBuf, SettingsError> {
        let path = path.ok_or(SettingsError::NoConfigDir)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let contents = toml::to_string_pretty(self).map_err(SettingsError::Serialize)?;

        std::fs::write(&path, contents).map_err(|e| SettingsError::Io {
            path: path.clone(),
            source: e,
        })?;

        tracing::info!("Saved settings to {:?}", path);
        Ok(path)
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|p| p.join(APP_NAME).join(CONFIG_FILE_NAME))
    }

    /// Check if a configuration file exists
    pub fn config_exists() -> bool {
        Self::config_path().is_some_and(|p| p.exists())
    }

    /// Generate a default configuration file content as a string
    pub fn default_config_string() -> String {
        let default = Self::default();
        toml::to_string_pretty(&default)
            .unwrap_or_else(|_| String::from("# Failed to generate default config"))
    }

    /// Build a [`TestConfig`] for `target_dir` from the `[run]` section
    pub fn to_test_config(&self, target_dir: impl AsRef<Path>) -> crate::Result<TestConfig> {
        let run = &self.run;
        let chunk_size = usize::try_from(parse_size(&run.chunk_size)?).map_err(|_| {
            crate::Error::InvalidConfig(format!("chunk size {} is too large", run.chunk_size))
        })?;

        Ok(TestConfig::new(target_dir.as_ref())
            .unit_size(parse_size(&run.unit_size)?)
            .units(run.units.parse::<UnitCount>()?)
            .cycles(run.cycles.parse::<CycleCount>()?)
            .safety_margin(parse_size(&run.safety_margin)?)
            .chunk_size(chunk_size)
            .file_prefix(run.file_prefix.clone())
            .sync(run.sync))
    }
}

/// Errors that can occur when working with settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// No configuration directory available
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// Failed to read or write config file
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path that caused the error
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Failed to serialize settings
    #[error("Failed to serialize settings: {0}")]
    Serialize(toml::ser::Error),
}
