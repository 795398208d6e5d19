//! Run configuration for endurance tests

use crate::error::{Error, Result};
use crate::format::is_power_of_two;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default size of one data unit (1 GiB)
pub const DEFAULT_UNIT_SIZE: u64 = 1024 * 1024 * 1024;

/// Default space left free on the volume in auto mode (2 GiB)
pub const DEFAULT_SAFETY_MARGIN: u64 = 2 * 1024 * 1024 * 1024;

/// Default streaming chunk size (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Minimum chunk size (4 KiB)
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;

/// Maximum chunk size (64 MiB)
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Default prefix for unit file names
pub const DEFAULT_FILE_PREFIX: &str = "endurance";

/// How many units each cycle writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitCount {
    /// Exactly this many units
    Fixed(u64),
    /// As many whole units as fit after the safety margin
    Auto,
}

impl fmt::Display for UnitCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitCount::Fixed(n) => write!(f, "{}", n),
            UnitCount::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for UnitCount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(UnitCount::Auto);
        }
        s.parse::<u64>()
            .map(UnitCount::Fixed)
            .map_err(|_| Error::InvalidConfig(format!("Invalid unit count: {}", s)))
    }
}

/// How many cycles a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleCount {
    /// Fixed mode: this many cycles
    Count(u64),
    /// Full-capacity mode: fill the volume until cancelled
    Unbounded,
}

impl CycleCount {
    /// Whether this selects full-capacity mode
    pub fn is_unbounded(&self) -> bool {
        matches!(self, CycleCount::Unbounded)
    }
}

impl fmt::Display for CycleCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleCount::Count(n) => write!(f, "{}", n),
            CycleCount::Unbounded => write!(f, "unbounded"),
        }
    }
}

impl FromStr for CycleCount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unbounded") {
            return Ok(CycleCount::Unbounded);
        }
        s.parse::<u64>()
            .map(CycleCount::Count)
            .map_err(|_| Error::InvalidConfig(format!("Invalid cycle count: {}", s)))
    }
}

/// Configuration for one endurance run
#[derive(Debug, Clone, PartialEq)]
pub struct TestConfig {
    /// Directory that receives the unit files
    pub target_dir: PathBuf,

    /// Size of each unit in bytes
    pub unit_size: u64,

    /// Units per cycle
    pub units: UnitCount,

    /// Number of cycles
    pub cycles: CycleCount,

    /// Bytes that are never written into when sizing by free space
    pub safety_margin: u64,

    /// Streaming granularity for generation and read-back
    pub chunk_size: usize,

    /// Prefix for unit file names
    pub file_prefix: String,

    /// Flush unit data to the device before reading it back
    pub sync: bool,
}

impl TestConfig {
    /// Create a config targeting `target_dir` with defaults for everything else
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            unit_size: DEFAULT_UNIT_SIZE,
            units: UnitCount::Fixed(1),
            cycles: CycleCount::Count(1),
            safety_margin: DEFAULT_SAFETY_MARGIN,
            chunk_size: DEFAULT_CHUNK_SIZE,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            sync: true,
        }
    }

    /// Set unit size in bytes
    pub fn unit_size(mut self, size: u64) -> Self {
        self.unit_size = size;
        self
    }

    /// Set units per cycle
    pub fn units(mut self, units: UnitCount) -> Self {
        self.units = units;
        self
    }

    /// Set cycle count
    pub fn cycles(mut self, cycles: CycleCount) -> Self {
        self.cycles = cycles;
        self
    }

    /// Set safety margin in bytes
    pub fn safety_margin(mut self, margin: u64) -> Self {
        self.safety_margin = margin;
        self
    }

    /// Set chunk size in bytes
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Set file name prefix
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Enable or disable syncing unit data before read-back
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Check every field, including that the target directory exists and is
    /// writable.
    ///
    /// Write access is tested by creating and removing `{file_prefix}_write_check`
    /// in the target directory; permission bits alone do not tell whether
    /// this process may create files there.
    pub fn validate(&self) -> Result<()> {
        if self.unit_size == 0 {
            return Err(Error::InvalidConfig(
                "unit size must be greater than zero".to_string(),
            ));
        }

        if self.units == UnitCount::Fixed(0) {
            return Err(Error::InvalidConfig(
                "unit count must be greater than zero".to_string(),
            ));
        }

        if self.cycles == CycleCount::Count(0) {
            return Err(Error::InvalidConfig(
                "cycle count must be greater than zero".to_string(),
            ));
        }

        if !is_power_of_two(self.chunk_size as u64) {
            return Err(Error::InvalidConfig(format!(
                "chunk size must be a power of 2, got {}",
                self.chunk_size
            )));
        }
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(Error::InvalidConfig(format!(
                "chunk size must be between {} and {} bytes, got {}",
                MIN_CHUNK_SIZE, MAX_CHUNK_SIZE, self.chunk_size
            )));
        }

        if self.file_prefix.is_empty()
            || self
                .file_prefix
                .chars()
                .any(|c| std::path::is_separator(c) || c == '\0')
        {
            return Err(Error::InvalidConfig(format!(
                "invalid file prefix: {:?}",
                self.file_prefix
            )));
        }

        let metadata = std::fs::metadata(&self.target_dir).map_err(|e| {
            Error::InvalidConfig(format!(
                "target directory {} is not accessible: {}",
                self.target_dir.display(),
                e
            ))
        })?;
        if !metadata.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "target {} is not a directory",
                self.target_dir.display()
            )));
        }

        let check_file = self.target_dir.join(format!("{}_write_check", self.file_prefix));
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&check_file)
            .map_err(|e| {
                Error::InvalidConfig(format!(
                    "target directory {} is not writable: {}",
                    self.target_dir.display(),
                    e
                ))
            })?;
        if let Err(e) = std::fs::remove_file(&check_file) {
            tracing::warn!("Could not remove {:?}: {}", check_file, e);
        }

        Ok(())
    }
}
