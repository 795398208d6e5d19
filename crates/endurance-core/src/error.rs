//! Error types for the Endurance core library
//!
//! Only conditions that stop a run before it starts (or break the engine
//! itself) are errors. Write failures, checksum mismatches and cleanup
//! failures that happen inside a cycle are reported as values in
//! [`CycleOutcome`](crate::executor::CycleOutcome) and as events.

use thiserror::Error;

/// Main error type for Endurance operations
#[derive(Error, Debug)]
pub enum Error {
    /// Bad inputs: zero sizes or counts, missing or unwritable target directory
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The volume cannot hold a single unit once the safety margin is reserved
    #[error(
        "Insufficient space: {available} bytes available, {margin} bytes reserved, \
         unit size is {unit_size} bytes"
    )]
    InsufficientSpace {
        /// Bytes available on the volume
        available: u64,
        /// Safety margin that must stay free
        margin: u64,
        /// Size of one unit
        unit_size: u64,
    },

    /// IO error outside of a cycle's write/verify path
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Platform query failed
    #[error("Platform error: {0}")]
    Platform(#[from] endurance_platform::PlatformError),

    /// The background worker panicked or disappeared
    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Result type alias using the Endurance error type
pub type Result<T> = std::result::Result<T, Error>;
