//! # Endurance Core
//!
//! Write-verify engine for disk endurance testing: fill a volume with random
//! data, read every unit back and compare SHA-256 digests, delete, repeat.
//!
//! ## Modules
//!
//! - `config`: Run configuration and its builder
//! - `planner`: Decides how many units fit on the volume
//! - `checksum`: Streaming SHA-256 digests and read-back verification
//! - `executor`: One write-verify-cleanup cycle and the mismatch policy
//! - `controller`: Fixed and full-capacity run modes, worker thread
//! - `telemetry`: Per-cycle records for reporting
//! - `events`: Progress, log and state events sent to the caller
//! - `volume`: Filesystem seam (local disk or a test double)
//! - `settings`: Persistent user settings from configuration file
//! - `format`: Size parsing and human-readable formatting
//! - `error`: Error types and result aliases
//!
//! ## Example
//!
//! ```ignore
//! use endurance_core::{CycleController, CycleCount, RunEvent, TestConfig, UnitCount};
//!
//! let config = TestConfig::new("/mnt/ssd")
//!     .unit_size(1024 * 1024 * 1024)
//!     .units(UnitCount::Auto)
//!     .cycles(CycleCount::Count(10));
//!
//! let handle = CycleController::local(config)?.spawn()?;
//! for event in handle.events() {
//!     if let RunEvent::CycleCompleted(record) = event {
//!         println!("cycle {}: {:.2} units/s", record.cycle, record.throughput_units_per_sec);
//!     }
//! }
//! let report = handle.join()?;
//! println!("{} after {} cycles", report.phase, report.records.len());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checksum;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod executor;
pub mod format;
pub mod planner;
pub mod settings;
pub mod telemetry;
pub mod volume;

pub use checksum::{digest, digest_bytes, ChecksumVerifier, Digest, DigestBuilder, DIGEST_LEN};
pub use config::{
    CycleCount, TestConfig, UnitCount, DEFAULT_CHUNK_SIZE, DEFAULT_FILE_PREFIX,
    DEFAULT_SAFETY_MARGIN, DEFAULT_UNIT_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE,
};
pub use controller::{AbortReason, CycleController, RunHandle, RunPhase, RunReport, RunState};
pub use error::{Error, Result};
pub use events::{CyclePhase, EventSink, RunEvent, Severity};
pub use executor::{
    AbortOnMismatch, ChecksumMismatch, ContinueOnMismatch, CycleExecutor, CycleJob,
    CycleOutcome, IntegrityFailure, MismatchDecision, MismatchPolicy, ReadFailure, UnitTarget,
    WriteFailure,
};
pub use format::{format_duration, format_size, format_speed, parse_size};
pub use planner::CapacityPlanner;
pub use settings::{
    BehaviorSettings, MismatchAction, ReportFormat, ReportSettings, RunSettings, Settings,
    SettingsError,
};
pub use telemetry::{CycleRecord, Telemetry};
pub use volume::{LocalVolume, Volume};
