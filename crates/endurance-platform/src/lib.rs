//! # Endurance Platform
//!
//! Platform-specific adapters for the filesystem queries the endurance engine
//! cannot express through `std::fs` alone.
//!
//! The engine only needs two things from the operating system:
//!
//! - how many bytes an unprivileged writer can still put on the volume that
//!   holds a directory ([`available_space`])
//! - whether a failed write means "the volume is full" rather than a
//!   device or permission problem ([`is_disk_full`])

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::io;
use std::path::Path;
use thiserror::Error;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Path cannot be handed to the OS (e.g. interior NUL byte)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Operation not supported on this platform
    #[error("Not supported: {0}")]
    NotSupported(String),
}

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Space figures for the volume holding a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceInfo {
    /// Bytes available to the current (unprivileged) user
    pub available: u64,

    /// Total size of the volume in bytes
    pub total: u64,
}

/// Platform operations interface
pub trait PlatformOps {
    /// Query space figures for the volume containing `path`
    fn space_info(path: &Path) -> Result<SpaceInfo>;

    /// Whether an I/O error reports an exhausted volume or quota
    fn is_disk_full(err: &io::Error) -> bool;
}

/// Resolve the directory the OS should be asked about.
///
/// Files and not-yet-created paths are mapped to their parent, and an empty
/// path means the current directory.
pub fn query_dir(path: &Path) -> &Path {
    if path.as_os_str().is_empty() {
        return Path::new(".");
    }
    if path.is_dir() {
        return path;
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::UnixPlatform as Platform;
    } else if #[cfg(windows)] {
        mod windows;
        pub use windows::WindowsPlatform as Platform;
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(unix, windows))] {
        /// Query space figures for the volume containing `path`
        pub fn space_info(path: &Path) -> Result<SpaceInfo> {
            Platform::space_info(path)
        }

        /// Bytes available to the current user on the volume containing `path`
        pub fn available_space(path: &Path) -> Result<u64> {
            Platform::space_info(path).map(|info| info.available)
        }

        /// Whether an I/O error reports an exhausted volume or quota
        pub fn is_disk_full(err: &io::Error) -> bool {
            Platform::is_disk_full(err)
        }
    } else {
        /// Query space figures (unsupported platform)
        pub fn space_info(_path: &Path) -> Result<SpaceInfo> {
            Err(PlatformError::NotSupported("Platform not supported".to_string()))
        }

        /// Query available space (unsupported platform)
        pub fn available_space(_path: &Path) -> Result<u64> {
            Err(PlatformError::NotSupported("Platform not supported".to_string()))
        }

        /// Classify a write error (unsupported platform)
        pub fn is_disk_full(err: &io::Error) -> bool {
            err.kind() == io::ErrorKind::StorageFull
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
