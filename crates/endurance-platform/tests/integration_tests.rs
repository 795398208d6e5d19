//! Integration tests for endurance-platform
//!
//! These tests exercise the public API against the real filesystem of the
//! machine running them, so they only assert relationships, never sizes.

use endurance_platform::*;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

// ============================================================================
// Free space tests
// ============================================================================

#[test]
fn test_available_space_of_temp_dir() {
    let temp_dir = TempDir::new().unwrap();
    let available = available_space(temp_dir.path()).unwrap();
    let info = space_info(temp_dir.path()).unwrap();

    assert!(info.total > 0);
    // Other processes may write between the two calls, so only bound it.
    assert!(available <= info.total);
}

#[test]
fn test_available_space_file_and_dir_agree_on_volume() {
    let temp_dir = TempDir::new().unwrap();
    let mut file = NamedTempFile::new_in(temp_dir.path()).unwrap();
    file.write_all(b"endurance").unwrap();

    let dir_info = space_info(temp_dir.path()).unwrap();
    let file_info = space_info(file.path()).unwrap();

    // Same volume, same total size.
    assert_eq!(dir_info.total, file_info.total);
}

#[test]
fn test_available_space_missing_directory() {
    let result = available_space(std::path::Path::new(
        "/definitely/not/a/real/endurance/dir/unit.bin",
    ));
    assert!(result.is_err());
}

#[test]
fn test_available_space_shrinks_or_holds_after_write() {
    let temp_dir = TempDir::new().unwrap();
    let before = available_space(temp_dir.path()).unwrap();

    let path = temp_dir.path().join("unit_0.bin");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(&vec![0xA5u8; 4 * 1024 * 1024]).unwrap();
    file.sync_all().unwrap();

    let after = available_space(temp_dir.path()).unwrap();
    // Shared CI volumes can gain space from other tenants; the write itself
    // never increases it beyond what was there plus noise.
    assert!(after <= before + 64 * 1024 * 1024);
}

// ============================================================================
// Error classification tests
// ============================================================================

#[test]
fn test_is_disk_full_storage_full_kind() {
    let err = std::io::Error::new(std::io::ErrorKind::StorageFull, "full");
    assert!(is_disk_full(&err));
}

#[test]
fn test_is_disk_full_rejects_unrelated_kinds() {
    for kind in [
        std::io::ErrorKind::NotFound,
        std::io::ErrorKind::PermissionDenied,
        std::io::ErrorKind::Interrupted,
        std::io::ErrorKind::Other,
    ] {
        let err = std::io::Error::new(kind, "x");
        assert!(!is_disk_full(&err), "{:?} misclassified", kind);
    }
}

// ============================================================================
// Error type tests
// ============================================================================

#[test]
fn test_platform_error_variants() {
    let errors: Vec<PlatformError> = vec![
        PlatformError::InvalidPath("a\0b".to_string()),
        PlatformError::NotSupported("test".to_string()),
        PlatformError::Io(std::io::Error::other("boom")),
    ];

    for err in errors {
        assert!(!err.to_string().is_empty());
    }
}
