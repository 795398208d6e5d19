//! Windows platform implementation
//!
//! Uses GetDiskFreeSpaceExW, which honours per-user quotas.

use crate::{query_dir, PlatformError, PlatformOps, Result, SpaceInfo};
use std::io;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use windows_sys::Win32::Foundation::{ERROR_DISK_FULL, ERROR_HANDLE_DISK_FULL};
use windows_sys::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;

/// Windows platform implementation
pub struct WindowsPlatform;

impl PlatformOps for WindowsPlatform {
    fn space_info(path: &Path) -> Result<SpaceInfo> {
        let dir = query_dir(path);
        let mut wide: Vec<u16> = dir.as_os_str().encode_wide().collect();
        if wide.contains(&0) {
            return Err(PlatformError::InvalidPath(dir.display().to_string()));
        }
        wide.push(0);

        let mut available: u64 = 0;
        let mut total: u64 = 0;
        let mut total_free: u64 = 0;

        // SAFETY: wide is NUL-terminated and outlives the call; the three
        // out-pointers reference live u64 locals.
        #[allow(unsafe_code)]
        let ok = unsafe {
            GetDiskFreeSpaceExW(wide.as_ptr(), &mut available, &mut total, &mut total_free)
        };
        if ok == 0 {
            return Err(PlatformError::Io(io::Error::last_os_error()));
        }

        tracing::debug!(
            "GetDiskFreeSpaceExW {:?}: available={} total={}",
            dir,
            available,
            total
        );

        Ok(SpaceInfo { available, total })
    }

    fn is_disk_full(err: &io::Error) -> bool {
        if err.kind() == io::ErrorKind::StorageFull {
            return true;
        }
        matches!(
            err.raw_os_error(),
            Some(code) if code as u32 == ERROR_DISK_FULL || code as u32 == ERROR_HANDLE_DISK_FULL
        )
    }
}
