//! Unix platform implementation (Linux, macOS, BSDs)
//!
//! Free space comes from `statvfs(3)`; `f_bavail` is used rather than
//! `f_bfree` so blocks reserved for root are never counted.

use crate::{query_dir, PlatformError, PlatformOps, Result, SpaceInfo};
use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Unix platform implementation
pub struct UnixPlatform;

impl PlatformOps for UnixPlatform {
    fn space_info(path: &Path) -> Result<SpaceInfo> {
        let dir = query_dir(path);
        let c_path = CString::new(dir.as_os_str().as_bytes())
            .map_err(|e| PlatformError::InvalidPath(format!("{}: {}", dir.display(), e)))?;

        // SAFETY: statvfs is plain-old-data; zeroed is a valid bit pattern and
        // the kernel fills it in before we read any field.
        #[allow(unsafe_code)]
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };

        // SAFETY: c_path is a valid NUL-terminated string that outlives the
        // call, and stat points to writable memory of the right type.
        #[allow(unsafe_code)]
        let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if ret != 0 {
            return Err(PlatformError::Io(io::Error::last_os_error()));
        }

        // Field widths differ between Linux and macOS.
        #[allow(clippy::unnecessary_cast)]
        let fragment = stat.f_frsize as u64;
        #[allow(clippy::unnecessary_cast)]
        let available = (stat.f_bavail as u64).saturating_mul(fragment);
        #[allow(clippy::unnecessary_cast)]
        let total = (stat.f_blocks as u64).saturating_mul(fragment);

        tracing::debug!(
            "statvfs {:?}: available={} total={}",
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
        matches!(err.raw_os_error(), Some(code) if code == libc::ENOSPC || code == libc::EDQUOT)
    }
}
