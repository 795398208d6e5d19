//! Filesystem seam used by the engine
//!
//! Everything the engine does to the disk goes through [`Volume`]: create a
//! unit file, read it back, delete it, ask for free space. [`LocalVolume`]
//! is the real filesystem; tests wrap it to inject faults.

use crate::error::Result;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

/// Storage backend holding the unit files
#[cfg_attr(test, mockall::automock)]
pub trait Volume: Send {
    /// Create (or truncate) a file for writing
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;

    /// Open a file for reading
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;

    /// Delete a file
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Bytes available to this process on the volume holding `dir`
    fn available_space(&self, dir: &Path) -> Result<u64>;

    /// Whether a write error means the volume is out of space
    fn is_disk_full(&self, err: &io::Error) -> bool {
        endurance_platform::is_disk_full(err)
    }
}

/// The local filesystem
#[derive(Debug, Clone, Copy)]
pub struct LocalVolume {
    sync: bool,
}

impl LocalVolume {
    /// Create a local volume; with `sync`, flushing a unit file also syncs
    /// its data to the device
    pub fn new(sync: bool) -> Self {
        Self { sync }
    }
}

impl Default for LocalVolume {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Volume for LocalVolume {
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        let file = File::create(path)?;
        Ok(Box::new(UnitFile {
            file,
            sync: self.sync,
        }))
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn available_space(&self, dir: &Path) -> Result<u64> {
        Ok(endurance_platform::available_space(dir)?)
    }
}

/// Unit file whose `flush` reaches the device when syncing is enabled
struct UnitFile {
    file: File,
    sync: bool,
}

impl Write for UnitFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.sync {
            self.file.sync_data()?;
        }
        Ok(())
    }
}
