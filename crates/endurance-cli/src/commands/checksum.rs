//! Checksum command - SHA-256 of a file, as the verifier computes it

use anyhow::{Context, Result};
use console::style;
use endurance_core::{digest, format_size, DEFAULT_CHUNK_SIZE};
use std::fs::File;
use std::path::Path;

use crate::progress::create_bytes_progress_bar;

/// Conditionally println based on silent mode
macro_rules! println_if {
    ($silent:expr) => {
        if !$silent {
            println!();
        }
    };
    ($silent:expr, $($arg:tt)*) => {
        if !$silent {
            println!($($arg)*);
        }
    };
}

/// Execute the checksum command
pub fn execute(path: &Path, silent: bool) -> Result<()> {
    println_if!(
        silent,
        "{} {}",
        style("File:").bold(),
        style(path.display()).cyan()
    );

    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let size = file.metadata().ok().map(|m| m.len());

    if let Some(size) = size {
        println_if!(silent, "  Size: {}", format_size(size));
    }
    println_if!(silent, "\n{} SHA-256 checksum...", style("Calculating").bold());

    let pb = create_bytes_progress_bar(size, silent);
    let mut reader = pb.wrap_read(file);
    let checksum = digest(&mut reader, DEFAULT_CHUNK_SIZE).context("Failed to calculate checksum")?;
    pb.finish_and_clear();

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    // The hash is the useful output, print it even in silent mode
    if silent {
        println!("{}", checksum.to_hex());
    } else {
        println_if!(silent);
        println!("{} ({}):", style("SHA-256").green().bold(), path.display());
        println!("{}", checksum.to_hex());

        println!();
        println!("{}:", style("Checksum file format").dim());
        println!("{}  {}", checksum.to_hex(), name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_checksum_silent() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        file.flush().unwrap();

        assert!(execute(file.path(), true).is_ok());
    }

    #[test]
    fn test_checksum_missing_file() {
        let result = execute(Path::new("/nonexistent/endurance/unit.bin"), true);
        assert!(result.is_err());
    }
}
