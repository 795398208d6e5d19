//! SHA-256 checksums for unit files
//!
//! Digests are computed incrementally in fixed-size chunks, so memory use
//! stays at one chunk regardless of unit size. The same [`Digest`] type is
//! produced while a unit is generated and when it is read back.

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::{Error, Result};
use crate::volume::Volume;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::io::Read;
use std::path::Path;

/// Length of a SHA-256 digest in bytes
pub const DIGEST_LEN: usize = 32;

/// A SHA-256 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Parse from a hex string (either case)
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim();
        if hex.len() != DIGEST_LEN * 2 {
            return Err(Error::InvalidConfig(format!(
                "Invalid digest length: expected {} hex characters, got {}",
                DIGEST_LEN * 2,
                hex.len()
            )));
        }
        let bytes = hex_to_bytes(hex)?;
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    /// Lowercase hex representation
    pub fn to_hex(&self) -> String {
        bytes_to_hex(&self.0)
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl std::str::FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental hasher fed chunk by chunk while a unit is generated
#[derive(Default)]
pub struct DigestBuilder {
    hasher: Sha256,
}

impl DigestBuilder {
    /// Start a new digest
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Finish and return the digest
    pub fn finish(self) -> Digest {
        Digest(self.hasher.finalize().into())
    }
}

/// Digest of an in-memory buffer
pub fn digest_bytes(data: &[u8]) -> Digest {
    Digest(Sha256::digest(data).into())
}

/// Digest of everything a reader yields, read in chunks of `chunk_size`
pub fn digest<R: Read + ?Sized>(reader: &mut R, chunk_size: usize) -> Result<Digest> {
    let mut builder = DigestBuilder::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let n = read_full(reader, &mut buffer)?;
        if n == 0 {
            break;
        }
        builder.update(&buffer[..n]);
    }

    Ok(builder.finish())
}

/// Re-reads unit files and checks them against their recorded digest
#[derive(Debug, Clone, Copy)]
pub struct ChecksumVerifier {
    chunk_size: usize,
}

impl Default for ChecksumVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ChecksumVerifier {
    /// Create a verifier reading in chunks of `chunk_size` bytes
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Chunk size used for reads
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Digest of the file at `path` as currently stored on `volume`
    pub fn recompute<V: Volume + ?Sized>(&self, volume: &V, path: &Path) -> Result<Digest> {
        let mut reader = volume.open(path)?;
        digest(&mut reader, self.chunk_size)
    }

    /// Whether the file at `path` still hashes to `expected`
    pub fn verify<V: Volume + ?Sized>(
        &self,
        volume: &V,
        path: &Path,
        expected: &Digest,
    ) -> Result<bool> {
        Ok(self.recompute(volume, path)? == *expected)
    }
}

/// Read until the buffer is full or EOF
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(total)
}

/// Convert bytes to lowercase hex string
fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Convert hex string to bytes
fn hex_to_bytes(hex: &str) -> Result<Vec<u8>> {
    if !hex.is_ascii() || hex.len() % 2 != 0 {
        return Err(Error::InvalidConfig(
            "Hex string must be ASCII with even length".to_string(),
        ));
    }

    // from_str_radix alone would accept a leading '+'
    if let Some(i) = hex.bytes().position(|b| !b.is_ascii_hexdigit()) {
        return Err(Error::InvalidConfig(format!(
            "Invalid hex character at position {}",
            i
        )));
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| {
                Error::InvalidConfig(format!("Invalid hex character at position {}", i))
            })
        })
        .collect()
}
