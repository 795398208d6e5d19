//! One write-verify cycle
//!
//! A cycle runs three phases in order:
//!
//! 1. **Generate**: stream random data into unit files, hashing each chunk
//!    before it is written. Cancellation is checked before every unit.
//! 2. **Verify**: re-read every recorded unit and compare digests. Failures
//!    go through the [`MismatchPolicy`]. Verification always covers the
//!    units already written, even after cancellation.
//! 3. **Cleanup**: delete every recorded unit, whatever happened above.
//!
//! Nothing inside a cycle is an `Err`: write failures, mismatches, unreadable
//! units and failed deletions are all reported in the [`CycleOutcome`].

use crate::checksum::{ChecksumVerifier, Digest, DigestBuilder};
use crate::config::TestConfig;
use crate::events::{CyclePhase, EventSink, RunEvent};
use crate::format::{format_duration, format_size, format_speed};
use crate::volume::Volume;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// How many units a cycle should generate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitTarget {
    /// Exactly this many
    Count(u64),
    /// Until a write fails or the run is cancelled
    UntilFull,
}

impl UnitTarget {
    fn total(&self) -> Option<u64> {
        match self {
            UnitTarget::Count(n) => Some(*n),
            UnitTarget::UntilFull => None,
        }
    }
}

/// A unit that failed verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumMismatch {
    /// Unit file
    pub path: PathBuf,
    /// Digest computed while writing
    pub expected: Digest,
    /// Digest read back from disk
    pub actual: Digest,
    /// Cycle the unit belongs to
    pub cycle: u64,
    /// Units written since the run started, including this cycle's
    pub units_written_total: u64,
}

/// A unit that could not be read back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadFailure {
    /// Unit file
    pub path: PathBuf,
    /// Cycle the unit belongs to
    pub cycle: u64,
    /// The I/O error
    pub message: String,
}

/// A unit whose write did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteFailure {
    /// Unit file (already removed)
    pub path: PathBuf,
    /// Index of the unit within the cycle
    pub unit_index: u64,
    /// Whether the volume reported it is out of space
    pub disk_full: bool,
    /// The I/O error
    pub message: String,
}

/// A verification failure handed to the [`MismatchPolicy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFailure {
    /// Data read back differs from data written
    Mismatch(ChecksumMismatch),
    /// Data could not be read back at all
    Unreadable(ReadFailure),
}

impl IntegrityFailure {
    /// Unit file concerned
    pub fn path(&self) -> &Path {
        match self {
            IntegrityFailure::Mismatch(m) => &m.path,
            IntegrityFailure::Unreadable(r) => &r.path,
        }
    }
}

/// What to do after a verification failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchDecision {
    /// Verify the remaining units and keep running
    Continue,
    /// Skip remaining verification and stop the run
    Abort,
}

/// Decides whether a run survives a verification failure
pub trait MismatchPolicy: Send {
    /// Called once per failed unit, synchronously, on the worker thread
    fn decide(&mut self, failure: IntegrityFailure) -> MismatchDecision;
}

impl<F> MismatchPolicy for F
where
    F: FnMut(IntegrityFailure) -> MismatchDecision + Send,
{
    fn decide(&mut self, failure: IntegrityFailure) -> MismatchDecision {
        self(failure)
    }
}

/// Stop at the first failure
#[derive(Debug, Clone, Copy, Default)]
pub struct AbortOnMismatch;

impl MismatchPolicy for AbortOnMismatch {
    fn decide(&mut self, _failure: IntegrityFailure) -> MismatchDecision {
        MismatchDecision::Abort
    }
}

/// Record failures and keep going
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinueOnMismatch;

impl MismatchPolicy for ContinueOnMismatch {
    fn decide(&mut self, _failure: IntegrityFailure) -> MismatchDecision {
        MismatchDecision::Continue
    }
}

/// Result of one cycle
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    /// Cycle index (1-based)
    pub cycle: u64,
    /// Units fully written and recorded
    pub units_written: u64,
    /// Units read back and compared
    pub units_verified: u64,
    /// Duration of the write phase
    pub write_elapsed: Duration,
    /// Duration of all three phases
    pub total_elapsed: Duration,
    /// Units whose digest changed
    pub mismatches: Vec<ChecksumMismatch>,
    /// Units that could not be read back
    pub read_failures: Vec<ReadFailure>,
    /// Write that ended generation, if any
    pub write_failure: Option<WriteFailure>,
    /// Cancellation was observed during generation
    pub cancelled: bool,
    /// The mismatch policy asked to stop
    pub policy_aborted: bool,
    /// Unit files that could not be deleted
    pub cleanup_failures: u64,
}

impl CycleOutcome {
    /// No mismatches, read failures or write failures
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.read_failures.is_empty() && self.write_failure.is_none()
    }
}

/// Per-cycle inputs
#[derive(Debug, Clone, Copy)]
pub struct CycleJob<'a> {
    /// Cycle index (1-based)
    pub cycle: u64,
    /// Directory receiving the unit files
    pub dir: &'a Path,
    /// Prefix unique to this cycle; units are `{prefix}_{index}.bin`
    pub prefix: &'a str,
    /// How many units to generate
    pub target: UnitTarget,
    /// Units written by earlier cycles of the run
    pub units_written_before: u64,
}

impl CycleJob<'_> {
    /// Path of unit `index`
    pub fn unit_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("{}_{}.bin", self.prefix, index))
    }
}

/// A written unit awaiting verification
struct UnitRecord {
    path: PathBuf,
    digest: Digest,
    len: u64,
}

/// Runs write-verify cycles with a fixed unit geometry
#[derive(Debug, Clone, Copy)]
pub struct CycleExecutor {
    unit_size: u64,
    chunk_size: usize,
    verifier: ChecksumVerifier,
}

impl CycleExecutor {
    /// Executor for units of `unit_size` bytes streamed in `chunk_size` chunks
    pub fn new(unit_size: u64, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            unit_size,
            chunk_size,
            verifier: ChecksumVerifier::new(chunk_size),
        }
    }

    /// Executor matching a run configuration
    pub fn from_config(config: &TestConfig) -> Self {
        Self::new(config.unit_size, config.chunk_size)
    }

    /// Run one cycle
    pub fn execute<V: Volume + ?Sized>(
        &self,
        job: &CycleJob<'_>,
        volume: &V,
        policy: &mut dyn MismatchPolicy,
        cancel: &AtomicBool,
        events: &EventSink,
    ) -> CycleOutcome {
        let start = Instant::now();
        let mut outcome = CycleOutcome {
            cycle: job.cycle,
            ..Default::default()
        };

        let units = self.generate(job, volume, cancel, events, &mut outcome);
        outcome.units_written = units.len() as u64;
        outcome.write_elapsed = start.elapsed();

        self.verify(job, volume, policy, events, &units, &mut outcome);
        outcome.cleanup_failures = cleanup(volume, events, &units);
        outcome.total_elapsed = start.elapsed();

        tracing::debug!(
            "Cycle {} finished: {} written, {} verified, {} mismatches, {} unreadable",
            job.cycle,
            outcome.units_written,
            outcome.units_verified,
            outcome.mismatches.len(),
            outcome.read_failures.len()
        );

        outcome
    }

    fn generate<V: Volume + ?Sized>(
        &self,
        job: &CycleJob<'_>,
        volume: &V,
        cancel: &AtomicBool,
        events: &EventSink,
        outcome: &mut CycleOutcome,
    ) -> Vec<UnitRecord> {
        let total = job.target.total();
        let mut units = Vec::new();
        let mut rng = StdRng::from_rng(&mut rand::rng());
        let mut buffer = vec![0u8; self.chunk_size];
        let mut index = 0u64;

        loop {
            if total.is_some_and(|n| index >= n) {
                break;
            }
            if cancel.load(Ordering::SeqCst) {
                events.info(format!(
                    "Cycle {}: cancelled after {} units",
                    job.cycle, index
                ));
                outcome.cancelled = true;
                break;
            }

            let path = job.unit_path(index);
            match self.write_unit(volume, &path, &mut rng, &mut buffer) {
                Ok(digest) => {
                    events.debug(format!("Wrote {} ({})", path.display(), digest));
                    units.push(UnitRecord {
                        path,
                        digest,
                        len: self.unit_size,
                    });
                    index += 1;
                    events.progress(job.cycle, CyclePhase::Write, index, total);
                }
                Err(e) => {
                    let disk_full = volume.is_disk_full(&e);
                    remove_partial(volume, events, &path);

                    let message = e.to_string();
                    if disk_full && job.target == UnitTarget::UntilFull {
                        events.info(format!(
                            "Cycle {}: volume full after {} units",
                            job.cycle, index
                        ));
                    } else {
                        events.warn(format!(
                            "Cycle {}: write of {} failed: {}",
                            job.cycle,
                            path.display(),
                            message
                        ));
                    }

                    outcome.write_failure = Some(WriteFailure {
                        path,
                        unit_index: index,
                        disk_full,
                        message,
                    });
                    break;
                }
            }
        }

        units
    }

    fn write_unit<V: Volume + ?Sized>(
        &self,
        volume: &V,
        path: &Path,
        rng: &mut StdRng,
        buffer: &mut [u8],
    ) -> io::Result<Digest> {
        let mut writer = volume.create(path)?;
        let mut hasher = DigestBuilder::new();
        let mut remaining = self.unit_size;

        while remaining > 0 {
            let n = remaining.min(buffer.len() as u64) as usize;
            let chunk = &mut buffer[..n];
            rng.fill_bytes(chunk);
            hasher.update(chunk);
            writer.write_all(chunk)?;
            remaining -= n as u64;
        }

        writer.flush()?;
        Ok(hasher.finish())
    }

    fn verify<V: Volume + ?Sized>(
        &self,
        job: &CycleJob<'_>,
        volume: &V,
        policy: &mut dyn MismatchPolicy,
        events: &EventSink,
        units: &[UnitRecord],
        outcome: &mut CycleOutcome,
    ) {
        let total = units.len() as u64;
        let units_written_total = job.units_written_before + total;

        for (k, unit) in units.iter().enumerate() {
            let failure = match self.verifier.recompute(volume, &unit.path) {
                Ok(actual) if actual == unit.digest => None,
                Ok(actual) => {
                    let mismatch = ChecksumMismatch {
                        path: unit.path.clone(),
                        expected: unit.digest,
                        actual,
                        cycle: job.cycle,
                        units_written_total,
                    };
                    events.error(format!(
                        "Checksum mismatch in {} after {} cycles, {} written: expected {}, got {}",
                        unit.path.display(),
                        job.cycle,
                        format_size(units_written_total.saturating_mul(unit.len)),
                        unit.digest,
                        actual
                    ));
                    events.emit(RunEvent::Mismatch(mismatch.clone()));
                    outcome.mismatches.push(mismatch.clone());
                    Some(IntegrityFailure::Mismatch(mismatch))
                }
                Err(e) => {
                    let failure = ReadFailure {
                        path: unit.path.clone(),
                        cycle: job.cycle,
                        message: e.to_string(),
                    };
                    events.error(format!(
                        "Could not read back {}: {}",
                        unit.path.display(),
                        failure.message
                    ));
                    outcome.read_failures.push(failure.clone());
                    Some(IntegrityFailure::Unreadable(failure))
                }
            };

            outcome.units_verified += 1;
            events.progress(job.cycle, CyclePhase::Verify, k as u64 + 1, Some(total));

            if let Some(failure) = failure {
                if policy.decide(failure) == MismatchDecision::Abort {
                    events.warn(format!(
                        "Cycle {}: verification stopped after {} of {} units",
                        job.cycle, outcome.units_verified, total
                    ));
                    outcome.policy_aborted = true;
                    break;
                }
            }
        }
    }
}

/// Remove a unit whose write failed
fn remove_partial<V: Volume + ?Sized>(volume: &V, events: &EventSink, path: &Path) {
    match volume.remove(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => events.warn(format!(
            "Could not remove partial unit {}: {}",
            path.display(),
            e
        )),
    }
}

/// Delete every recorded unit; returns how many deletions failed
fn cleanup<V: Volume + ?Sized>(volume: &V, events: &EventSink, units: &[UnitRecord]) -> u64 {
    let mut failures = 0;
    for unit in units {
        match volume.remove(&unit.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                events.debug(format!("{} already removed", unit.path.display()));
            }
            Err(e) => {
                failures += 1;
                events.warn(format!(
                    "Cleanup failed for {}: {}",
                    unit.path.display(),
                    e
                ));
            }
        }
    }
    failures
}

/// One-line summary of a cycle for logs
pub(crate) fn describe(outcome: &CycleOutcome, unit_size: u64, run_elapsed: Duration) -> String {
    let bytes = outcome.units_written.saturating_mul(unit_size);
    let secs = outcome.write_elapsed.as_secs_f64();
    let speed = if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    };
    format!(
        "Cycle {}: wrote {} units ({}) at {}, cycle took {}, total runtime {}",
        outcome.cycle,
        outcome.units_written,
        format_size(bytes),
        format_speed(speed),
        format_duration(outcome.total_elapsed),
        format_duration(run_elapsed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::digest_bytes;
    use crate::events::Severity;
    use crate::volume::LocalVolume;
    use std::io::Read;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const UNIT: u64 = 64 * 1024;
    const CHUNK: usize = 4096;

    fn job<'a>(dir: &'a Path, target: UnitTarget) -> CycleJob<'a> {
        CycleJob {
            cycle: 1,
            dir,
            prefix: "test_c1",
            target,
            units_written_before: 0,
        }
    }

    fn remaining_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    /// Flips one byte of the named unit the first time it is opened
    struct CorruptingVolume {
        inner: LocalVolume,
        target: String,
    }

    impl Volume for CorruptingVolume {
        fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
            self.inner.create(path)
        }

        fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
            if path.file_name().is_some_and(|n| n == self.target.as_str()) {
                let mut data = std::fs::read(path)?;
                data[0] ^= 0xFF;
                std::fs::write(path, &data)?;
            }
            self.inner.open(path)
        }

        fn remove(&self, path: &Path) -> io::Result<()> {
            self.inner.remove(path)
        }

        fn available_space(&self, dir: &Path) -> crate::Result<u64> {
            self.inner.available_space(dir)
        }
    }

    /// Accepts a fixed number of unit files, then reports the volume full
    struct FillingVolume {
        inner: LocalVolume,
        capacity_units: u64,
        created: Mutex<u64>,
    }

    impl FillingVolume {
        fn new(capacity_units: u64) -> Self {
            Self {
                inner: LocalVolume::new(false),
                capacity_units,
                created: Mutex::new(0),
            }
        }
    }

    impl Volume for FillingVolume {
        fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
            let mut created = self.created.lock().unwrap();
            if *created >= self.capacity_units {
                // Create the file so the partial-write cleanup has work to do.
                std::fs::write(path, b"partial")?;
                return Err(io::Error::new(io::ErrorKind::StorageFull, "no space left"));
            }
            *created += 1;
            self.inner.create(path)
        }

        fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
            self.inner.open(path)
        }

        fn remove(&self, path: &Path) -> io::Result<()> {
            self.inner.remove(path)
        }

        fn available_space(&self, _dir: &Path) -> crate::Result<u64> {
            Ok(0)
        }
    }

    // ========================================================================
    // Generation + verification
    // ========================================================================

    #[test]
    fn test_clean_cycle() {
        let temp_dir = TempDir::new().unwrap();
        let executor = CycleExecutor::new(UNIT, CHUNK);
        let (events, rx) = EventSink::channel();
        let cancel = AtomicBool::new(false);

        let outcome = executor.execute(
            &job(temp_dir.path(), UnitTarget::Count(3)),
            &LocalVolume::new(false),
            &mut AbortOnMismatch,
            &cancel,
            &events,
        );

        assert!(outcome.is_clean());
        assert_eq!(outcome.units_written, 3);
        assert_eq!(outcome.units_verified, 3);
        assert!(!outcome.cancelled);
        assert!(!outcome.policy_aborted);
        assert_eq!(outcome.cleanup_failures, 0);
        assert_eq!(remaining_files(temp_dir.path()), 0);

        let progress: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e {
                RunEvent::Progress {
                    phase,
                    unit_index,
                    unit_total,
                    ..
                } => Some((phase, unit_index, unit_total)),
                _ => None,
            })
            .collect();
        assert_eq!(
            progress,
            vec![
                (CyclePhase::Write, 1, Some(3)),
                (CyclePhase::Write, 2, Some(3)),
                (CyclePhase::Write, 3, Some(3)),
                (CyclePhase::Verify, 1, Some(3)),
                (CyclePhase::Verify, 2, Some(3)),
                (CyclePhase::Verify, 3, Some(3)),
            ]
        );
    }

    #[test]
    fn test_unit_size_not_multiple_of_chunk() {
        let temp_dir = TempDir::new().unwrap();
        let executor = CycleExecutor::new(10_000, CHUNK);

        let outcome = executor.execute(
            &job(temp_dir.path(), UnitTarget::Count(2)),
            &LocalVolume::new(false),
            &mut AbortOnMismatch,
            &AtomicBool::new(false),
            &EventSink::disconnected(),
        );

        assert!(outcome.is_clean());
        assert_eq!(outcome.units_verified, 2);
    }

    #[test]
    fn test_written_digest_matches_file_contents() {
        let temp_dir = TempDir::new().unwrap();
        let executor = CycleExecutor::new(UNIT, CHUNK);
        let path = temp_dir.path().join("unit.bin");
        let mut rng = StdRng::seed_from_u64(7);
        let mut buffer = vec![0u8; CHUNK];

        let digest = executor
            .write_unit(&LocalVolume::new(false), &path, &mut rng, &mut buffer)
            .unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len() as u64, UNIT);
        assert_eq!(digest, digest_bytes(&data));
    }

    #[test]
    fn test_unit_naming() {
        let dir = Path::new("/data");
        let job = job(dir, UnitTarget::Count(1));
        assert_eq!(job.unit_path(0), dir.join("test_c1_0.bin"));
        assert_eq!(job.unit_path(12), dir.join("test_c1_12.bin"));
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    #[test]
    fn test_cancel_before_start_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let executor = CycleExecutor::new(UNIT, CHUNK);

        let outcome = executor.execute(
            &job(temp_dir.path(), UnitTarget::Count(5)),
            &LocalVolume::new(false),
            &mut AbortOnMismatch,
            &AtomicBool::new(true),
            &EventSink::disconnected(),
        );

        assert!(outcome.cancelled);
        assert_eq!(outcome.units_written, 0);
        assert_eq!(outcome.units_verified, 0);
        assert_eq!(remaining_files(temp_dir.path()), 0);
    }

    #[test]
    fn test_cancel_mid_generation_still_verifies_written_units() {
        let temp_dir = TempDir::new().unwrap();
        let executor = CycleExecutor::new(UNIT, CHUNK);
        let (events, rx) = EventSink::channel();
        let cancel = AtomicBool::new(false);

        // Cancel as soon as the second unit has been written.
        let cancelling = CancelAfter {
            inner: LocalVolume::new(false),
            after: 2,
            cancel: &cancel,
            created: Mutex::new(0),
        };

        let outcome = executor.execute(
            &job(temp_dir.path(), UnitTarget::Count(10)),
            &cancelling,
            &mut AbortOnMismatch,
            &cancel,
            &events,
        );

        assert!(outcome.cancelled);
        assert_eq!(outcome.units_written, 2);
        assert_eq!(outcome.units_verified, 2);
        assert!(outcome.is_clean());
        assert_eq!(remaining_files(temp_dir.path()), 0);
        assert!(rx.try_iter().any(|e| matches!(
            e,
            RunEvent::Progress {
                phase: CyclePhase::Verify,
                unit_index: 2,
                ..
            }
        )));
    }

    struct CancelAfter<'a> {
        inner: LocalVolume,
        after: u64,
        cancel: &'a AtomicBool,
        created: Mutex<u64>,
    }

    impl Volume for CancelAfter<'_> {
        fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
            let mut created = self.created.lock().unwrap();
            *created += 1;
            if *created >= self.after {
                self.cancel.store(true, Ordering::SeqCst);
            }
            self.inner.create(path)
        }

        fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
            self.inner.open(path)
        }

        fn remove(&self, path: &Path) -> io::Result<()> {
            self.inner.remove(path)
        }

        fn available_space(&self, dir: &Path) -> crate::Result<u64> {
            self.inner.available_space(dir)
        }
    }

    // ========================================================================
    // Failures
    // ========================================================================

    #[test]
    fn test_single_corruption_yields_one_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let executor = CycleExecutor::new(UNIT, CHUNK);
        let (events, rx) = EventSink::channel();
        let volume = CorruptingVolume {
            inner: LocalVolume::new(false),
            target: "test_c1_1.bin".to_string(),
        };

        let outcome = executor.execute(
            &CycleJob {
                units_written_before: 6,
                ..job(temp_dir.path(), UnitTarget::Count(3))
            },
            &volume,
            &mut ContinueOnMismatch,
            &AtomicBool::new(false),
            &events,
        );

        assert_eq!(outcome.mismatches.len(), 1);
        let mismatch = &outcome.mismatches[0];
        assert_eq!(mismatch.path, temp_dir.path().join("test_c1_1.bin"));
        assert_ne!(mismatch.expected, mismatch.actual);
        assert_eq!(mismatch.cycle, 1);
        assert_eq!(mismatch.units_written_total, 9);
        assert_eq!(outcome.units_verified, 3);
        assert!(!outcome.policy_aborted);
        assert_eq!(remaining_files(temp_dir.path()), 0);

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, RunEvent::Mismatch(_)))
                .count(),
            1
        );
        assert!(events.iter().any(|e| matches!(
            e,
            RunEvent::Log {
                severity: Severity::Error,
                ..
            }
        )));
    }

    #[test]
    fn test_abort_policy_skips_remaining_verification() {
        let temp_dir = TempDir::new().unwrap();
        let executor = CycleExecutor::new(UNIT, CHUNK);
        let volume = CorruptingVolume {
            inner: LocalVolume::new(false),
            target: "test_c1_0.bin".to_string(),
        };

        let outcome = executor.execute(
            &job(temp_dir.path(), UnitTarget::Count(4)),
            &volume,
            &mut AbortOnMismatch,
            &AtomicBool::new(false),
            &EventSink::disconnected(),
        );

        assert!(outcome.policy_aborted);
        assert_eq!(outcome.units_verified, 1);
        assert_eq!(outcome.mismatches.len(), 1);
        // Cleanup still removes every unit.
        assert_eq!(remaining_files(temp_dir.path()), 0);
    }

    #[test]
    fn test_closure_policy_sees_each_failure() {
        let temp_dir = TempDir::new().unwrap();
        let executor = CycleExecutor::new(UNIT, CHUNK);
        let volume = CorruptingVolume {
            inner: LocalVolume::new(false),
            target: "test_c1_2.bin".to_string(),
        };
        let mut seen = Vec::new();

        let outcome = executor.execute(
            &job(temp_dir.path(), UnitTarget::Count(3)),
            &volume,
            &mut |failure: IntegrityFailure| {
                seen.push(failure.path().to_path_buf());
                MismatchDecision::Continue
            },
            &AtomicBool::new(false),
            &EventSink::disconnected(),
        );

        assert_eq!(outcome.mismatches.len(), 1);
        assert_eq!(seen, vec![temp_dir.path().join("test_c1_2.bin")]);
    }

    #[test]
    fn test_unreadable_unit_goes_through_policy() {
        let temp_dir = TempDir::new().unwrap();
        let executor = CycleExecutor::new(UNIT, CHUNK);

        let mut volume = crate::volume::MockVolume::new();
        let local = LocalVolume::new(false);
        volume
            .expect_create()
            .returning(move |p| local.create(p));
        volume
            .expect_open()
            .returning(|_| Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")));
        volume
            .expect_remove()
            .returning(|p| std::fs::remove_file(p));

        let mut decisions = 0;
        let outcome = executor.execute(
            &job(temp_dir.path(), UnitTarget::Count(2)),
            &volume,
            &mut |failure: IntegrityFailure| {
                assert!(matches!(failure, IntegrityFailure::Unreadable(_)));
                decisions += 1;
                MismatchDecision::Continue
            },
            &AtomicBool::new(false),
            &EventSink::disconnected(),
        );

        assert_eq!(decisions, 2);
        assert_eq!(outcome.read_failures.len(), 2);
        assert!(outcome.mismatches.is_empty());
        assert!(!outcome.is_clean());
        assert_eq!(remaining_files(temp_dir.path()), 0);
    }

    #[test]
    fn test_until_full_stops_on_disk_full() {
        let temp_dir = TempDir::new().unwrap();
        let executor = CycleExecutor::new(UNIT, CHUNK);
        let (events, rx) = EventSink::channel();

        let outcome = executor.execute(
            &job(temp_dir.path(), UnitTarget::UntilFull),
            &FillingVolume::new(4),
            &mut AbortOnMismatch,
            &AtomicBool::new(false),
            &events,
        );

        assert_eq!(outcome.units_written, 4);
        assert_eq!(outcome.units_verified, 4);
        let failure = outcome.write_failure.as_ref().unwrap();
        assert!(failure.disk_full);
        assert_eq!(failure.unit_index, 4);
        // The partial file is gone along with every recorded unit.
        assert_eq!(remaining_files(temp_dir.path()), 0);

        let write_totals: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e {
                RunEvent::Progress {
                    phase: CyclePhase::Write,
                    unit_total,
                    ..
                } => Some(unit_total),
                _ => None,
            })
            .collect();
        assert_eq!(write_totals, vec![None; 4]);
    }

    #[test]
    fn test_until_full_zero_units() {
        let temp_dir = TempDir::new().unwrap();
        let executor = CycleExecutor::new(UNIT, CHUNK);

        let outcome = executor.execute(
            &job(temp_dir.path(), UnitTarget::UntilFull),
            &FillingVolume::new(0),
            &mut AbortOnMismatch,
            &AtomicBool::new(false),
            &EventSink::disconnected(),
        );

        assert_eq!(outcome.units_written, 0);
        assert_eq!(outcome.units_verified, 0);
        assert!(outcome.write_failure.is_some());
        assert_eq!(remaining_files(temp_dir.path()), 0);
    }

    #[test]
    fn test_cleanup_failure_is_counted_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let executor = CycleExecutor::new(UNIT, CHUNK);

        let mut volume = crate::volume::MockVolume::new();
        let local = LocalVolume::new(false);
        volume
            .expect_create()
            .returning(move |p| local.create(p));
        volume
            .expect_open()
            .returning(move |p| local.open(p));
        volume
            .expect_remove()
            .returning(|_| Err(io::Error::new(io::ErrorKind::PermissionDenied, "busy")));
        volume.expect_is_disk_full().returning(|_| false);

        let outcome = executor.execute(
            &job(temp_dir.path(), UnitTarget::Count(2)),
            &volume,
            &mut AbortOnMismatch,
            &AtomicBool::new(false),
            &EventSink::disconnected(),
        );

        assert!(outcome.is_clean());
        assert_eq!(outcome.cleanup_failures, 2);
    }

    #[test]
    fn test_describe_outcome() {
        let outcome = CycleOutcome {
            cycle: 2,
            units_written: 4,
            write_elapsed: Duration::from_secs(2),
            total_elapsed: Duration::from_secs(3),
            ..Default::default()
        };
        let line = describe(&outcome, 1024 * 1024, Duration::from_secs(90));
        assert!(line.contains("Cycle 2"));
        assert!(line.contains("4.00 MB"));
        assert!(line.contains("2.0 MB/s"));
        assert!(line.contains("1m 30s"));
    }
}
