//! Orchestrates repeated write-verify cycles
//!
//! Fixed mode (`CycleCount::Count(n)`) runs `n` cycles, sizing each one with
//! the [`CapacityPlanner`]. Full-capacity mode (`CycleCount::Unbounded`)
//! fills the volume until a write fails, verifies, cleans up and starts
//! over until cancelled.
//!
//! Cancellation is cooperative and monotonic: once the flag returned by
//! [`CycleController::cancel_handle`] is set it stays set, and the run stops
//! at the next unit or cycle boundary.

use crate::config::{CycleCount, TestConfig};
use crate::error::{Error, Result};
use crate::events::{EventSink, RunEvent};
use crate::executor::{
    describe, AbortOnMismatch, ChecksumMismatch, CycleExecutor, CycleJob, CycleOutcome,
    MismatchPolicy, ReadFailure, UnitTarget, WriteFailure,
};
use crate::format::{format_duration, format_size};
use crate::planner::CapacityPlanner;
use crate::telemetry::{unix_timestamp, CycleRecord, Telemetry};
use crate::volume::{LocalVolume, Volume};
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    /// Not started
    Idle,
    /// Cycles are executing
    Running,
    /// All requested cycles finished
    Completed,
    /// Stopped by the cancellation flag
    Cancelled,
    /// Stopped by a failure
    Aborted,
}

impl RunPhase {
    /// Whether the run has ended
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::Completed | RunPhase::Cancelled | RunPhase::Aborted
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Idle => "idle",
            RunPhase::Running => "running",
            RunPhase::Completed => "completed",
            RunPhase::Cancelled => "cancelled",
            RunPhase::Aborted => "aborted",
        };
        write!(f, "{}", s)
    }
}

/// Why a run was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The mismatch policy asked to stop after a verification failure
    VerificationFailed,
    /// A unit could not be written
    WriteFailure,
    /// A later cycle found less than one unit of free space
    InsufficientSpace,
    /// Free space could not be queried
    SpaceQueryFailed,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AbortReason::VerificationFailed => "verification failed",
            AbortReason::WriteFailure => "write failure",
            AbortReason::InsufficientSpace => "insufficient space",
            AbortReason::SpaceQueryFailed => "free space query failed",
        };
        write!(f, "{}", s)
    }
}

/// Progress of a run, owned by the controller
#[derive(Debug, Clone)]
pub struct RunState {
    cycle: u64,
    cancel: Arc<AtomicBool>,
    units_written: u64,
    phase: RunPhase,
}

impl RunState {
    fn new() -> Self {
        Self {
            cycle: 0,
            cancel: Arc::new(AtomicBool::new(false)),
            units_written: 0,
            phase: RunPhase::Idle,
        }
    }

    /// Last cycle that started executing (0 before the first)
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Units written since the run started
    pub fn units_written(&self) -> u64 {
        self.units_written
    }

    /// Current phase
    pub fn phase(&self) -> RunPhase {
        self.phase
    }
}

/// Final result of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Session id embedded in unit file names
    pub session: String,
    /// Terminal phase
    pub phase: RunPhase,
    /// Set when `phase` is `Aborted`
    pub abort_reason: Option<AbortReason>,
    /// One record per executed cycle, in order
    pub records: Vec<CycleRecord>,
    /// Every checksum mismatch seen
    pub mismatches: Vec<ChecksumMismatch>,
    /// Every unit that could not be read back
    pub read_failures: Vec<ReadFailure>,
    /// Write failures that ended a cycle's generation
    pub write_failures: Vec<WriteFailure>,
    /// Unit files that could not be deleted
    pub cleanup_failures: u64,
    /// Units written across all cycles
    pub units_written: u64,
    /// Size of each unit
    pub unit_size: u64,
    /// Wall time of the run
    #[serde(rename = "elapsed_secs", with = "crate::telemetry::duration_serde")]
    pub elapsed: Duration,
    /// Unix timestamp when the run ended
    pub finished_at: u64,
}

impl RunReport {
    /// Completed with every unit verified intact
    pub fn is_success(&self) -> bool {
        self.phase == RunPhase::Completed
            && self.mismatches.is_empty()
            && self.read_failures.is_empty()
    }

    /// Bytes written across all cycles
    pub fn bytes_written(&self) -> u64 {
        self.units_written.saturating_mul(self.unit_size)
    }
}

/// Drives a run over a [`Volume`]
pub struct CycleController<V: Volume> {
    config: TestConfig,
    volume: V,
    policy: Box<dyn MismatchPolicy>,
    planner: CapacityPlanner,
    executor: CycleExecutor,
    state: RunState,
    events: EventSink,
    receiver: Option<Receiver<RunEvent>>,
    session: String,
}

impl CycleController<LocalVolume> {
    /// Controller over the local filesystem, syncing as configured
    pub fn local(config: TestConfig) -> Result<Self> {
        let volume = LocalVolume::new(config.sync);
        Self::new(config, volume)
    }
}

impl<V: Volume> CycleController<V> {
    /// Validate `config` and create an idle controller
    ///
    /// The default mismatch policy is [`AbortOnMismatch`].
    pub fn new(config: TestConfig, volume: V) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            planner: CapacityPlanner::new(config.unit_size, config.safety_margin),
            executor: CycleExecutor::from_config(&config),
            config,
            volume,
            policy: Box::new(AbortOnMismatch),
            state: RunState::new(),
            events: EventSink::disconnected(),
            receiver: None,
            session: session_id(),
        })
    }

    /// Replace the mismatch policy
    pub fn with_policy<P: MismatchPolicy + 'static>(mut self, policy: P) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Receiver for run events
    ///
    /// Every call returns a handle to the same queue. The queue is
    /// unbounded: a caller that subscribes and then runs without draining
    /// the receiver holds every event of the run in memory, so drop the
    /// receiver instead of ignoring it.
    pub fn subscribe(&mut self) -> Receiver<RunEvent> {
        if let Some(rx) = &self.receiver {
            return rx.clone();
        }
        let (sink, rx) = EventSink::channel();
        self.events = sink;
        self.receiver = Some(rx.clone());
        rx
    }

    /// Get a handle to cancel the run
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.state.cancel)
    }

    /// Current run state
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Session id embedded in this run's file names
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Configuration being run
    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Resolve the first cycle's unit target without writing anything
    pub fn preflight(&self) -> Result<UnitTarget> {
        match self.config.cycles {
            CycleCount::Unbounded => Ok(UnitTarget::UntilFull),
            CycleCount::Count(_) => self
                .planner
                .plan(&self.volume, &self.config.target_dir, self.config.units)
                .map(UnitTarget::Count),
        }
    }

    /// Run to completion on the calling thread
    ///
    /// Configuration and space problems found before the first write are
    /// returned as errors; everything after that ends up in the report.
    pub fn run(mut self) -> Result<RunReport> {
        let first = self.preflight()?;
        Ok(self.execute(first))
    }

    /// Run on a background worker thread
    pub fn spawn(mut self) -> Result<RunHandle>
    where
        V: 'static,
    {
        let first = self.preflight()?;
        let events = self.subscribe();
        let cancel = self.cancel_handle();

        let worker = std::thread::Builder::new()
            .name("endurance-worker".to_string())
            .spawn(move || self.execute(first))?;

        Ok(RunHandle {
            cancel,
            events,
            worker,
        })
    }

    fn execute(&mut self, first: UnitTarget) -> RunReport {
        let mut telemetry = Telemetry::new();
        let mut next = Some(first);
        let mut mismatches = Vec::new();
        let mut read_failures = Vec::new();
        let mut write_failures = Vec::new();
        let mut cleanup_failures = 0;
        let mut abort_reason = None;
        let mut cancelled = false;

        self.set_phase(RunPhase::Running);
        self.events.info(format!(
            "Starting run {} in {}: {} units of {} per cycle, {} cycles",
            self.session,
            self.config.target_dir.display(),
            if self.config.cycles.is_unbounded() {
                "as many".to_string()
            } else {
                self.config.units.to_string()
            },
            format_size(self.config.unit_size),
            self.config.cycles
        ));

        loop {
            if let CycleCount::Count(n) = self.config.cycles {
                if self.state.cycle >= n {
                    break;
                }
            }
            if self.state.is_cancelled() {
                cancelled = true;
                break;
            }

            let target = match next.take() {
                Some(target) => target,
                None => match self.preflight() {
                    Ok(target) => target,
                    Err(e) => {
                        self.events
                            .error(format!("Cycle {}: {}", self.state.cycle + 1, e));
                        abort_reason = Some(match e {
                            Error::InsufficientSpace { .. } => AbortReason::InsufficientSpace,
                            _ => AbortReason::SpaceQueryFailed,
                        });
                        break;
                    }
                },
            };

            self.state.cycle += 1;
            let outcome = self.run_cycle(target);

            let record = telemetry
                .record_cycle(outcome.cycle, outcome.units_written, outcome.write_elapsed)
                .clone();
            self.events
                .info(describe(&outcome, self.config.unit_size, telemetry.elapsed()));
            self.events.emit(RunEvent::CycleCompleted(record));

            cleanup_failures += outcome.cleanup_failures;
            mismatches.extend(outcome.mismatches);
            read_failures.extend(outcome.read_failures);

            if outcome.policy_aborted {
                abort_reason = Some(AbortReason::VerificationFailed);
            }
            if let Some(failure) = outcome.write_failure {
                let fatal = match self.config.cycles {
                    CycleCount::Count(_) => true,
                    // A volume that accepts nothing for a reason other than
                    // being full would loop forever.
                    CycleCount::Unbounded => outcome.units_written == 0 && !failure.disk_full,
                };
                if fatal && abort_reason.is_none() {
                    abort_reason = Some(AbortReason::WriteFailure);
                }
                write_failures.push(failure);
            }
            if abort_reason.is_some() {
                break;
            }
            if outcome.cancelled {
                cancelled = true;
                break;
            }
        }

        let phase = if abort_reason.is_some() {
            RunPhase::Aborted
        } else if cancelled {
            RunPhase::Cancelled
        } else {
            RunPhase::Completed
        };

        let elapsed = telemetry.elapsed();
        match abort_reason {
            Some(reason) => self.events.error(format!(
                "Run {} aborted ({}) after {} cycles, {} units written",
                self.session, reason, self.state.cycle, self.state.units_written
            )),
            None => self.events.info(format!(
                "Run {} {} after {} cycles: {} written in {}, {} mismatches",
                self.session,
                phase,
                self.state.cycle,
                format_size(self.state.units_written.saturating_mul(self.config.unit_size)),
                format_duration(elapsed),
                mismatches.len()
            )),
        }
        self.set_phase(phase);

        RunReport {
            session: self.session.clone(),
            phase,
            abort_reason,
            records: telemetry.into_records(),
            mismatches,
            read_failures,
            write_failures,
            cleanup_failures,
            units_written: self.state.units_written,
            unit_size: self.config.unit_size,
            elapsed,
            finished_at: unix_timestamp(),
        }
    }

    fn run_cycle(&mut self, target: UnitTarget) -> CycleOutcome {
        let cycle = self.state.cycle;
        let prefix = format!("{}_{}_c{}", self.config.file_prefix, self.session, cycle);
        let job = CycleJob {
            cycle,
            dir: &self.config.target_dir,
            prefix: &prefix,
            target,
            units_written_before: self.state.units_written,
        };

        match target {
            UnitTarget::Count(n) => self
                .events
                .info(format!("Cycle {}: writing {} units", cycle, n)),
            UnitTarget::UntilFull => self
                .events
                .info(format!("Cycle {}: writing until the volume is full", cycle)),
        }

        let outcome = self.executor.execute(
            &job,
            &self.volume,
            self.policy.as_mut(),
            &self.state.cancel,
            &self.events,
        );
        self.state.units_written += outcome.units_written;
        outcome
    }

    fn set_phase(&mut self, phase: RunPhase) {
        self.state.phase = phase;
        self.events.emit(RunEvent::StateChanged(phase));
    }
}

/// Handle to a run executing on a worker thread
pub struct RunHandle {
    cancel: Arc<AtomicBool>,
    events: Receiver<RunEvent>,
    worker: JoinHandle<RunReport>,
}

impl RunHandle {
    /// Request cancellation; the run stops at the next unit boundary
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Shared cancellation flag
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Events from the worker
    pub fn events(&self) -> &Receiver<RunEvent> {
        &self.events
    }

    /// Wait for the run to end
    pub fn join(self) -> Result<RunReport> {
        self.worker
            .join()
            .map_err(|_| Error::Worker("worker thread panicked".to_string()))
    }
}

static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// `{unix_secs:x}-{pid:x}-{seq:x}`; the sequence number separates
/// controllers created by one process within the same second
fn session_id() -> String {
    let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}-{:x}", unix_timestamp(), std::process::id(), seq)
}
