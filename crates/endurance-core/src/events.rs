//! Events sent from the engine to its caller
//!
//! Sending never blocks and never fails: the channel is unbounded and a
//! dropped receiver is ignored. Undrained events stay queued until the
//! receiver is dropped. Log events are mirrored to `tracing` so a
//! library user without a subscriber channel still sees them.

use crate::controller::RunPhase;
use crate::executor::ChecksumMismatch;
use crate::telemetry::CycleRecord;
use crossbeam_channel::{Receiver, Sender};
use std::fmt;

/// Phase of a cycle a progress event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Generating and writing units
    Write,
    /// Reading units back and comparing digests
    Verify,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CyclePhase::Write => write!(f, "write"),
            CyclePhase::Verify => write!(f, "verify"),
        }
    }
}

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Per-unit detail
    Debug,
    /// Cycle boundaries and summaries
    Info,
    /// Recoverable problems
    Warn,
    /// Data integrity failures
    Error,
}

/// Something the engine reports while running
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A unit finished writing or verifying
    Progress {
        /// Current cycle (1-based)
        cycle: u64,
        /// Write or verify
        phase: CyclePhase,
        /// Units done so far in this phase (1-based)
        unit_index: u64,
        /// Total units in this phase, unknown while writing until full
        unit_total: Option<u64>,
    },
    /// Human-readable log line
    Log {
        /// Severity
        severity: Severity,
        /// Message text
        message: String,
    },
    /// A unit failed verification
    Mismatch(ChecksumMismatch),
    /// A cycle finished and was recorded
    CycleCompleted(CycleRecord),
    /// The run changed phase
    StateChanged(RunPhase),
}

/// Non-blocking event sender; a sink without a channel only logs
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<RunEvent>>,
}

impl EventSink {
    /// Sink that only mirrors logs to `tracing`
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// Create a sink and the receiver that observes it
    pub fn channel() -> (Self, Receiver<RunEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx: Some(tx) }, rx)
    }

    /// Send an event
    pub fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone: the caller stopped listening.
            let _ = tx.send(event);
        }
    }

    /// Log a message at `severity` and send it as an event
    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            Severity::Debug => tracing::debug!("{}", message),
            Severity::Info => tracing::info!("{}", message),
            Severity::Warn => tracing::warn!("{}", message),
            Severity::Error => tracing::error!("{}", message),
        }
        self.emit(RunEvent::Log { severity, message });
    }

    /// Log at debug level
    pub fn debug(&self, message: impl Into<String>) {
        self.log(Severity::Debug, message);
    }

    /// Log at info level
    pub fn info(&self, message: impl Into<String>) {
        self.log(Severity::Info, message);
    }

    /// Log at warn level
    pub fn warn(&self, message: impl Into<String>) {
        self.log(Severity::Warn, message);
    }

    /// Log at error level
    pub fn error(&self, message: impl Into<String>) {
        self.log(Severity::Error, message);
    }

    /// Report per-unit progress
    pub fn progress(&self, cycle: u64, phase: CyclePhase, unit_index: u64, unit_total: Option<u64>) {
        self.emit(RunEvent::Progress {
            cycle,
            phase,
            unit_index,
            unit_total,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_delivers_in_order() {
        let (sink, rx) = EventSink::channel();
        sink.progress(1, CyclePhase::Write, 1, Some(2));
        sink.info("cycle 1 started");
        sink.emit(RunEvent::StateChanged(RunPhase::Running));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0],
            RunEvent::Progress {
                cycle: 1,
                phase: CyclePhase::Write,
                unit_index: 1,
                unit_total: Some(2)
            }
        ));
        assert!(matches!(
            &events[1],
            RunEvent::Log { severity: Severity::Info, message } if message == "cycle 1 started"
        ));
        assert!(matches!(
            events[2],
            RunEvent::StateChanged(RunPhase::Running)
        ));
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.warn("nobody is listening");
        sink.progress(1, CyclePhase::Verify, 1, None);
    }

    #[test]
    fn test_disconnected_sink() {
        let sink = EventSink::disconnected();
        sink.error("logged only");
    }

    #[test]
    fn test_clone_shares_channel() {
        let (sink, rx) = EventSink::channel();
        let other = sink.clone();
        sink.debug("a");
        other.debug("b");
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Warn < Severity::Error);
        assert_eq!(CyclePhase::Verify.to_string(), "verify");
    }
}
