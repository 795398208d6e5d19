//! Per-cycle records for reporting
//!
//! The recorder is append-only and does no I/O. Exporting the records is
//! left to the caller; [`CycleRecord`] serializes with its fields in the
//! order a report lists them.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Measurements for one completed cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    /// 1-based cycle index
    pub cycle: u64,
    /// Units written and recorded during the cycle
    pub units_written: u64,
    /// Duration of the write phase
    #[serde(rename = "cycle_duration_secs", with = "duration_serde")]
    pub cycle_duration: Duration,
    /// Units written per second of write phase
    pub throughput_units_per_sec: f64,
    /// Time since the run started, at the end of this cycle
    #[serde(rename = "total_elapsed_secs", with = "duration_serde")]
    pub total_elapsed: Duration,
    /// Unix timestamp (seconds) when the record was taken
    pub timestamp: u64,
}

impl CycleRecord {
    /// Write throughput in bytes per second for units of `unit_size` bytes
    pub fn bytes_per_sec(&self, unit_size: u64) -> u64 {
        (self.throughput_units_per_sec * unit_size as f64) as u64
    }
}

/// Accumulates cycle records for a run
#[derive(Debug)]
pub struct Telemetry {
    started: Instant,
    records: Vec<CycleRecord>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    /// Start recording; elapsed times are measured from now
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Start recording with elapsed times measured from `started`
    pub fn starting_at(started: Instant) -> Self {
        Self {
            started,
            records: Vec::new(),
        }
    }

    /// Append a record for `cycle` and return it
    pub fn record_cycle(
        &mut self,
        cycle: u64,
        units_written: u64,
        write_elapsed: Duration,
    ) -> &CycleRecord {
        let secs = write_elapsed.as_secs_f64();
        let throughput_units_per_sec = if secs > 0.0 {
            units_written as f64 / secs
        } else {
            0.0
        };

        debug_assert!(
            self.records.last().is_none_or(|r| r.cycle < cycle),
            "cycle indices must increase"
        );

        self.records.push(CycleRecord {
            cycle,
            units_written,
            cycle_duration: write_elapsed,
            throughput_units_per_sec,
            total_elapsed: self.started.elapsed(),
            timestamp: unix_timestamp(),
        });
        &self.records[self.records.len() - 1]
    }

    /// Records in cycle order
    pub fn records(&self) -> &[CycleRecord] {
        &self.records
    }

    /// Take ownership of the records
    pub fn into_records(self) -> Vec<CycleRecord> {
        self.records
    }

    /// Time since recording started
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Seconds since the Unix epoch, 0 if the clock is before it
pub(crate) fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Serde helper for Duration
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_cycle_throughput() {
        let mut telemetry = Telemetry::new();
        let record = telemetry.record_cycle(1, 10, Duration::from_secs(5));

        assert_eq!(record.cycle, 1);
        assert_eq!(record.units_written, 10);
        assert_eq!(record.cycle_duration, Duration::from_secs(5));
        assert!((record.throughput_units_per_sec - 2.0).abs() < f64::EPSILON);
        assert!(record.timestamp > 0);
    }

    #[test]
    fn test_record_cycle_zero_duration() {
        let mut telemetry = Telemetry::new();
        let record = telemetry.record_cycle(1, 0, Duration::ZERO);
        assert_eq!(record.throughput_units_per_sec, 0.0);
    }

    #[test]
    fn test_records_are_ordered_and_cumulative() {
        let mut telemetry = Telemetry::new();
        telemetry.record_cycle(1, 3, Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(5));
        telemetry.record_cycle(2, 4, Duration::from_millis(10));

        let records = telemetry.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].cycle, 1);
        assert_eq!(records[1].cycle, 2);
        assert!(records[1].total_elapsed >= records[0].total_elapsed);
        assert!(records[1].timestamp >= records[0].timestamp);
        assert_eq!(records.iter().map(|r| r.units_written).sum::<u64>(), 7);
    }

    #[test]
    fn test_starting_at_counts_from_given_instant() {
        let started = Instant::now() - Duration::from_secs(60);
        let mut telemetry = Telemetry::starting_at(started);
        let record = telemetry.record_cycle(1, 1, Duration::from_secs(1));
        assert!(record.total_elapsed >= Duration::from_secs(60));
    }

    #[test]
    fn test_bytes_per_sec() {
        let mut telemetry = Telemetry::new();
        let record = telemetry.record_cycle(1, 4, Duration::from_secs(2));
        assert_eq!(record.bytes_per_sec(1024 * 1024), 2 * 1024 * 1024);
    }

    #[test]
    fn test_record_serialization_field_order() {
        let record = CycleRecord {
            cycle: 3,
            units_written: 8,
            cycle_duration: Duration::from_millis(2500),
            throughput_units_per_sec: 3.2,
            total_elapsed: Duration::from_secs(30),
            timestamp: 1_700_000_000,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            "{\"cycle\":3,\"units_written\":8,\"cycle_duration_secs\":2.5,\
             \"throughput_units_per_sec\":3.2,\"total_elapsed_secs\":30.0,\
             \"timestamp\":1700000000}"
        );

        let back: CycleRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_into_records() {
        let mut telemetry = Telemetry::default();
        telemetry.record_cycle(1, 2, Duration::from_secs(1));
        let records = telemetry.into_records();
        assert_eq!(records.len(), 1);
    }
}
