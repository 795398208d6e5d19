//! Cycle record export (JSON and CSV)

use anyhow::{Context, Result};
use endurance_core::{CycleRecord, ReportFormat, ReportSettings};
use std::fs::File;
use std::path::{Path, PathBuf};

/// CSV header, matching the JSON field names
pub const CSV_COLUMNS: [&str; 6] = [
    "cycle",
    "units_written",
    "cycle_duration_secs",
    "throughput_units_per_sec",
    "total_elapsed_secs",
    "timestamp",
];

/// Pick the report format: explicit flag, then file extension, then settings
pub fn resolve_format(
    explicit: Option<ReportFormat>,
    path: Option<&Path>,
    settings: &ReportSettings,
) -> ReportFormat {
    explicit
        .or_else(|| path.and_then(format_from_extension))
        .unwrap_or(settings.format)
}

/// Pick the report path: explicit path, else a session-named file in the
/// configured report directory, else no report
pub fn resolve_path(
    explicit: Option<PathBuf>,
    settings: &ReportSettings,
    session: &str,
    format: ReportFormat,
) -> Option<PathBuf> {
    explicit.or_else(|| {
        settings
            .directory
            .as_ref()
            .map(|dir| dir.join(format!("endurance-{}.{}", session, extension(format))))
    })
}

fn format_from_extension(path: &Path) -> Option<ReportFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "csv" => Some(ReportFormat::Csv),
        "json" => Some(ReportFormat::Json),
        _ => None,
    }
}

fn extension(format: ReportFormat) -> &'static str {
    match format {
        ReportFormat::Json => "json",
        ReportFormat::Csv => "csv",
    }
}

/// Render records as a pretty-printed JSON array
pub fn to_json(records: &[CycleRecord]) -> Result<String> {
    serde_json::to_string_pretty(records).context("Failed to serialize cycle records")
}

/// Render records as CSV with a header row
pub fn to_csv(records: &[CycleRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(CSV_COLUMNS)?;
    for r in records {
        wtr.write_record(csv_row(r))?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to finish CSV output: {}", e.error()))?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

fn csv_row(r: &CycleRecord) -> [String; 6] {
    [
        r.cycle.to_string(),
        r.units_written.to_string(),
        format!("{:.3}", r.cycle_duration.as_secs_f64()),
        format!("{:.3}", r.throughput_units_per_sec),
        format!("{:.3}", r.total_elapsed.as_secs_f64()),
        r.timestamp.to_string(),
    ]
}

fn create_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory {}", parent.display()))?;
    }
    Ok(())
}

/// Write `records` to `path`, creating parent directories
pub fn write_report(path: &Path, format: ReportFormat, records: &[CycleRecord]) -> Result<()> {
    let contents = match format {
        ReportFormat::Json => to_json(records)?,
        ReportFormat::Csv => to_csv(records)?,
    };

    create_parent_dirs(path)?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write report {}", path.display()))?;

    tracing::debug!("Wrote {} cycle records to {:?}", records.len(), path);
    Ok(())
}

enum Sink {
    Csv(csv::Writer<File>),
    Json(Vec<CycleRecord>),
}

/// Report that grows one record per finished cycle
///
/// Every append reaches the file before returning, so a run killed part
/// way through leaves the cycles it finished on disk.
pub struct ReportWriter {
    path: PathBuf,
    format: ReportFormat,
    sink: Sink,
}

impl ReportWriter {
    /// Create (or truncate) the report at `path` and write its empty form
    pub fn create(path: &Path, format: ReportFormat) -> Result<Self> {
        create_parent_dirs(path)?;
        let sink = match format {
            ReportFormat::Csv => {
                let mut wtr = csv::WriterBuilder::new()
                    .from_path(path)
                    .with_context(|| format!("Failed to create report {}", path.display()))?;
                wtr.write_record(CSV_COLUMNS)?;
                wtr.flush()?;
                Sink::Csv(wtr)
            }
            ReportFormat::Json => {
                write_report(path, format, &[])?;
                Sink::Json(Vec::new())
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            format,
            sink,
        })
    }

    /// Report file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add one cycle record to the file
    pub fn append(&mut self, record: &CycleRecord) -> Result<()> {
        match &mut self.sink {
            Sink::Csv(wtr) => {
                wtr.write_record(csv_row(record))?;
                wtr.flush()
                    .with_context(|| format!("Failed to write report {}", self.path.display()))?;
            }
            // A JSON array cannot be extended in place
            Sink::Json(records) => {
                records.push(record.clone());
                write_report(&self.path, self.format, records)?;
            }
        }
        Ok(())
    }

    /// Replace the file with the complete record list of the finished run
    pub fn finish(self, records: &[CycleRecord]) -> Result<()> {
        drop(self.sink);
        write_report(&self.path, self.format, records)
    }
}
