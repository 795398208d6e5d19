//! Run command - fixed-count and full-capacity write-verify runs

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use console::style;
use dialoguer::Confirm;
use endurance_core::{
    format_duration, format_size, format_speed, parse_size, AbortOnMismatch, ContinueOnMismatch,
    CycleController, CycleCount, IntegrityFailure, MismatchAction, MismatchDecision,
    MismatchPolicy, ReportFormat, RunEvent, RunPhase, RunReport, Settings, TestConfig, UnitCount,
};
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::progress::UnitProgress;
use crate::report;

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

/// Reaction to a unit that fails verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnMismatch {
    /// Ask whether to keep going
    Prompt,
    /// Stop the run
    Abort,
    /// Keep going and report at the end
    Continue,
}

impl From<OnMismatch> for MismatchAction {
    fn from(value: OnMismatch) -> Self {
        match value {
            OnMismatch::Prompt => MismatchAction::Prompt,
            OnMismatch::Abort => MismatchAction::Abort,
            OnMismatch::Continue => MismatchAction::Continue,
        }
    }
}

/// Report file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormatArg {
    /// JSON array of cycle records
    Json,
    /// CSV with a header row
    Csv,
}

impl From<ReportFormatArg> for ReportFormat {
    fn from(value: ReportFormatArg) -> Self {
        match value {
            ReportFormatArg::Json => ReportFormat::Json,
            ReportFormatArg::Csv => ReportFormat::Csv,
        }
    }
}

/// Options shared by `run` and `full`
///
/// Anything left unset falls back to the configuration file.
#[derive(Debug, Args)]
pub struct RunOptions {
    /// Directory on the drive under test
    pub dir: PathBuf,

    /// Size of each unit file (e.g., 1G, 512M)
    #[arg(short = 's', long, value_name = "SIZE")]
    pub unit_size: Option<String>,

    /// Free space to leave on the drive (e.g., 2G, 0)
    #[arg(short, long, value_name = "SIZE")]
    pub margin: Option<String>,

    /// Read/write chunk size, a power of two between 4K and 64M
    #[arg(long, value_name = "SIZE")]
    pub chunk_size: Option<String>,

    /// Do not flush unit data to the device before reading it back
    #[arg(long)]
    pub no_sync: bool,

    /// What to do when a unit fails verification
    #[arg(long, value_enum)]
    pub on_mismatch: Option<OnMismatch>,

    /// Write per-cycle records to this file
    #[arg(short, long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Report format (defaults to the file extension, then the config file)
    #[arg(long, value_enum)]
    pub report_format: Option<ReportFormatArg>,

    /// Keep a timestamped log of the run in this directory
    /// (defaults to the configured report directory)
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

/// How many units and cycles to run
#[derive(Debug)]
pub enum RunMode {
    /// A fixed number of cycles
    Fixed {
        /// Units per cycle override
        units: Option<String>,
        /// Cycle count override
        cycles: Option<String>,
    },
    /// Fill the drive every cycle until cancelled
    Full,
}

/// Arguments for the run and full commands
pub struct RunArgs {
    /// Shared options
    pub options: RunOptions,
    /// Fixed or full-capacity
    pub mode: RunMode,
    /// Loaded configuration file
    pub settings: Settings,
    /// Cleared by the Ctrl+C handler
    pub cancel_flag: Arc<AtomicBool>,
    /// Log file receiving this run's tracing output
    pub log_file: Option<PathBuf>,
    /// Hide progress
    pub quiet: bool,
    /// Suppress all output
    pub silent: bool,
}

/// Build the run configuration: configuration file first, flags on top
pub fn build_config(options: &RunOptions, mode: &RunMode, settings: &Settings) -> Result<TestConfig> {
    let mut config = settings.to_test_config(&options.dir)?;

    if let Some(size) = &options.unit_size {
        config = config.unit_size(parse_size(size)?);
    }
    if let Some(margin) = &options.margin {
        config = config.safety_margin(parse_size(margin)?);
    }
    if let Some(chunk) = &options.chunk_size {
        let chunk = usize::try_from(parse_size(chunk)?)
            .with_context(|| format!("Chunk size too large: {}", chunk))?;
        config = config.chunk_size(chunk);
    }
    if options.no_sync {
        config = config.sync(false);
    }

    match mode {
        RunMode::Fixed { units, cycles } => {
            if let Some(units) = units {
                config = config.units(units.parse::<UnitCount>()?);
            }
            if let Some(cycles) = cycles {
                let cycles = cycles.parse::<CycleCount>()?;
                if cycles.is_unbounded() {
                    bail!("Use 'endurance full' for an unbounded run");
                }
                config = config.cycles(cycles);
            }
            if config.cycles.is_unbounded() {
                bail!("The configuration file asks for unbounded cycles; use 'endurance full'");
            }
        }
        RunMode::Full => {
            config = config.cycles(CycleCount::Unbounded);
        }
    }

    Ok(config)
}

/// Asks the operator on the terminal; any prompt failure means abort
struct PromptOnMismatch {
    progress: ProgressBar,
}

impl MismatchPolicy for PromptOnMismatch {
    fn decide(&mut self, failure: IntegrityFailure) -> MismatchDecision {
        let what = match &failure {
            IntegrityFailure::Mismatch(m) => format!(
                "Checksum mismatch in {} (cycle {})",
                m.path.display(),
                m.cycle
            ),
            IntegrityFailure::Unreadable(r) => format!(
                "Could not read back {} (cycle {}): {}",
                r.path.display(),
                r.cycle,
                r.message
            ),
        };

        let answer = self.progress.suspend(|| {
            eprintln!("\n{} {}", style("✗").red().bold(), what);
            Confirm::new()
                .with_prompt("Continue the run?")
                .default(false)
                .interact()
        });

        match answer {
            Ok(true) => MismatchDecision::Continue,
            Ok(false) => MismatchDecision::Abort,
            Err(e) => {
                tracing::warn!("Mismatch prompt failed, aborting: {}", e);
                MismatchDecision::Abort
            }
        }
    }
}

/// Execute the run or full command
pub fn execute(args: RunArgs) -> Result<()> {
    let silent = args.silent;
    let config = build_config(&args.options, &args.mode, &args.settings)?;

    let action = args
        .options
        .on_mismatch
        .map(MismatchAction::from)
        .unwrap_or(args.settings.behavior.on_mismatch);
    // Nobody to ask
    let action = if silent && action == MismatchAction::Prompt {
        MismatchAction::Abort
    } else {
        action
    };

    println_if!(
        silent,
        "{} {}",
        style("Target:").bold(),
        style(config.target_dir.display()).cyan()
    );
    match config.cycles {
        CycleCount::Unbounded => println_if!(
            silent,
            "  Mode: fill until full, {} units, until cancelled",
            format_size(config.unit_size)
        ),
        CycleCount::Count(n) => println_if!(
            silent,
            "  Mode: {} x {} units per cycle, {} cycles",
            config.units,
            format_size(config.unit_size),
            n
        ),
    }
    println_if!(silent, "  Safety margin: {}", format_size(config.safety_margin));
    if let Some(log_file) = &args.log_file {
        println_if!(silent, "  Log: {}", log_file.display());
    }

    let mut progress = UnitProgress::new(args.quiet || silent);
    let controller = CycleController::local(config)?;
    let session = controller.session().to_string();
    let unit_size = controller.config().unit_size;

    let controller = match action {
        MismatchAction::Abort => controller.with_policy(AbortOnMismatch),
        MismatchAction::Continue => controller.with_policy(ContinueOnMismatch),
        MismatchAction::Prompt => controller.with_policy(PromptOnMismatch {
            progress: progress.bar().clone(),
        }),
    };

    let handle = controller.spawn()?;
    println_if!(silent, "  Session: {}\n", session);

    let format = report::resolve_format(
        args.options.report_format.map(ReportFormat::from),
        args.options.report.as_deref(),
        &args.settings.report,
    );
    let mut report_writer = match report::resolve_path(
        args.options.report.clone(),
        &args.settings.report,
        &session,
        format,
    ) {
        Some(path) => match report::ReportWriter::create(&path, format) {
            Ok(writer) => Some(writer),
            Err(e) => {
                handle.cancel();
                let _ = handle.join();
                return Err(e);
            }
        },
        None => None,
    };

    // Connect cancel flag
    let worker_cancel = handle.cancel_handle();
    let finished = Arc::new(AtomicBool::new(false));
    let cancel_flag = args.cancel_flag.clone();
    let finished_for_thread = finished.clone();
    std::thread::spawn(move || {
        while cancel_flag.load(Ordering::SeqCst) {
            if finished_for_thread.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        worker_cancel.store(true, Ordering::SeqCst);
    });

    for event in handle.events().iter() {
        match event {
            RunEvent::Progress {
                cycle,
                phase,
                unit_index,
                unit_total,
            } => progress.update(cycle, phase, unit_index, unit_total),
            RunEvent::CycleCompleted(record) => {
                if let Some(writer) = report_writer.as_mut() {
                    if let Err(e) = writer.append(&record) {
                        tracing::warn!(
                            "Could not append cycle {} to the report: {:#}",
                            record.cycle,
                            e
                        );
                    }
                }
                if !silent {
                    progress.println(format!(
                        "  {} Cycle {}: {} units in {} ({})",
                        style("✓").green(),
                        record.cycle,
                        record.units_written,
                        format_duration(record.cycle_duration),
                        format_speed(record.bytes_per_sec(unit_size))
                    ));
                }
                progress.set_message(format!(
                    "last cycle {}",
                    format_speed(record.bytes_per_sec(unit_size))
                ));
            }
            RunEvent::Mismatch(m) => {
                // The prompt already shows it
                if !silent && action != MismatchAction::Prompt {
                    progress.println(format!(
                        "  {} {}: expected {}, read {}",
                        style("✗").red(),
                        m.path.display(),
                        m.expected,
                        m.actual
                    ));
                }
            }
            RunEvent::StateChanged(phase) => tracing::debug!("Run is now {}", phase),
            // Already written by the engine's tracing mirror
            RunEvent::Log { .. } => {}
        }
    }

    finished.store(true, Ordering::SeqCst);
    progress.finish();
    let report = handle.join()?;

    if let Some(writer) = report_writer {
        let path = writer.path().to_path_buf();
        writer.finish(&report.records)?;
        println_if!(
            silent,
            "{} Report written to {}",
            style("ℹ").blue(),
            path.display()
        );
    }

    print_summary(&report, silent);

    let failures = report.mismatches.len() + report.read_failures.len();
    match report.phase {
        RunPhase::Aborted => {
            let reason = report
                .abort_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            bail!("Run aborted: {}", reason);
        }
        _ if failures > 0 => bail!("{} unit(s) failed verification", failures),
        RunPhase::Cancelled => {
            println_if!(silent, "\n{}", style("Run cancelled by user.").yellow());
            Ok(())
        }
        _ => Ok(()),
    }
}

fn print_summary(report: &RunReport, silent: bool) {
    if silent {
        return;
    }

    println!();
    println!("{}", style("Summary").bold());
    println!("  Cycles:     {}", report.records.len());
    println!(
        "  Written:    {} ({} units)",
        format_size(report.bytes_written()),
        report.units_written
    );
    println!("  Runtime:    {}", format_duration(report.elapsed));

    if report.mismatches.is_empty() && report.read_failures.is_empty() {
        println!("  Integrity:  {}", style("all units verified").green());
    } else {
        println!(
            "  Integrity:  {}",
            style(format!(
                "{} mismatches, {} unreadable",
                report.mismatches.len(),
                report.read_failures.len()
            ))
            .red()
            .bold()
        );
        for m in &report.mismatches {
            println!(
                "    {} cycle {}, after {} written",
                m.path.display(),
                m.cycle,
                format_size(m.units_written_total.saturating_mul(report.unit_size))
            );
        }
        for r in &report.read_failures {
            println!("    {} cycle {}: {}", r.path.display(), r.cycle, r.message);
        }
    }

    if report.cleanup_failures > 0 {
        println!(
            "  {} {} unit files could not be deleted",
            style("Warning:").yellow(),
            report.cleanup_failures
        );
    }
}
