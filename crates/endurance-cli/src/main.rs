//! Endurance - fill a drive with random data, verify every byte, repeat
//!
//! # Usage
//!
//! ```bash
//! # Ten cycles of as many 1 GiB units as fit, keeping 2 GiB free
//! endurance run /mnt/ssd --units auto --cycles 10
//!
//! # Fill the drive until it is full, over and over, until Ctrl+C
//! endurance full /mnt/ssd --report wear.csv
//!
//! # SHA-256 of a file
//! endurance checksum unit.bin
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use clap_mangen::Man;
use console::style;
use endurance_core::Settings;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod commands;
mod progress;
mod report;

/// Endurance - write-verify endurance testing for SSDs, SD cards and USB drives
#[derive(Parser)]
#[command(name = "endurance")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Suppress ALL output (mismatch prompts answer "abort")
    #[arg(long, global = true)]
    silent: bool,

    /// Use this configuration file instead of the default one
    #[arg(long, global = true, value_name = "FILE")]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a fixed number of write-verify cycles
    Run {
        #[command(flatten)]
        options: commands::run::RunOptions,

        /// Units per cycle, a number or "auto" to fill up to the safety margin
        #[arg(short = 'n', long, value_name = "N|auto")]
        units: Option<String>,

        /// Number of cycles to run
        #[arg(short, long, value_name = "N")]
        cycles: Option<String>,
    },

    /// Fill the drive until it is full, every cycle, until cancelled
    Full {
        #[command(flatten)]
        options: commands::run::RunOptions,
    },

    /// Calculate the SHA-256 checksum of a file
    Checksum {
        /// File to hash
        file: PathBuf,
    },

    /// Show or initialize the configuration file
    Config {
        /// Create a configuration file with default values
        #[arg(long)]
        init: bool,

        /// Print the configuration file path
        #[arg(long)]
        path: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Generate man pages
    Mangen {
        /// Output directory for man pages
        #[arg(short, long, default_value = ".")]
        out_dir: String,
    },
}

fn main() {
    // Set up panic handler for nicer error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{} {}", style("Error:").red().bold(), panic_info);
    }));

    if let Err(e) = run() {
        eprintln!("{} {}", style("Error:").red().bold(), e);

        // Show cause chain in verbose mode
        if std::env::var("RUST_BACKTRACE").is_ok() {
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  {} {}", style("Caused by:").yellow(), cause);
                source = cause.source();
            }
        }

        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let silent = cli.silent;
    let config_file = cli.config_file.clone().or_else(Settings::config_path);

    // Runs keep a log next to their reports. Settings are read again once
    // logging is up, so problems with the file still get reported.
    let log_dir = match &cli.command {
        Commands::Run { options, .. } | Commands::Full { options } => options
            .log_dir
            .clone()
            .or_else(|| Settings::load_from_path(config_file.clone()).report.directory),
        _ => None,
    };
    let log_file = init_tracing(&cli, log_dir.as_deref())?;
    let settings = Settings::load_from_path(config_file.clone());

    match cli.command {
        Commands::Run {
            options,
            units,
            cycles,
        } => {
            let quiet = cli.quiet || settings.behavior.quiet;
            commands::run::execute(commands::run::RunArgs {
                options,
                mode: commands::run::RunMode::Fixed { units, cycles },
                settings,
                cancel_flag: install_cancel_handler(silent)?,
                log_file,
                quiet,
                silent,
            })
        }
        Commands::Full { options } => {
            let quiet = cli.quiet || settings.behavior.quiet;
            commands::run::execute(commands::run::RunArgs {
                options,
                mode: commands::run::RunMode::Full,
                settings,
                cancel_flag: install_cancel_handler(silent)?,
                log_file,
                quiet,
                silent,
            })
        }
        Commands::Checksum { file } => commands::checksum::execute(&file, silent),
        Commands::Config { init, path, json } => {
            commands::config::execute(commands::config::ConfigArgs {
                init,
                path,
                json,
                silent,
                config_file,
            })
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
        Commands::Mangen { out_dir } => {
            let cmd = Cli::command();
            let out_path = std::path::Path::new(&out_dir);
            std::fs::create_dir_all(out_path)?;

            let man = Man::new(cmd.clone());
            let mut buffer = Vec::new();
            man.render(&mut buffer)?;
            std::fs::write(out_path.join("endurance.1"), buffer)?;
            if !silent {
                println!("Generated: {}/endurance.1", out_dir);
            }

            for subcommand in cmd.get_subcommands() {
                let name = subcommand.get_name();
                // Skip hidden commands and meta commands
                if subcommand.is_hide_set()
                    || name == "completions"
                    || name == "mangen"
                    || name == "help"
                {
                    continue;
                }

                let man = Man::new(subcommand.clone());
                let mut buffer = Vec::new();
                man.render(&mut buffer)?;
                let filename = format!("endurance-{}.1", name);
                std::fs::write(out_path.join(&filename), buffer)?;
                if !silent {
                    println!("Generated: {}/{}", out_dir, filename);
                }
            }

            if !silent {
                println!(
                    "\nInstall with: sudo cp {}/*.1 /usr/local/share/man/man1/",
                    out_dir
                );
            }
            Ok(())
        }
    }
}

/// Set up console logging, plus a plain-text log file in `log_dir` when
/// given. Returns the log file path.
///
/// The file always records at info level (debug with `--verbose`), even
/// when the console is quiet.
fn init_tracing(cli: &Cli, log_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let level = if cli.verbose { "debug" } else { "info" };

    // --silent implies --quiet (no logs at all, not even errors to tracing)
    let console_filter = if cli.quiet || cli.silent {
        EnvFilter::new("off")
    } else {
        EnvFilter::new(level)
    };
    let console = fmt::layer()
        .with_target(false)
        .without_time()
        .with_filter(console_filter);

    let (file_layer, log_path) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let path = dir.join(format!(
                "endurance_{}.log",
                Local::now().format("%Y%m%d_%H%M%S")
            ));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(EnvFilter::new(level));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();

    Ok(log_path)
}

/// Install the Ctrl+C handler and return the "keep running" flag it clears
///
/// A second Ctrl+C exits immediately with status 130.
fn install_cancel_handler(silent: bool) -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        if !r.load(Ordering::SeqCst) {
            // Second Ctrl+C, force exit
            if !silent {
                eprintln!("\n{}", style("Forced exit").red().bold());
            }
            std::process::exit(130);
        }
        r.store(false, Ordering::SeqCst);
        if !silent {
            eprintln!(
                "\n{}",
                style("Cancelling after the current unit... Press Ctrl+C again to force exit")
                    .yellow()
            );
        }
    })?;
    Ok(running)
}
