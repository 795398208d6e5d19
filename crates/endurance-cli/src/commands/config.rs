//! Configuration file management command

use anyhow::{Context, Result};
use console::style;
use endurance_core::{MismatchAction, ReportFormat, Settings};
use std::path::PathBuf;

/// Arguments for the config command
pub struct ConfigArgs {
    /// Initialize a new configuration file with defaults
    pub init: bool,
    /// Show the path to the configuration file
    pub path: bool,
    /// Show configuration in JSON format
    pub json: bool,
    /// Suppress output (for scripting)
    pub silent: bool,
    /// Configuration file to use (default location when `None`)
    pub config_file: Option<PathBuf>,
}

/// Execute the config command
pub fn execute(args: ConfigArgs) -> Result<()> {
    let config_path = args.config_file;

    if args.path {
        if let Some(path) = &config_path {
            if !args.silent {
                println!("{}", path.display());
            }
        } else if !args.silent {
            eprintln!("{}", style("Could not determine config path").yellow());
        }
        return Ok(());
    }

    if args.init {
        return init_config(config_path, args.silent);
    }

    show_config(config_path, args.json, args.silent)
}

/// Initialize a new configuration file with default values
fn init_config(config_path: Option<PathBuf>, silent: bool) -> Result<()> {
    let path = config_path.context("Could not determine configuration directory")?;

    if path.exists() {
        if !silent {
            eprintln!(
                "{} Configuration file already exists at: {}",
                style("Warning:").yellow(),
                path.display()
            );
            eprintln!("Use a text editor to modify it, or delete it to re-initialize.");
        }
        return Ok(());
    }

    let saved_path = Settings::default()
        .save_to_path(Some(path))
        .context("Failed to save configuration file")?;

    if !silent {
        println!(
            "{} Created configuration file at: {}",
            style("Success:").green(),
            saved_path.display()
        );
        println!();
        println!("You can edit this file to customize default settings.");
        println!("Example settings:");
        println!();
        println!("  [run]");
        println!("  unit_size = \"1G\"      # Size of each unit file");
        println!("  units = \"auto\"        # Fill up to the safety margin");
        println!("  safety_margin = \"2G\"  # Space left free");
        println!();
        println!("  [behavior]");
        println!("  on_mismatch = \"abort\" # prompt, abort or continue");
        println!();
        println!("  [report]");
        println!("  format = \"csv\"");
    }

    Ok(())
}

fn mismatch_name(action: MismatchAction) -> &'static str {
    match action {
        MismatchAction::Prompt => "prompt",
        MismatchAction::Abort => "abort",
        MismatchAction::Continue => "continue",
    }
}

fn format_name(format: ReportFormat) -> &'static str {
    match format {
        ReportFormat::Json => "json",
        ReportFormat::Csv => "csv",
    }
}

/// Show the current configuration
fn show_config(config_path: Option<PathBuf>, json: bool, silent: bool) -> Result<()> {
    if silent {
        return Ok(());
    }

    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let settings = Settings::load_from_path(config_path.clone());

    if json {
        let json_output = serde_json::to_string_pretty(&settings)
            .context("Failed to serialize settings to JSON")?;
        println!("{}", json_output);
        return Ok(());
    }

    println!("{}", style("Endurance Configuration").bold());
    println!();

    if let Some(path) = &config_path {
        if config_exists {
            println!("  {} {}", style("Config file:").dim(), path.display());
        } else {
            println!(
                "  {} {} {}",
                style("Config file:").dim(),
                path.display(),
                style("(not found, using defaults)").yellow()
            );
        }
    }
    println!();

    let run = &settings.run;
    println!("{}", style("[run]").cyan());
    println!("  unit_size = \"{}\"", run.unit_size);
    println!("  units = \"{}\"", run.units);
    println!("  cycles = \"{}\"", run.cycles);
    println!("  safety_margin = \"{}\"", run.safety_margin);
    println!("  chunk_size = \"{}\"", run.chunk_size);
    println!("  sync = {}", run.sync);
    println!("  file_prefix = \"{}\"", run.file_prefix);
    println!();

    println!("{}", style("[behavior]").cyan());
    println!(
        "  on_mismatch = \"{}\"",
        mismatch_name(settings.behavior.on_mismatch)
    );
    println!("  quiet = {}", settings.behavior.quiet);
    println!();

    println!("{}", style("[report]").cyan());
    println!("  format = \"{}\"", format_name(settings.report.format));
    if let Some(dir) = &settings.report.directory {
        println!("  directory = \"{}\"", dir.display());
    }

    if !config_exists {
        println!();
        println!(
            "{}",
            style("Run 'endurance config --init' to create a configuration file.").dim()
        );
    }

    Ok(())
}
