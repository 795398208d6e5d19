//! Progress bar utilities for the CLI

use endurance_core::CyclePhase;
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar for hashing a file of known size
pub fn create_bytes_progress_bar(total: Option<u64>, silent: bool) -> ProgressBar {
    if silent {
        return ProgressBar::hidden();
    }

    let pb = match total {
        Some(t) => ProgressBar::new(t),
        None => ProgressBar::new_spinner(),
    };

    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );

    pb
}

fn unit_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {spinner:.green} {prefix} [{bar:40.cyan/blue}] {pos}/{len} units {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

fn unit_spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("  {spinner:.green} {prefix} {pos} units {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Unit progress for a run
///
/// Switches between a bar and a spinner depending on whether the phase
/// knows its unit total.
pub struct UnitProgress {
    bar: ProgressBar,
    bounded: Option<bool>,
}

impl UnitProgress {
    /// Create the progress display, hidden when `hidden` is set
    pub fn new(hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::no_length()
        };
        Self { bar, bounded: None }
    }

    /// Handle to the underlying bar, for printing above it
    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }

    /// Show that `unit_index` units of `phase` in `cycle` are done
    pub fn update(&mut self, cycle: u64, phase: CyclePhase, unit_index: u64, total: Option<u64>) {
        let bounded = total.is_some();
        if self.bounded != Some(bounded) {
            self.bar.set_style(if bounded {
                unit_bar_style()
            } else {
                unit_spinner_style()
            });
            self.bounded = Some(bounded);
        }

        match total {
            Some(total) => self.bar.set_length(total),
            None => self.bar.unset_length(),
        }
        self.bar.set_prefix(format!("Cycle {} {}", cycle, phase_label(phase)));
        self.bar.set_position(unit_index);
        self.bar.tick();
    }

    /// Set the trailing message
    pub fn set_message(&self, message: String) {
        self.bar.set_message(message);
    }

    /// Print a line above the progress display, or plainly when the
    /// display is hidden
    pub fn println(&self, line: impl AsRef<str>) {
        if self.bar.is_hidden() {
            println!("{}", line.as_ref());
        } else {
            self.bar.println(line);
        }
    }

    /// Remove the progress display
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn phase_label(phase: CyclePhase) -> &'static str {
    match phase {
        CyclePhase::Write => "Writing  ",
        CyclePhase::Verify => "Verifying",
    }
}
