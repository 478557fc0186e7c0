//! Progress display and console output helpers
//!
//! A spinner fed by the extractors' progress events, plus the small
//! formatting helpers used by the command handlers.

use crate::core::summary::{Progress, ProgressUpdate};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::time::{Duration, Instant};

// ============================================================================
// Styles
// ============================================================================

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷")
}

// ============================================================================
// Console output helpers
// ============================================================================

/// Print a header section with a box
pub fn print_header(title: &str) {
    let width = 68;
    let title_padded = format!("{:^width$}", title, width = width - 4);
    println!();
    println!("╔{}╗", "═".repeat(width - 2));
    println!("║{}║", title_padded);
    println!("╚{}╝", "═".repeat(width - 2));
    println!();
}

/// Print a success message with checkmark
pub fn print_success(msg: &str) {
    println!("  ✓ {}", msg);
}

/// Print an info message with bullet
pub fn print_info(msg: &str) {
    println!("  • {}", msg);
}

/// Print a warning message
pub fn print_warning(msg: &str) {
    println!("  ⚠ {}", msg);
}

// ============================================================================
// Extraction spinner
// ============================================================================

/// Spinner showing the file being read and the records seen so far
pub struct ExtractionSpinner {
    spinner: ProgressBar,
    start_time: Instant,
}

impl ExtractionSpinner {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message("Starting...");

        Self {
            spinner,
            start_time: Instant::now(),
        }
    }

    /// Progress callback that updates this spinner
    pub fn progress(&self) -> Progress {
        let spinner = self.spinner.clone();
        let start_time = self.start_time;

        Progress::new(move |update| match update {
            ProgressUpdate::FileStarted { path, index, total } => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                spinner.set_prefix(format!("[{}/{}] {}", index, total, name));
                spinner.set_message(format!("[{}/{}] {}", index, total, name));
            }
            ProgressUpdate::RecordProcessed { records, written } => {
                spinner.set_message(format!(
                    "{}: {} record(s), {} written ({:.0}s)",
                    spinner.prefix(),
                    records,
                    written,
                    start_time.elapsed().as_secs_f64()
                ));
            }
            ProgressUpdate::FileFinished { path, records } => {
                spinner.suspend(|| {
                    println!("  • {}: {} record(s)", path.display(), records);
                });
            }
        })
    }

    /// Stop and clear the spinner
    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl Default for ExtractionSpinner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Utility functions
// ============================================================================

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

// ============================================================================
// Dual writer for file + console logging
// ============================================================================

/// Writes log output to stderr and a log file
pub struct DualWriter {
    pub console: std::io::Stderr,
    pub file: std::fs::File,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = self.console.write(buf);
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}
