//! Run summary and progress reporting

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// At least one record produced output
    Completed,
    /// The inputs held nothing to export
    EmptyResult,
}

/// An input file that could not be processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Counters and results of one extraction run
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    /// Input files streamed to the end
    pub files_processed: usize,
    /// Input files that could not be opened
    pub failed_inputs: Vec<InputFailure>,
    /// Records (messages, parts, calls, contacts) seen
    pub records_processed: usize,
    /// Rows or media files written
    pub records_written: usize,
    /// Malformed records or properties skipped
    pub parse_errors: usize,
    /// Payloads that failed to decode
    pub decode_errors: usize,
    /// Remote media that could not be fetched
    pub fetch_errors: usize,
    /// Duplicates dropped (payloads or call timestamps)
    pub duplicates: usize,
    /// Zero-length payloads dropped
    pub empty_payloads: usize,
    /// Parts filtered out by mime type
    pub filtered_out: usize,
    /// Bytes of media written
    pub bytes_written: u64,
    /// Media files written, per extension
    pub files_by_extension: BTreeMap<String, usize>,
    /// CSV file written, if any
    pub output_csv: Option<PathBuf>,
    /// Wall time of the run in milliseconds
    pub duration_ms: u64,
    pub outcome: Outcome,
}

impl Default for ExtractionSummary {
    fn default() -> Self {
        Self {
            files_processed: 0,
            failed_inputs: Vec::new(),
            records_processed: 0,
            records_written: 0,
            parse_errors: 0,
            decode_errors: 0,
            fetch_errors: 0,
            duplicates: 0,
            empty_payloads: 0,
            filtered_out: 0,
            bytes_written: 0,
            files_by_extension: BTreeMap::new(),
            output_csv: None,
            duration_ms: 0,
            outcome: Outcome::EmptyResult,
        }
    }
}

impl ExtractionSummary {
    /// Records that produced no output
    pub fn records_skipped(&self) -> usize {
        self.parse_errors + self.decode_errors + self.fetch_errors + self.duplicates
    }

    /// Record a media file written with `extension`
    pub fn add_media(&mut self, extension: &str, bytes: u64) {
        self.records_written += 1;
        self.bytes_written += bytes;
        *self
            .files_by_extension
            .entry(extension.to_ascii_lowercase())
            .or_insert(0) += 1;
    }

    /// Record an input file that could not be opened
    pub fn add_failure(&mut self, path: &Path, message: impl Into<String>) {
        self.failed_inputs.push(InputFailure {
            path: path.to_path_buf(),
            message: message.into(),
        });
    }

    /// Set the outcome from what was produced
    pub fn finish(&mut self, produced_anything: bool) {
        self.outcome = if produced_anything {
            Outcome::Completed
        } else {
            Outcome::EmptyResult
        };
    }

    /// Whether every input failed to open
    pub fn all_inputs_failed(&self) -> bool {
        self.files_processed == 0 && !self.failed_inputs.is_empty()
    }
}

impl std::fmt::Display for ExtractionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Files: {}, Records: {}, Written: {}, Duplicates: {}, Errors: {}, Size: {:.2} MB",
            self.files_processed,
            self.records_processed,
            self.records_written,
            self.duplicates,
            self.parse_errors + self.decode_errors + self.fetch_errors,
            self.bytes_written as f64 / 1_048_576.0
        )
    }
}

/// Progress events emitted while a run streams its inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressUpdate {
    /// Started streaming file `index` (1-based) of `total`
    FileStarted {
        path: PathBuf,
        index: usize,
        total: usize,
    },
    /// One more record handled
    RecordProcessed { records: usize, written: usize },
    /// Finished a file
    FileFinished { path: PathBuf, records: usize },
}

/// Shared progress callback
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Optional callback, invoked only when set
#[derive(Clone, Default)]
pub struct Progress {
    callback: Option<ProgressCallback>,
}

impl Progress {
    /// No reporting
    pub fn none() -> Self {
        Self::default()
    }

    /// Report through `callback`
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    /// Send an update
    pub fn emit(&self, update: ProgressUpdate) {
        if let Some(callback) = &self.callback {
            callback(update);
        }
    }

    /// Convenience for `RecordProcessed`
    pub fn record(&self, summary: &ExtractionSummary) {
        self.emit(ProgressUpdate::RecordProcessed {
            records: summary.records_processed,
            written: summary.records_written,
        });
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}
