//! Error types for the backup exporter
//!
//! Errors fall into a few classes with different propagation rules:
//! input errors end the run only when the input path itself is unusable,
//! record-level parse/decode/fetch errors never escape their record, and
//! write errors always end the run.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the backup exporter
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The input path does not exist
    #[error("Input path does not exist: {}", .0.display())]
    InputNotFound(PathBuf),

    /// A single input file does not match the backup kind's filename pattern
    #[error("Input file '{}' does not match expected pattern (should be '{pattern}')", .path.display())]
    InputPattern { path: PathBuf, pattern: String },

    /// The input directory holds no file matching the backup kind
    #[error("No backup files found in '{}' (expected files matching '{pattern}')", .path.display())]
    NoInputFiles { path: PathBuf, pattern: String },

    /// An input file could not be opened or read
    #[error("Failed to read input '{}': {message}", .path.display())]
    InputError { path: PathBuf, message: String },

    /// A record or property is malformed
    #[error("Malformed record: {0}")]
    Parse(String),

    /// An encoded payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// A remote resource could not be fetched
    #[error("Fetch failed for '{url}': {message}")]
    Fetch { url: String, message: String },

    /// An output file could not be written
    #[error("Failed to write '{}': {message}", .path.display())]
    WriteError { path: PathBuf, message: String },

    /// General I/O error
    #[error("IO error: {0}")]
    IoError(String),
}

impl ExtractionError {
    /// Whether this error must terminate the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExtractionError::WriteError { .. }
                | ExtractionError::IoError(_)
                | ExtractionError::InputNotFound(_)
                | ExtractionError::InputPattern { .. }
                | ExtractionError::NoInputFiles { .. }
        )
    }

    /// Build a write error for `path`
    pub fn write(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        ExtractionError::WriteError {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ExtractionError>;

impl From<std::io::Error> for ExtractionError {
    fn from(err: std::io::Error) -> Self {
        ExtractionError::IoError(err.to_string())
    }
}
