//! CLI module for the backup exporter
//!
//! # Submodules
//!
//! - `args` - Command-line argument definitions using clap
//! - `commands` - Command handler implementations
//! - `progress` - Progress spinner and CLI output utilities

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{Args, Commands};
pub use commands::run_command;
pub use progress::DualWriter;
