//! XML Backup Exporter Library
//!
//! Turns the XML files written by "SMS Backup & Restore" and plain vCard
//! (`.vcf`) contact exports into ordinary files: MMS attachments as media
//! files, messages and call logs as CSV, contact photos/logos/sounds/keys
//! as media files.
//!
//! # Architecture
//!
//! - [`core`] - Configuration, errors, input discovery, naming, the media
//!   sink, run summaries and dispatch
//! - [`backup`] - Streaming readers and extractors for `sms*.xml` and
//!   `calls*.xml`
//! - [`vcard`] - vCard parsing and contact media extraction
//! - [`duplicate`] - SHA-256 content index for dropping repeated payloads
//! - [`cli`] - Command-line interface (only used by the binary)
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use xml_backup_exporter::core::config::Config;
//! use xml_backup_exporter::core::dispatch::{run_extraction, BackupType, RunOptions};
//! use xml_backup_exporter::core::input::discover_inputs;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let backup_type = BackupType::Calls;
//!
//!     let inputs = discover_inputs(Path::new("backups"), backup_type.file_kind())?;
//!     std::fs::create_dir_all("export")?;
//!
//!     let summary = run_extraction(
//!         backup_type,
//!         &inputs,
//!         Path::new("export"),
//!         &config,
//!         RunOptions::default(),
//!     )?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod cli;
pub mod core;
pub mod duplicate;
pub mod vcard;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
