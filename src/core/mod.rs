//! Core functionality module
//!
//! Configuration, errors, input discovery, naming, the media sink, run
//! summaries and the dispatch from backup type to extractor.
//!
//! # Submodules
//!
//! - `config` - Configuration loading, saving, and management
//! - `error` - Error types and result aliases
//! - `input` - Backup file kinds and input discovery
//! - `naming` - Random names and safe file names
//! - `media` - Writing media files without duplicates or collisions
//! - `summary` - Run summary and progress events
//! - `dispatch` - Backup type to extractor

pub mod config;
pub mod dispatch;
pub mod error;
pub mod input;
pub mod media;
pub mod naming;
pub mod summary;
