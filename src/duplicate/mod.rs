//! Duplicate detection module
//!
//! Exact-match (SHA256) detection of payloads already written in this run.
//!
//! # Submodules
//!
//! - `detector` - Run-scoped content index

pub mod detector;

pub use detector::{compute_data_hash, hash_to_hex, ContentIndex, Lookup};
