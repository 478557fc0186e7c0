//! Content index for duplicate detection
//!
//! Tracks every payload written during a run so byte-identical payloads are
//! written only once, using SHA256 for exact matching.
//!
//! # Architecture
//!
//! The index uses a two-tier lookup strategy:
//! 1. **Size Index**: payloads are first grouped by size (O(1) lookup)
//! 2. **Hash Index**: only payloads with matching sizes are hash-compared
//!
//! Hashes are computed lazily. An entry written without ever colliding on
//! size never gets hashed; when a later payload of the same size shows up,
//! the earlier entry is hashed from the file it was written to.
//!
//! The index lives for one run only and is never persisted.

use crate::core::error::{ExtractionError, Result};
use log::{trace, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Buffer size for streaming hash computation (64KB)
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// SHA256 hash represented as a fixed-size array
pub type Sha256Hash = [u8; 32];

/// A recorded payload
#[derive(Debug, Clone)]
struct IndexEntry {
    /// Where the payload was written
    path: PathBuf,
    /// SHA256 of the payload, once known
    hash: Option<Sha256Hash>,
}

/// Run-scoped index of written payloads
#[derive(Debug, Default)]
pub struct ContentIndex {
    entries: Vec<IndexEntry>,
    /// size -> entry indices
    size_index: HashMap<u64, Vec<usize>>,
    /// hash -> entry index (only hashed entries)
    hash_index: HashMap<Sha256Hash, usize>,
}

/// Result of a lookup: either the path of the earlier copy, or a key to
/// record the new payload under
#[derive(Debug)]
pub enum Lookup {
    /// Byte-identical payload already written here
    Duplicate(PathBuf),
    /// Not seen before
    New(PendingEntry),
}

/// Size (and hash, if it had to be computed) of a payload not yet recorded
#[derive(Debug, Clone)]
pub struct PendingEntry {
    size: u64,
    hash: Option<Sha256Hash>,
}

impl ContentIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `data` duplicates a recorded payload
    ///
    /// Earlier entries whose files can no longer be read are treated as
    /// non-matching.
    pub fn lookup(&mut self, data: &[u8]) -> Lookup {
        let size = data.len() as u64;
        let Some(candidates) = self.size_index.get(&size).cloned() else {
            return Lookup::New(PendingEntry { size, hash: None });
        };

        let hash = compute_data_hash(data);

        for idx in candidates {
            if self.entries[idx].hash.is_none() {
                self.hash_entry(idx);
            }
        }

        match self.hash_index.get(&hash) {
            Some(&idx) => {
                let path = self.entries[idx].path.clone();
                trace!("Duplicate payload of {} ({} bytes)", path.display(), size);
                Lookup::Duplicate(path)
            }
            None => Lookup::New(PendingEntry {
                size,
                hash: Some(hash),
            }),
        }
    }

    /// Record a payload that was written to `path`
    pub fn insert(&mut self, pending: PendingEntry, path: PathBuf) {
        let idx = self.entries.len();
        self.size_index.entry(pending.size).or_default().push(idx);
        if let Some(hash) = pending.hash {
            self.hash_index.entry(hash).or_insert(idx);
        }
        self.entries.push(IndexEntry {
            path,
            hash: pending.hash,
        });
    }

    fn hash_entry(&mut self, idx: usize) {
        let path = self.entries[idx].path.clone();
        match compute_file_hash(&path) {
            Ok(hash) => {
                self.entries[idx].hash = Some(hash);
                self.hash_index.entry(hash).or_insert(idx);
            }
            Err(e) => {
                warn!("Could not re-read {} for comparison: {}", path.display(), e);
            }
        }
    }
}

/// Compute SHA256 hash of a file using streaming (memory efficient)
pub fn compute_file_hash(path: &Path) -> Result<Sha256Hash> {
    let file = File::open(path)
        .map_err(|e| ExtractionError::IoError(format!("Failed to open file: {}", e)))?;

    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| ExtractionError::IoError(format!("Failed to read file: {}", e)))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&hasher.finalize());
    Ok(hash)
}

/// Compute SHA256 hash of in-memory data
pub fn compute_data_hash(data: &[u8]) -> Sha256Hash {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&Sha256::digest(data));
    hash
}

/// Convert a hash to a lowercase hex string
pub fn hash_to_hex(hash: &Sha256Hash) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn record(index: &mut ContentIndex, dir: &Path, name: &str, data: &[u8]) -> Option<PathBuf> {
        match index.lookup(data) {
            Lookup::Duplicate(path) => Some(path),
            Lookup::New(pending) => {
                let path = dir.join(name);
                fs::write(&path, data).unwrap();
                index.insert(pending, path);
                None
            }
        }
    }

    #[test]
    fn test_compute_data_hash() {
        let hash = hash_to_hex(&compute_data_hash(b"hello world"));
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_file_hash_matches_data_hash() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("payload.bin");
        let data = vec![7u8; HASH_BUFFER_SIZE * 2 + 13];
        fs::write(&path, &data).unwrap();
        assert_eq!(compute_file_hash(&path).unwrap(), compute_data_hash(&data));
    }

    #[test]
    fn test_identical_payload_detected() {
        let temp_dir = TempDir::new().unwrap();
        let mut index = ContentIndex::new();

        assert!(record(&mut index, temp_dir.path(), "a.jpg", b"same bytes").is_none());
        let dup = record(&mut index, temp_dir.path(), "b.jpg", b"same bytes");
        assert_eq!(dup, Some(temp_dir.path().join("a.jpg")));
        assert_eq!(index.entries.len(), 1);
    }

    #[test]
    fn test_same_size_different_content() {
        let temp_dir = TempDir::new().unwrap();
        let mut index = ContentIndex::new();

        assert!(record(&mut index, temp_dir.path(), "a.bin", b"aaaa").is_none());
        assert!(record(&mut index, temp_dir.path(), "b.bin", b"bbbb").is_none());
        assert_eq!(index.entries.len(), 2);
        // a.bin was hashed from disk when "bbbb" collided on size.
        assert!(index.entries.iter().all(|e| e.hash.is_some()));
    }

    #[test]
    fn test_unique_sizes_never_hashed() {
        let temp_dir = TempDir::new().unwrap();
        let mut index = ContentIndex::new();

        record(&mut index, temp_dir.path(), "a.bin", b"a");
        record(&mut index, temp_dir.path(), "b.bin", b"bb");
        record(&mut index, temp_dir.path(), "c.bin", b"ccc");
        assert!(index.entries.iter().all(|e| e.hash.is_none()));
        assert!(index.hash_index.is_empty());
    }

    #[test]
    fn test_missing_earlier_file_is_not_a_match() {
        let temp_dir = TempDir::new().unwrap();
        let mut index = ContentIndex::new();

        record(&mut index, temp_dir.path(), "a.bin", b"data");
        fs::remove_file(temp_dir.path().join("a.bin")).unwrap();
        assert!(matches!(index.lookup(b"data"), Lookup::New(_)));
    }
}
