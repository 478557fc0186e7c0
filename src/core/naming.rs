//! File naming helpers
//!
//! Everything that turns untrusted names from a backup (MMS part names,
//! contact names) into file names that are legal, bounded in length, and
//! unique inside the output directory.

use crate::duplicate::{compute_data_hash, hash_to_hex};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

/// Length of generated stand-in names
pub const RANDOM_NAME_LENGTH: usize = 10;

/// Longest full output path we are willing to produce (common Windows limit)
pub const MAX_FULLPATH_LENGTH: usize = 252;

/// Characters kept from the original stem when a name has to be shortened
const SHORT_STEM_CHARS: usize = 50;

/// Hex characters of the content hash used in shortened names
const SHORT_HASH_CHARS: usize = 8;

/// Source of random stand-in names
///
/// Seed it for reproducible output (tests, `--seed`), or draw from OS entropy.
#[derive(Debug)]
pub struct NameGenerator {
    rng: StdRng,
}

impl NameGenerator {
    /// Generator seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic generator
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generator from an optional seed
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    /// Random ASCII alphanumeric string of `len` characters
    pub fn alphanumeric(&mut self, len: usize) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    /// Random ASCII letters only
    pub fn letters(&mut self, len: usize) -> String {
        const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
        (0..len)
            .map(|_| LETTERS[self.rng.gen_range(0..LETTERS.len())] as char)
            .collect()
    }

    /// Standard stand-in stem
    pub fn random_stem(&mut self) -> String {
        self.alphanumeric(RANDOM_NAME_LENGTH)
    }
}

/// Split a file name into stem and extension (without the dot)
///
/// A leading dot does not start an extension (`.hidden` has none).
pub fn split_extension(filename: &str) -> (&str, Option<&str>) {
    match filename.rfind('.') {
        Some(0) | None => (filename, None),
        Some(idx) if idx + 1 == filename.len() => (&filename[..idx], None),
        Some(idx) => (&filename[..idx], Some(&filename[idx + 1..])),
    }
}

/// Join a stem and an optional extension
pub fn join_extension(stem: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !ext.is_empty() => format!("{}.{}", stem, ext),
        _ => stem.to_string(),
    }
}

/// Replace characters that are not allowed in file names
///
/// Path separators, Windows-reserved characters and control characters
/// become `_`; leading/trailing dots and whitespace are trimmed.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    replaced
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

/// Longest prefix of `s` with at most `max_bytes` bytes, on a char boundary
fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Ensure a file name fits the length limits
///
/// A name is kept as-is when it is at most `max_len` bytes and the full path
/// below `base_dir` stays within [`MAX_FULLPATH_LENGTH`]. Otherwise it becomes
/// `{first 50 chars}_{8 hex hash}.{ext}`, and just `{hash}.{ext}` if that is
/// still too long. The extension is always kept.
pub fn safe_filename(base_dir: &Path, filename: &str, max_len: usize) -> String {
    let dir_len = base_dir.as_os_str().len() + 1;
    if filename.len() <= max_len && dir_len + filename.len() <= MAX_FULLPATH_LENGTH {
        return filename.to_string();
    }

    let (stem, extension) = split_extension(filename);
    let hash = hash_to_hex(&compute_data_hash(stem.as_bytes()));
    let hash = &hash[..SHORT_HASH_CHARS];

    let short_stem: String = stem.chars().take(SHORT_STEM_CHARS).collect();
    let shortened = join_extension(&format!("{}_{}", short_stem, hash), extension);
    if shortened.len() <= max_len && dir_len + shortened.len() <= MAX_FULLPATH_LENGTH {
        return shortened;
    }

    let hashed = join_extension(hash, extension);
    if hashed.len() <= max_len {
        hashed
    } else {
        // Pathological extension: keep what fits.
        truncate_bytes(&hashed, max_len.max(SHORT_HASH_CHARS)).to_string()
    }
}
