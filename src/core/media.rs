//! Media sink
//!
//! Single place where extracted media reaches the disk. Enforces, for the
//! whole run: unique file names, no zero-length files, and one copy per
//! distinct payload.

use crate::core::error::{ExtractionError, Result};
use crate::core::naming::{
    join_extension, safe_filename, sanitize_filename, split_extension, NameGenerator,
};
use crate::duplicate::{ContentIndex, Lookup};
use log::{debug, trace};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Length of the random suffix added on name collisions
const COLLISION_SUFFIX_LENGTH: usize = 6;

/// Give up renaming after this many collisions in a row
const MAX_COLLISION_ATTEMPTS: usize = 64;

/// Where a media payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSource {
    /// `<part>` of an `<mms>` message
    MmsAttachment,
    /// PHOTO/LOGO/SOUND/KEY property of a vCard
    VcardMultimedia,
}

/// A payload ready to be written
#[derive(Debug, Clone)]
pub struct ExtractedMediaFile {
    /// Proposed file name (sanitized and shortened on write)
    pub filename: String,
    pub bytes: Vec<u8>,
    pub source_kind: MediaSource,
}

/// What happened to a payload handed to the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written to `path`
    Written { path: PathBuf, bytes: u64 },
    /// Identical to the payload already written at this path
    Duplicate(PathBuf),
    /// Zero-length payload, not written
    Empty,
}

/// Writes media files into one output directory
#[derive(Debug)]
pub struct MediaSink {
    output_dir: PathBuf,
    index: ContentIndex,
    names: NameGenerator,
    max_filename_length: usize,
}

impl MediaSink {
    /// Create a sink writing into an existing `output_dir`
    pub fn new(output_dir: &Path, names: NameGenerator, max_filename_length: usize) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            index: ContentIndex::new(),
            names,
            max_filename_length,
        }
    }

    /// Name generator shared with the extractor
    pub fn names(&mut self) -> &mut NameGenerator {
        &mut self.names
    }

    /// Output directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write a payload unless it is empty or already written
    ///
    /// Any failure to create or write the file is fatal for the run.
    pub fn write(&mut self, file: ExtractedMediaFile) -> Result<WriteOutcome> {
        if file.bytes.is_empty() {
            trace!("Dropping empty {:?} payload '{}'", file.source_kind, file.filename);
            return Ok(WriteOutcome::Empty);
        }

        let pending = match self.index.lookup(&file.bytes) {
            Lookup::Duplicate(path) => {
                debug!(
                    "Skipping '{}': same content as {}",
                    file.filename,
                    path.display()
                );
                return Ok(WriteOutcome::Duplicate(path));
            }
            Lookup::New(pending) => pending,
        };

        let mut name = sanitize_filename(&file.filename);
        if split_extension(&name).0.is_empty() {
            let ext = split_extension(&name).1.map(str::to_string);
            name = join_extension(&self.names.random_stem(), ext.as_deref());
        }
        let mut name = safe_filename(&self.output_dir, &name, self.max_filename_length);

        for _ in 0..MAX_COLLISION_ATTEMPTS {
            let path = self.output_dir.join(&name);
            let handle = OpenOptions::new().write(true).create_new(true).open(&path);
            let mut handle = match handle {
                Ok(handle) => handle,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    name = self.collision_name(&name);
                    continue;
                }
                Err(e) => return Err(ExtractionError::write(&path, e)),
            };

            handle
                .write_all(&file.bytes)
                .and_then(|_| handle.flush())
                .map_err(|e| ExtractionError::write(&path, e))?;

            let bytes = file.bytes.len() as u64;
            self.index.insert(pending, path.clone());
            return Ok(WriteOutcome::Written { path, bytes });
        }

        Err(ExtractionError::write(
            self.output_dir.join(&name),
            "too many file name collisions",
        ))
    }

    fn collision_name(&mut self, name: &str) -> String {
        let (stem, ext) = split_extension(name);
        let suffix = self.names.alphanumeric(COLLISION_SUFFIX_LENGTH);
        let renamed = join_extension(&format!("{}-{}", stem, suffix), ext);
        safe_filename(&self.output_dir, &renamed, self.max_filename_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sink(dir: &Path) -> MediaSink {
        MediaSink::new(dir, NameGenerator::seeded(1), 200)
    }

    fn media(name: &str, bytes: &[u8]) -> ExtractedMediaFile {
        ExtractedMediaFile {
            filename: name.to_string(),
            bytes: bytes.to_vec(),
            source_kind: MediaSource::MmsAttachment,
        }
    }

    #[test]
    fn test_write_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = sink(temp_dir.path());

        let outcome = sink.write(media("photo.jpg", b"jpegdata")).unwrap();
        let path = temp_dir.path().join("photo.jpg");
        assert_eq!(
            outcome,
            WriteOutcome::Written {
                path: path.clone(),
                bytes: 8
            }
        );
        assert_eq!(fs::read(&path).unwrap(), b"jpegdata");
    }

    #[test]
    fn test_empty_payload_not_written() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = sink(temp_dir.path());

        assert_eq!(sink.write(media("empty.jpg", b"")).unwrap(), WriteOutcome::Empty);
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_duplicate_payload_written_once() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = sink(temp_dir.path());

        sink.write(media("a.png", b"same")).unwrap();
        let outcome = sink.write(media("b.png", b"same")).unwrap();
        assert_eq!(outcome, WriteOutcome::Duplicate(temp_dir.path().join("a.png")));
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_collision_gets_suffix_and_never_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("photo.jpg"), b"existing").unwrap();
        let mut sink = sink(temp_dir.path());

        let outcome = sink.write(media("photo.jpg", b"new content")).unwrap();
        let WriteOutcome::Written { path, .. } = outcome else {
            panic!("expected a written file");
        };
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("photo-"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), "photo-".len() + COLLISION_SUFFIX_LENGTH + ".jpg".len());
        assert_eq!(fs::read(temp_dir.path().join("photo.jpg")).unwrap(), b"existing");
    }

    #[test]
    fn test_same_name_different_content() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = sink(temp_dir.path());

        sink.write(media("image.gif", b"one")).unwrap();
        sink.write(media("image.gif", b"two")).unwrap();
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_unusable_name_gets_random_stem() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = sink(temp_dir.path());

        let outcome = sink.write(media("...", b"data")).unwrap();
        let WriteOutcome::Written { path, .. } = outcome else {
            panic!("expected a written file");
        };
        assert_eq!(path.file_name().unwrap().len(), 10);
    }

    #[test]
    fn test_missing_directory_is_write_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = sink(&temp_dir.path().join("gone"));

        let err = sink.write(media("a.jpg", b"data")).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, ExtractionError::WriteError { .. }));
    }
}
