//! Input discovery
//!
//! Resolves the user's input path into the ordered list of backup files a
//! run processes.

use crate::core::error::{ExtractionError, Result};
use log::debug;
use serde::Serialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// The three backup file kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BackupKind {
    /// `sms*.xml`: SMS and MMS messages
    Sms,
    /// `calls*.xml`: call log
    Calls,
    /// `*.vcf`: contacts
    Vcf,
}

impl BackupKind {
    /// Required filename prefix (case-sensitive)
    pub fn prefix(&self) -> &'static str {
        match self {
            BackupKind::Sms => "sms",
            BackupKind::Calls => "calls",
            BackupKind::Vcf => "",
        }
    }

    /// Required extension including the dot (case-insensitive)
    pub fn extension(&self) -> &'static str {
        match self {
            BackupKind::Sms | BackupKind::Calls => ".xml",
            BackupKind::Vcf => ".vcf",
        }
    }

    /// Human-readable glob, for messages
    pub fn pattern(&self) -> String {
        format!("{}*{}", self.prefix(), self.extension())
    }

    /// Check whether a file name belongs to this kind
    pub fn matches(&self, file_name: &str) -> bool {
        let ext = self.extension();
        file_name.starts_with(self.prefix())
            && file_name.len() >= ext.len()
            && file_name.is_char_boundary(file_name.len() - ext.len())
            && file_name[file_name.len() - ext.len()..].eq_ignore_ascii_case(ext)
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackupKind::Sms => "SMS/MMS",
            BackupKind::Calls => "call log",
            BackupKind::Vcf => "vCard",
        };
        write!(f, "{}", name)
    }
}

/// One input file of a known kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupFile {
    pub path: PathBuf,
    pub kind: BackupKind,
}

/// Resolve `path` into the sorted list of backup files of `kind`
///
/// A directory is scanned non-recursively; a file must itself match the
/// kind's pattern.
pub fn discover_inputs(path: &Path, kind: BackupKind) -> Result<Vec<BackupFile>> {
    if !path.exists() {
        return Err(ExtractionError::InputNotFound(path.to_path_buf()));
    }

    if path.is_file() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !kind.matches(&name) {
            return Err(ExtractionError::InputPattern {
                path: path.to_path_buf(),
                pattern: kind.pattern(),
            });
        }
        return Ok(vec![BackupFile {
            path: path.to_path_buf(),
            kind,
        }]);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| kind.matches(&e.file_name().to_string_lossy()))
        .map(|e| e.into_path())
        .collect();

    if files.is_empty() {
        return Err(ExtractionError::NoInputFiles {
            path: path.to_path_buf(),
            pattern: kind.pattern(),
        });
    }

    files.sort();
    debug!("Found {} {} file(s) in {}", files.len(), kind, path.display());

    Ok(files
        .into_iter()
        .map(|path| BackupFile { path, kind })
        .collect())
}

/// Expand `~`, make absolute and resolve `.`/`..` lexically
pub fn normalize_path(path: &Path) -> PathBuf {
    let expanded = expand_home(path);

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(expanded),
            Err(_) => expanded,
        }
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn expand_home(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "~" => match dirs::home_dir() {
            Some(home) => home.join(components.as_path()),
            None => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_kind_matching() {
        assert!(BackupKind::Sms.matches("sms-20240101.xml"));
        assert!(BackupKind::Sms.matches("sms.XML"));
        assert!(!BackupKind::Sms.matches("SMS-20240101.xml"));
        assert!(!BackupKind::Sms.matches("calls-20240101.xml"));
        assert!(BackupKind::Calls.matches("calls-1.xml"));
        assert!(!BackupKind::Calls.matches("calls-1.xml.bak"));
        assert!(BackupKind::Vcf.matches("contacts.vcf"));
        assert!(BackupKind::Vcf.matches("Family.VCF"));
        assert!(!BackupKind::Vcf.matches("notes.txt"));
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["sms-2.xml", "sms-1.xml", "calls-1.xml", "sms-notes.txt"] {
            fs::write(temp_dir.path().join(name), "<smses/>").unwrap();
        }
        fs::create_dir(temp_dir.path().join("sms-dir.xml")).unwrap();

        let files = discover_inputs(temp_dir.path(), BackupKind::Sms).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["sms-1.xml", "sms-2.xml"]);
        assert!(files.iter().all(|f| f.kind == BackupKind::Sms));
    }

    #[test]
    fn test_discover_does_not_recurse() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("calls-1.xml"), "<calls/>").unwrap();

        let result = discover_inputs(temp_dir.path(), BackupKind::Calls);
        assert!(matches!(result, Err(ExtractionError::NoInputFiles { .. })));
    }

    #[test]
    fn test_discover_single_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("contacts.vcf");
        fs::write(&path, "").unwrap();

        let files = discover_inputs(&path, BackupKind::Vcf).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, path);

        let result = discover_inputs(&path, BackupKind::Calls);
        assert!(matches!(result, Err(ExtractionError::InputPattern { .. })));
    }

    #[test]
    fn test_discover_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let result = discover_inputs(&temp_dir.path().join("absent"), BackupKind::Sms);
        assert!(matches!(result, Err(ExtractionError::InputNotFound(_))));
    }

    #[test]
    fn test_normalize_path_lexical() {
        let path = normalize_path(Path::new("/data/./backups/../exports/out"));
        assert_eq!(path, PathBuf::from("/data/exports/out"));
    }

    #[test]
    fn test_normalize_relative_is_absolute() {
        let path = normalize_path(Path::new("some/relative/dir"));
        assert!(path.is_absolute());
        assert!(path.ends_with("some/relative/dir"));
    }

    #[test]
    fn test_normalize_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(normalize_path(Path::new("~/exports")), home.join("exports"));
        }
    }
}
