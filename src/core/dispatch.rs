//! Extraction dispatch
//!
//! Maps a [`BackupType`] onto the one extractor that handles it and runs
//! it over a resolved input list.

use crate::backup::{CallLogGenerator, MmsMediaExtractor, SmsTextExtractor};
use crate::core::config::Config;
use crate::core::error::{ExtractionError, Result};
use crate::core::input::{BackupFile, BackupKind};
use crate::core::media::MediaSink;
use crate::core::naming::NameGenerator;
use crate::core::summary::{ExtractionSummary, Progress};
use crate::vcard::{ContactsVcardExtractor, DisabledFetcher, Fetcher, HttpFetcher};
use clap::ValueEnum;
use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Instant;

/// What to extract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupType {
    /// Images, videos, audio and PDFs attached to MMS messages
    #[value(name = "sms-mms-media")]
    MediaMms,
    /// SMS and MMS text as `sms_messages.csv`
    #[value(name = "sms-mms-text")]
    TextSms,
    /// Call log as `call_log.csv`
    #[value(name = "calls")]
    Calls,
    /// Contact photos, logos, sounds and keys from vCards
    #[value(name = "vcf")]
    Vcf,
}

impl BackupType {
    /// Kind of input file this type reads
    pub fn file_kind(&self) -> BackupKind {
        match self {
            BackupType::MediaMms | BackupType::TextSms => BackupKind::Sms,
            BackupType::Calls => BackupKind::Calls,
            BackupType::Vcf => BackupKind::Vcf,
        }
    }

    /// Name used on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::MediaMms => "sms-mms-media",
            BackupType::TextSms => "sms-mms-text",
            BackupType::Calls => "calls",
            BackupType::Vcf => "vcf",
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs over every input file of one backup type
pub trait Extractor {
    fn extract(&mut self, inputs: &[BackupFile]) -> Result<ExtractionSummary>;
}

/// Per-run options that are not configuration
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Seed for generated file names; entropy when `None`
    pub seed: Option<u64>,
    pub progress: Progress,
}

/// Build the extractor for `backup_type` and run it
///
/// `output_dir` must exist. Inputs of the wrong kind are ignored with a
/// warning.
pub fn run_extraction(
    backup_type: BackupType,
    inputs: &[BackupFile],
    output_dir: &Path,
    config: &Config,
    options: RunOptions,
) -> Result<ExtractionSummary> {
    if !output_dir.is_dir() {
        return Err(ExtractionError::write(
            output_dir,
            "output directory does not exist",
        ));
    }

    let kind = backup_type.file_kind();
    let inputs: Vec<BackupFile> = inputs
        .iter()
        .filter(|input| {
            let matches = input.kind == kind;
            if !matches {
                warn!(
                    "Ignoring {} input {} for {} extraction",
                    input.kind,
                    input.path.display(),
                    backup_type
                );
            }
            matches
        })
        .cloned()
        .collect();

    info!(
        "Running {} extraction over {} file(s) into {}",
        backup_type,
        inputs.len(),
        output_dir.display()
    );

    let start = Instant::now();
    let names = NameGenerator::new(options.seed);
    let max_len = config.output.max_filename_length;

    let mut extractor: Box<dyn Extractor> = match backup_type {
        BackupType::MediaMms => Box::new(MmsMediaExtractor::new(
            MediaSink::new(output_dir, names, max_len),
            config.media,
            options.progress,
        )),
        BackupType::TextSms => Box::new(SmsTextExtractor::new(output_dir, options.progress)),
        BackupType::Calls => Box::new(CallLogGenerator::new(
            output_dir,
            config.calls.sort_by_timestamp,
            options.progress,
        )),
        BackupType::Vcf => {
            let fetcher: Box<dyn Fetcher> = if config.contacts.fetch_remote {
                Box::new(HttpFetcher::new(
                    config.contacts.fetch_timeout(),
                    config.contacts.connect_timeout(),
                )?)
            } else {
                Box::new(DisabledFetcher)
            };
            Box::new(ContactsVcardExtractor::new(
                MediaSink::new(output_dir, names, max_len),
                fetcher,
                config.contacts.write_index,
                options.progress,
            ))
        }
    };

    let mut summary = extractor.extract(&inputs)?;
    summary.duration_ms = start.elapsed().as_millis() as u64;
    info!("{} extraction finished: {}", backup_type, summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::summary::Outcome;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_file_kinds() {
        assert_eq!(BackupType::MediaMms.file_kind(), BackupKind::Sms);
        assert_eq!(BackupType::TextSms.file_kind(), BackupKind::Sms);
        assert_eq!(BackupType::Calls.file_kind(), BackupKind::Calls);
        assert_eq!(BackupType::Vcf.file_kind(), BackupKind::Vcf);
    }

    #[test]
    fn test_value_names() {
        for backup_type in BackupType::value_variants() {
            let parsed = BackupType::from_str(backup_type.as_str(), false).unwrap();
            assert_eq!(parsed, *backup_type);
        }
        assert!(BackupType::from_str("photos", false).is_err());
    }

    #[test]
    fn test_missing_output_dir() {
        let temp_dir = TempDir::new().unwrap();
        let err = run_extraction(
            BackupType::Calls,
            &[],
            &temp_dir.path().join("nope"),
            &Config::default(),
            RunOptions::default(),
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_calls_dispatch() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("calls-1.xml");
        fs::write(
            &path,
            r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<calls count="1"><call number="5550100" duration="65" date="1451965221740" type="1" contact_name="Ann" /></calls>"#,
        )
        .unwrap();
        let inputs = vec![BackupFile {
            path,
            kind: BackupKind::Calls,
        }];

        let summary = run_extraction(
            BackupType::Calls,
            &inputs,
            temp_dir.path(),
            &Config::default(),
            RunOptions::default(),
        )
        .unwrap();
        assert_eq!(summary.outcome, Outcome::Completed);
        assert_eq!(summary.records_written, 1);
        assert!(temp_dir.path().join("call_log.csv").exists());
    }

    #[test]
    fn test_wrong_kind_inputs_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let inputs = vec![BackupFile {
            path: temp_dir.path().join("contacts.vcf"),
            kind: BackupKind::Vcf,
        }];

        let summary = run_extraction(
            BackupType::TextSms,
            &inputs,
            temp_dir.path(),
            &Config::default(),
            RunOptions {
                seed: Some(1),
                ..RunOptions::default()
            },
        )
        .unwrap();
        assert_eq!(summary.files_processed, 0);
        assert_eq!(summary.outcome, Outcome::EmptyResult);
    }
}
