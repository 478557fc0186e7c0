//! Contact media extraction
//!
//! Streams `.vcf` files contact by contact and writes every PHOTO, LOGO,
//! SOUND and KEY property as a media file named after the contact. A
//! failing property is counted and skipped; the rest of the contact and
//! the rest of the file are still processed.

use super::fetch::Fetcher;
use super::fields;
use super::multimedia::resolve;
use super::parser::{parse_block, ContactRecord, VcfReader};
use crate::core::dispatch::Extractor;
use crate::core::error::{ExtractionError, Result};
use crate::core::input::BackupFile;
use crate::core::media::{ExtractedMediaFile, MediaSink, MediaSource, WriteOutcome};
use crate::core::naming::RANDOM_NAME_LENGTH;
use crate::core::summary::{ExtractionSummary, Progress, ProgressUpdate};
use log::{debug, info, warn};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Name of the optional contact index
pub const CONTACTS_INDEX_FILE: &str = "contacts.csv";

pub const CONTACTS_INDEX_HEADER: [&str; 8] = [
    "Contact Name",
    "Organization",
    "Phones",
    "Emails",
    "Addresses",
    "Categories",
    "Geo",
    "Media Files",
];

/// Read buffer for `.vcf` inputs
const VCF_BUFFER_SIZE: usize = 256 * 1024;

/// Extracts contact media from vCard files
pub struct ContactsVcardExtractor {
    sink: MediaSink,
    fetcher: Box<dyn Fetcher>,
    progress: Progress,
    write_index: bool,
    index: Option<(csv::Writer<File>, PathBuf)>,
}

impl ContactsVcardExtractor {
    pub fn new(
        sink: MediaSink,
        fetcher: Box<dyn Fetcher>,
        write_index: bool,
        progress: Progress,
    ) -> Self {
        Self {
            sink,
            fetcher,
            progress,
            write_index,
            index: None,
        }
    }

    fn open_index(&mut self) -> Result<Option<PathBuf>> {
        if !self.write_index {
            return Ok(None);
        }
        let path = self.sink.output_dir().join(CONTACTS_INDEX_FILE);
        let mut writer =
            csv::Writer::from_path(&path).map_err(|e| ExtractionError::write(&path, e))?;
        writer
            .write_record(CONTACTS_INDEX_HEADER)
            .map_err(|e| ExtractionError::write(&path, e))?;
        self.index = Some((writer, path.clone()));
        Ok(Some(path))
    }

    fn close_index(&mut self) -> Result<()> {
        if let Some((mut writer, path)) = self.index.take() {
            writer
                .flush()
                .map_err(|e| ExtractionError::write(&path, e))?;
        }
        Ok(())
    }

    fn process_file(&mut self, input: &BackupFile, summary: &mut ExtractionSummary) -> Result<bool> {
        let file = match File::open(&input.path) {
            Ok(file) => file,
            Err(e) => {
                let err = ExtractionError::InputError {
                    path: input.path.clone(),
                    message: e.to_string(),
                };
                warn!("Skipping input: {}", err);
                summary.add_failure(&input.path, err.to_string());
                return Ok(false);
            }
        };

        let reader = VcfReader::new(BufReader::with_capacity(VCF_BUFFER_SIZE, file));
        for block in reader {
            let block = match block {
                Ok(block) => block,
                Err(e) => {
                    warn!("Stopped reading {}: {}", input.path.display(), e);
                    summary.parse_errors += 1;
                    break;
                }
            };

            let parsed = parse_block(&block);
            for warning in &parsed.warnings {
                warn!("{}: {}", input.path.display(), warning);
            }
            summary.parse_errors += parsed.warnings.len();
            summary.records_processed += 1;

            self.process_contact(&parsed.contact, summary)?;
            self.progress.record(summary);
        }
        Ok(true)
    }

    fn process_contact(
        &mut self,
        contact: &ContactRecord,
        summary: &mut ExtractionSummary,
    ) -> Result<()> {
        let display_name = contact.display_name();
        let label = display_name.as_deref().unwrap_or("(unnamed contact)");
        let mut media_files = Vec::new();

        for property in contact.multimedia() {
            let media = match resolve(property, self.fetcher.as_ref()) {
                Ok(media) => media,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Skipping {} of {}: {}", property.name, label, e);
                    match e {
                        ExtractionError::Decode(_) => summary.decode_errors += 1,
                        ExtractionError::Fetch { .. } => summary.fetch_errors += 1,
                        _ => summary.parse_errors += 1,
                    }
                    continue;
                }
            };

            let stem = match display_name.as_deref() {
                Some(name) => name.to_string(),
                None => self.sink.names().alphanumeric(RANDOM_NAME_LENGTH),
            };
            let outcome = self.sink.write(ExtractedMediaFile {
                filename: format!("{}.{}", stem, media.extension),
                bytes: media.bytes,
                source_kind: MediaSource::VcardMultimedia,
            })?;

            match outcome {
                WriteOutcome::Written { path, bytes } => {
                    debug!("Wrote {} of {} to {}", property.name, label, path.display());
                    summary.add_media(&media.extension, bytes);
                    media_files.push(file_name(&path));
                }
                WriteOutcome::Duplicate(path) => {
                    debug!("{} of {} duplicates {}", property.name, label, path.display());
                    summary.duplicates += 1;
                    media_files.push(file_name(&path));
                }
                WriteOutcome::Empty => summary.empty_payloads += 1,
            }
        }

        self.write_index_row(contact, display_name.as_deref(), &media_files)
    }

    fn write_index_row(
        &mut self,
        contact: &ContactRecord,
        display_name: Option<&str>,
        media_files: &[String],
    ) -> Result<()> {
        let Some((writer, path)) = self.index.as_mut() else {
            return Ok(());
        };
        writer
            .write_record(index_row(contact, display_name, media_files))
            .map_err(|e| ExtractionError::write(path.as_path(), e))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// One `contacts.csv` row
fn index_row(
    contact: &ContactRecord,
    display_name: Option<&str>,
    media_files: &[String],
) -> Vec<String> {
    let organization = contact
        .property("ORG")
        .map(fields::parse_organization)
        .map(|org| {
            std::iter::once(org.name)
                .chain(org.units)
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" / ")
        })
        .unwrap_or_default();

    let typed = |name: &str| {
        contact
            .properties_named(name)
            .map(fields::parse_typed_value)
            .filter(|v| !v.value.is_empty())
            .map(|v| match v.kind {
                Some(kind) => format!("{} ({})", v.value, kind),
                None => v.value,
            })
            .collect::<Vec<_>>()
            .join("; ")
    };

    let addresses = contact
        .properties_named("ADR")
        .map(fields::parse_address)
        .map(|a| a.one_line())
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>()
        .join(" | ");

    let categories = contact
        .property("CATEGORIES")
        .map(fields::parse_categories)
        .unwrap_or_default()
        .join(", ");

    let geo = contact
        .property("GEO")
        .and_then(fields::parse_geo)
        .map(|g| format!("{},{}", g.latitude, g.longitude))
        .unwrap_or_default();

    vec![
        display_name.unwrap_or_default().to_string(),
        organization,
        typed("TEL"),
        typed("EMAIL"),
        addresses,
        categories,
        geo,
        media_files.join("; "),
    ]
}

impl Extractor for ContactsVcardExtractor {
    fn extract(&mut self, inputs: &[BackupFile]) -> Result<ExtractionSummary> {
        info!(
            "Extracting contact media into {}",
            self.sink.output_dir().display()
        );

        let mut summary = ExtractionSummary::default();
        summary.output_csv = self.open_index()?;
        let total = inputs.len();

        for (i, input) in inputs.iter().enumerate() {
            self.progress.emit(ProgressUpdate::FileStarted {
                path: input.path.clone(),
                index: i + 1,
                total,
            });
            info!("Processing {} ({}/{})", input.path.display(), i + 1, total);

            let contacts_before = summary.records_processed;
            let processed = match self.process_file(input, &mut summary) {
                Ok(processed) => processed,
                Err(e) => {
                    if let Err(close_err) = self.close_index() {
                        warn!("Could not finish {}: {}", CONTACTS_INDEX_FILE, close_err);
                    }
                    return Err(e);
                }
            };
            if !processed {
                continue;
            }
            summary.files_processed += 1;

            let records = summary.records_processed - contacts_before;
            info!("Finished {}: {} contact(s)", input.path.display(), records);
            self.progress.emit(ProgressUpdate::FileFinished {
                path: input.path.clone(),
                records,
            });
        }
        self.close_index()?;

        summary.finish(summary.records_processed > 0);
        if summary.records_processed == 0 {
            info!("No contacts found");
        } else {
            info!(
                "{} contact(s), {} media file(s) written",
                summary.records_processed, summary.records_written
            );
        }
        Ok(summary)
    }
}
