//! MMS media extraction
//!
//! Walks the `<mms>`/`<part>` tree of `sms*.xml` backups and writes every
//! image, video, audio or PDF part as its own file. Parts are handled as
//! they are read; nothing from a previous part is kept except the content
//! index used to drop repeated payloads.

use super::mime::{categorize, decode_base64, extension_for_mime, normalize_mime};
use super::stream::{Element, XmlEvent};
use super::{local_time, parse_timestamp, stream_inputs, ElementHandler};
use crate::core::config::MediaConfig;
use crate::core::dispatch::Extractor;
use crate::core::error::Result;
use crate::core::input::BackupFile;
use crate::core::media::{ExtractedMediaFile, MediaSink, MediaSource, WriteOutcome};
use crate::core::naming::{split_extension, RANDOM_NAME_LENGTH};
use crate::core::summary::{ExtractionSummary, Progress};
use log::{debug, info, warn};

/// Timestamp prefix of generated names
const NAME_TIME_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Owning message of the parts being read
#[derive(Debug, Clone)]
struct MessageContext {
    timestamp: String,
    sender_digits: String,
}

#[derive(Debug, Clone)]
enum MmsState {
    Outside,
    Inside(MessageContext),
    /// Inside an `<mms>` that could not be read
    Skipping,
}

/// Extracts MMS attachments into media files
pub struct MmsMediaExtractor {
    sink: MediaSink,
    media: MediaConfig,
    progress: Progress,
    state: MmsState,
}

impl MmsMediaExtractor {
    pub fn new(sink: MediaSink, media: MediaConfig, progress: Progress) -> Self {
        Self {
            sink,
            media,
            progress,
            state: MmsState::Outside,
        }
    }

    fn open_message(&mut self, mms: &Element, summary: &mut ExtractionSummary) {
        let timestamp = parse_timestamp(mms.attr("date"))
            .and_then(local_time)
            .map(|t| t.format(NAME_TIME_FORMAT).to_string());

        let Some(timestamp) = timestamp else {
            warn!(
                "Skipping <mms> with missing or invalid date {:?}",
                mms.attr("date")
            );
            summary.parse_errors += 1;
            if !mms.self_closing {
                self.state = MmsState::Skipping;
            }
            return;
        };

        if mms.self_closing {
            return;
        }

        let sender_digits = mms
            .attr("address")
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect();

        self.state = MmsState::Inside(MessageContext {
            timestamp,
            sender_digits,
        });
    }

    fn handle_part(
        &mut self,
        part: &Element,
        message: &MessageContext,
        summary: &mut ExtractionSummary,
    ) -> Result<()> {
        let mime = normalize_mime(part.attr("ct").unwrap_or_default());
        let Some(category) = categorize(&mime) else {
            return Ok(());
        };

        summary.records_processed += 1;

        if !category.enabled_in(&self.media) {
            debug!("Filtered out {} part", mime);
            summary.filtered_out += 1;
            return Ok(());
        }

        let bytes = match decode_base64(part.attr("data").unwrap_or_default()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Skipping {} part from {}: {}", mime, message.timestamp, e);
                summary.decode_errors += 1;
                return Ok(());
            }
        };

        let extension = extension_for_mime(&mime);
        let declared = part.non_empty("cl").or_else(|| part.non_empty("name"));
        let declared = match declared {
            Some(name) if split_extension(name).1.is_some() => name.to_string(),
            Some(name) => format!("{}.{}", name, extension),
            None => format!(
                "{}.{}",
                self.sink.names().letters(RANDOM_NAME_LENGTH),
                extension
            ),
        };
        let filename = format!(
            "{}_{}_{}",
            message.timestamp, message.sender_digits, declared
        );

        let outcome = self.sink.write(ExtractedMediaFile {
            filename,
            bytes,
            source_kind: MediaSource::MmsAttachment,
        })?;

        match outcome {
            WriteOutcome::Written { path, bytes } => {
                debug!("Wrote {} ({} bytes)", path.display(), bytes);
                let written_ext = path
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_else(|| extension.clone());
                summary.add_media(&written_ext, bytes);
            }
            WriteOutcome::Duplicate(_) => summary.duplicates += 1,
            WriteOutcome::Empty => summary.empty_payloads += 1,
        }
        Ok(())
    }
}

impl ElementHandler for MmsMediaExtractor {
    fn handle(&mut self, event: XmlEvent, summary: &mut ExtractionSummary) -> Result<()> {
        match event {
            XmlEvent::Open(el) if el.name == "mms" => self.open_message(&el, summary),
            XmlEvent::Malformed {
                name, self_closing, reason,
            } if name == "mms" => {
                warn!("Skipping unreadable <mms>: {}", reason);
                summary.parse_errors += 1;
                if !self_closing {
                    self.state = MmsState::Skipping;
                }
            }
            XmlEvent::Close(name) if name == "mms" => self.state = MmsState::Outside,
            XmlEvent::Open(el) if el.name == "part" => {
                if let MmsState::Inside(message) = &self.state {
                    let message = message.clone();
                    self.handle_part(&el, &message, summary)?;
                }
            }
            XmlEvent::Malformed { name, reason, .. } if name == "part" => {
                if let MmsState::Inside(_) = self.state {
                    warn!("Skipping unreadable <part>: {}", reason);
                    summary.parse_errors += 1;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn end_file(&mut self, _summary: &mut ExtractionSummary) -> Result<()> {
        self.state = MmsState::Outside;
        Ok(())
    }
}

impl Extractor for MmsMediaExtractor {
    fn extract(&mut self, inputs: &[BackupFile]) -> Result<ExtractionSummary> {
        info!(
            "Extracting MMS media ({}) into {}",
            self.media.enabled_categories().join(", "),
            self.sink.output_dir().display()
        );

        let mut summary = ExtractionSummary::default();
        let progress = self.progress.clone();
        stream_inputs(inputs, self, &mut summary, &progress)?;

        summary.finish(summary.records_written > 0);
        if summary.records_written == 0 {
            info!("No media files found to extract");
        }
        Ok(summary)
    }
}
