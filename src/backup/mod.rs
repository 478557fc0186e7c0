//! SMS Backup & Restore XML extraction
//!
//! # Submodules
//!
//! - `stream` - Streaming XML reader shared by the extractors
//! - `mime` - MIME filtering, extension inference, base64 decoding
//! - `mms_media` - MMS attachments to media files
//! - `calls` - Call log CSV
//! - `sms_text` - SMS and MMS text to CSV

pub mod calls;
pub mod mime;
pub mod mms_media;
pub mod sms_text;
pub mod stream;

use crate::core::error::Result;
use crate::core::input::BackupFile;
use crate::core::summary::{ExtractionSummary, Progress, ProgressUpdate};
use chrono::{DateTime, Local, TimeZone};
use log::{info, warn};
use stream::{XmlEvent, XmlStream};

pub use calls::CallLogGenerator;
pub use mms_media::MmsMediaExtractor;
pub use sms_text::SmsTextExtractor;

/// Receives the element events of every input file in turn
pub trait ElementHandler {
    /// Handle one event; an error ends the run
    fn handle(&mut self, event: XmlEvent, summary: &mut ExtractionSummary) -> Result<()>;

    /// Called when a file has been streamed to the end (or closed early)
    fn end_file(&mut self, _summary: &mut ExtractionSummary) -> Result<()> {
        Ok(())
    }
}

/// Stream every input through `handler`, in order
///
/// Files that cannot be opened are recorded in the summary and skipped.
pub fn stream_inputs<H: ElementHandler>(
    inputs: &[BackupFile],
    handler: &mut H,
    summary: &mut ExtractionSummary,
    progress: &Progress,
) -> Result<()> {
    let total = inputs.len();

    for (i, input) in inputs.iter().enumerate() {
        progress.emit(ProgressUpdate::FileStarted {
            path: input.path.clone(),
            index: i + 1,
            total,
        });

        let mut stream = match XmlStream::open(&input.path) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Skipping input: {}", e);
                summary.add_failure(&input.path, e.to_string());
                continue;
            }
        };
        info!("Processing {} ({}/{})", input.path.display(), i + 1, total);

        let records_before = summary.records_processed;
        while let Some(event) = stream.next_event() {
            let seen = summary.records_processed;
            handler.handle(event, summary)?;
            if summary.records_processed != seen {
                progress.record(summary);
            }
        }
        handler.end_file(summary)?;

        summary.parse_errors += stream.syntax_errors();
        summary.files_processed += 1;

        let records = summary.records_processed - records_before;
        info!("Finished {}: {} record(s)", input.path.display(), records);
        progress.emit(ProgressUpdate::FileFinished {
            path: input.path.clone(),
            records,
        });
    }

    Ok(())
}

/// Epoch milliseconds as local time
pub fn local_time(timestamp_ms: i64) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(timestamp_ms).single()
}

/// Parse an epoch-milliseconds attribute
pub fn parse_timestamp(value: Option<&str>) -> Option<i64> {
    value?.trim().parse().ok()
}
