//! SMS and MMS text export
//!
//! One CSV row per `<sms>`, and one per `<mms>` that has at least one
//! `text/plain` part. Rows are written as they are read. Messages are not
//! deduplicated: the same text sent twice is two messages.

use super::mime::normalize_mime;
use super::stream::{Element, XmlEvent};
use super::{local_time, parse_timestamp, stream_inputs, ElementHandler};
use crate::backup::calls::{NOT_AVAILABLE, UNKNOWN_CONTACT};
use crate::core::dispatch::Extractor;
use crate::core::error::{ExtractionError, Result};
use crate::core::input::BackupFile;
use crate::core::summary::{ExtractionSummary, Progress};
use log::{debug, info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Output file name
pub const SMS_MESSAGES_FILE: &str = "sms_messages.csv";

/// CSV header
pub const SMS_MESSAGES_HEADER: [&str; 12] = [
    "Message Type",
    "Date (timestamp)",
    "Date",
    "Address",
    "Contact Name",
    "Type",
    "Body",
    "Read",
    "Status",
    "Locked",
    "SIM ID",
    "Message ID",
];

/// Format used when `readable_date` is absent
const READABLE_DATE_FORMAT: &str = "%b %-d, %Y %-I:%M:%S %p";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Sms,
    Mms,
}

impl MessageType {
    fn label(&self) -> &'static str {
        match self {
            MessageType::Sms => "SMS",
            MessageType::Mms => "MMS",
        }
    }
}

/// One exported message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub message_type: MessageType,
    pub timestamp_ms: i64,
    pub readable_date: String,
    pub address: String,
    pub contact_name: Option<String>,
    /// `type` for SMS, `msg_box` for MMS
    pub direction_type: i64,
    pub body: String,
    pub read_status: Option<bool>,
    pub status_code: Option<String>,
    pub locked: bool,
    pub sim_id: Option<i64>,
    /// Empty when the backup has none; the row number is used instead
    pub message_id: String,
}

/// Attribute names that differ between `<sms>` and `<mms>`
struct AttributeNames {
    direction: &'static str,
    status: &'static str,
    sim: &'static str,
    id: &'static str,
}

const SMS_ATTRIBUTES: AttributeNames = AttributeNames {
    direction: "type",
    status: "status",
    sim: "sub_id",
    id: "_id",
};

const MMS_ATTRIBUTES: AttributeNames = AttributeNames {
    direction: "msg_box",
    status: "st",
    sim: "sub_id",
    id: "m_id",
};

impl MessageRecord {
    /// Header fields of an `<sms>` or `<mms>` element; the body is filled
    /// in by the caller
    pub fn from_element(el: &Element, message_type: MessageType) -> Result<Self> {
        let names = match message_type {
            MessageType::Sms => &SMS_ATTRIBUTES,
            MessageType::Mms => &MMS_ATTRIBUTES,
        };

        let timestamp_ms = parse_timestamp(el.attr("date")).ok_or_else(|| {
            ExtractionError::Parse(format!(
                "<{}> with missing or invalid date {:?}",
                el.name,
                el.attr("date")
            ))
        })?;

        let readable_date = match el.non_empty("readable_date") {
            Some(date) => date.to_string(),
            None => local_time(timestamp_ms)
                .map(|t| t.format(READABLE_DATE_FORMAT).to_string())
                .unwrap_or_default(),
        };

        let direction_type = el
            .non_empty(names.direction)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);

        let read_status = match el.non_empty("read").map(str::trim) {
            Some("1") => Some(true),
            Some("0") => Some(false),
            _ => None,
        };

        Ok(Self {
            message_type,
            timestamp_ms,
            readable_date,
            address: el.attr("address").unwrap_or_default().to_string(),
            contact_name: el
                .non_empty("contact_name")
                .filter(|name| *name != UNKNOWN_CONTACT)
                .map(str::to_string),
            direction_type,
            body: match message_type {
                MessageType::Sms => el.non_empty("body").unwrap_or_default().to_string(),
                MessageType::Mms => String::new(),
            },
            read_status,
            status_code: el.non_empty(names.status).map(str::to_string),
            locked: el.attr("locked").map(str::trim) == Some("1"),
            sim_id: el
                .non_empty(names.sim)
                .and_then(|v| v.trim().parse().ok()),
            message_id: el.non_empty(names.id).unwrap_or_default().to_string(),
        })
    }

    /// CSV row, in header order; `row_number` is 1-based
    pub fn to_row(&self, row_number: usize) -> Vec<String> {
        let message_id = if self.message_id.is_empty() {
            row_number.to_string()
        } else {
            self.message_id.clone()
        };

        vec![
            self.message_type.label().to_string(),
            self.timestamp_ms.to_string(),
            self.readable_date.clone(),
            self.address.clone(),
            self.contact_name
                .clone()
                .unwrap_or_else(|| UNKNOWN_CONTACT.to_string()),
            self.direction_type.to_string(),
            self.body.clone(),
            match self.read_status {
                Some(true) => "1".to_string(),
                Some(false) => "0".to_string(),
                None => NOT_AVAILABLE.to_string(),
            },
            self.status_code
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            if self.locked { "1" } else { "0" }.to_string(),
            self.sim_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            message_id,
        ]
    }
}

/// MMS being read: header plus the text parts seen so far
#[derive(Debug)]
struct PendingMms {
    record: MessageRecord,
    texts: Vec<String>,
}

#[derive(Debug)]
enum MmsState {
    Outside,
    Inside(PendingMms),
    Skipping,
}

/// Exports message text to `sms_messages.csv`
pub struct SmsTextExtractor {
    output_dir: PathBuf,
    progress: Progress,
    writer: Option<(csv::Writer<File>, PathBuf)>,
    rows_written: usize,
    state: MmsState,
}

impl SmsTextExtractor {
    pub fn new(output_dir: &Path, progress: Progress) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            progress,
            writer: None,
            rows_written: 0,
            state: MmsState::Outside,
        }
    }

    fn open_writer(&mut self) -> Result<PathBuf> {
        let path = self.output_dir.join(SMS_MESSAGES_FILE);
        let mut writer =
            csv::Writer::from_path(&path).map_err(|e| ExtractionError::write(&path, e))?;
        writer
            .write_record(SMS_MESSAGES_HEADER)
            .map_err(|e| ExtractionError::write(&path, e))?;
        self.writer = Some((writer, path.clone()));
        Ok(path)
    }

    fn write_row(&mut self, record: &MessageRecord, summary: &mut ExtractionSummary) -> Result<()> {
        let Some((writer, path)) = self.writer.as_mut() else {
            return Ok(());
        };
        let row = record.to_row(self.rows_written + 1);
        writer
            .write_record(&row)
            .map_err(|e| ExtractionError::write(path.as_path(), e))?;
        self.rows_written += 1;
        summary.records_written += 1;
        Ok(())
    }

    fn close_writer(&mut self) -> Result<()> {
        if let Some((mut writer, path)) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| ExtractionError::write(&path, e))?;
        }
        Ok(())
    }

    fn handle_sms(&mut self, sms: &Element, summary: &mut ExtractionSummary) -> Result<()> {
        summary.records_processed += 1;
        match MessageRecord::from_element(sms, MessageType::Sms) {
            Ok(record) => self.write_row(&record, summary),
            Err(e) => {
                warn!("Skipping message: {}", e);
                summary.parse_errors += 1;
                Ok(())
            }
        }
    }

    fn open_mms(&mut self, mms: &Element, summary: &mut ExtractionSummary) {
        summary.records_processed += 1;
        match MessageRecord::from_element(mms, MessageType::Mms) {
            Ok(record) if !mms.self_closing => {
                self.state = MmsState::Inside(PendingMms {
                    record,
                    texts: Vec::new(),
                });
            }
            // No parts, so no text
            Ok(_) => {}
            Err(e) => {
                warn!("Skipping message: {}", e);
                summary.parse_errors += 1;
                if !mms.self_closing {
                    self.state = MmsState::Skipping;
                }
            }
        }
    }

    fn close_mms(&mut self, summary: &mut ExtractionSummary) -> Result<()> {
        let state = std::mem::replace(&mut self.state, MmsState::Outside);
        if let MmsState::Inside(pending) = state {
            if pending.texts.is_empty() {
                debug!("MMS {} has no text part", pending.record.timestamp_ms);
                return Ok(());
            }
            let mut record = pending.record;
            record.body = pending.texts.join(" ");
            self.write_row(&record, summary)?;
        }
        Ok(())
    }
}

impl ElementHandler for SmsTextExtractor {
    fn handle(&mut self, event: XmlEvent, summary: &mut ExtractionSummary) -> Result<()> {
        match event {
            XmlEvent::Open(el) if el.name == "sms" => self.handle_sms(&el, summary)?,
            XmlEvent::Open(el) if el.name == "mms" => self.open_mms(&el, summary),
            XmlEvent::Close(name) if name == "mms" => self.close_mms(summary)?,
            XmlEvent::Open(el) if el.name == "part" => {
                if let MmsState::Inside(pending) = &mut self.state {
                    let is_text = el
                        .attr("ct")
                        .map(|ct| normalize_mime(ct) == "text/plain")
                        .unwrap_or(false);
                    if is_text {
                        pending
                            .texts
                            .push(el.non_empty("text").unwrap_or_default().to_string());
                    }
                }
            }
            XmlEvent::Malformed {
                name,
                reason,
                self_closing,
            } => match name.as_str() {
                "sms" => {
                    warn!("Skipping unreadable <sms>: {}", reason);
                    summary.records_processed += 1;
                    summary.parse_errors += 1;
                }
                "mms" => {
                    warn!("Skipping unreadable <mms>: {}", reason);
                    summary.records_processed += 1;
                    summary.parse_errors += 1;
                    if !self_closing {
                        self.state = MmsState::Skipping;
                    }
                }
                "part" if matches!(self.state, MmsState::Inside(_)) => {
                    warn!("Skipping unreadable <part>: {}", reason);
                    summary.parse_errors += 1;
                }
                _ => {}
            },
            _ => {}
        }
        Ok(())
    }

    fn end_file(&mut self, summary: &mut ExtractionSummary) -> Result<()> {
        // A file cut off inside an <mms> still yields what was read.
        if matches!(self.state, MmsState::Inside(_)) {
            self.close_mms(summary)?;
        }
        self.state = MmsState::Outside;
        Ok(())
    }
}

impl Extractor for SmsTextExtractor {
    fn extract(&mut self, inputs: &[BackupFile]) -> Result<ExtractionSummary> {
        let mut summary = ExtractionSummary::default();
        let path = self.open_writer()?;

        let progress = self.progress.clone();
        let streamed = stream_inputs(inputs, self, &mut summary, &progress);
        let closed = self.close_writer();
        streamed?;
        closed?;

        summary.output_csv = Some(path.clone());
        summary.finish(self.rows_written > 0);
        if self.rows_written == 0 {
            info!("No messages found; wrote header-only {}", path.display());
        } else {
            info!(
                "Messages written to {} ({} row(s))",
                path.display(),
                self.rows_written
            );
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::input::BackupKind;
    use crate::core::summary::Outcome;
    use std::fs;
    use tempfile::TempDir;

    fn sms_file(dir: &Path, name: &str, body: &str) -> BackupFile {
        let path = dir.join(name);
        fs::write(
            &path,
            format!(
                "<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>\n<smses count=\"0\">{}</smses>",
                body
            ),
        )
        .unwrap();
        BackupFile {
            path,
            kind: BackupKind::Sms,
        }
    }

    fn run(dir: &Path, inputs: &[BackupFile]) -> (ExtractionSummary, Vec<Vec<String>>) {
        let mut extractor = SmsTextExtractor::new(dir, Progress::none());
        let summary = extractor.extract(inputs).unwrap();
        let mut reader = csv::Reader::from_path(dir.join(SMS_MESSAGES_FILE)).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, SMS_MESSAGES_HEADER);
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        (summary, rows)
    }

    #[test]
    fn test_sms_row() {
        let temp_dir = TempDir::new().unwrap();
        let input = sms_file(
            temp_dir.path(),
            "sms-1.xml",
            r#"<sms protocol="0" address="+15551234567" date="1451965221740" type="2" body="On my way, &quot;soon&quot;" read="1" status="-1" locked="0" sub_id="1" readable_date="Jan 4, 2016 10:40:21 PM" contact_name="Alice" _id="17" />"#,
        );

        let (summary, rows) = run(temp_dir.path(), &[input]);

        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0],
            vec![
                "SMS",
                "1451965221740",
                "Jan 4, 2016 10:40:21 PM",
                "+15551234567",
                "Alice",
                "2",
                "On my way, \"soon\"",
                "1",
                "-1",
                "0",
                "1",
                "17"
            ]
        );
        assert_eq!(summary.outcome, Outcome::Completed);
    }

    #[test]
    fn test_mms_text_parts_joined() {
        let temp_dir = TempDir::new().unwrap();
        let input = sms_file(
            temp_dir.path(),
            "sms-1.xml",
            r#"<mms date="1451965221740" address="5551234" msg_box="1" m_id="abc" st="128" read="0" locked="1">
                 <parts>
                   <part ct="application/smil" text="&lt;smil/&gt;" />
                   <part ct="text/plain" text="Hello  there" />
                   <part ct="image/jpeg" data="AAAA" />
                   <part ct="text/plain" text=" world" />
                 </parts>
               </mms>"#,
        );

        let (_, rows) = run(temp_dir.path(), &[input]);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "MMS");
        assert_eq!(rows[0][4], "(Unknown)");
        assert_eq!(rows[0][5], "1");
        assert_eq!(rows[0][6], "Hello  there  world");
        assert_eq!(rows[0][7], "0");
        assert_eq!(rows[0][8], "128");
        assert_eq!(rows[0][9], "1");
        assert_eq!(rows[0][11], "abc");
    }

    #[test]
    fn test_mms_text_part_with_charset() {
        let temp_dir = TempDir::new().unwrap();
        let input = sms_file(
            temp_dir.path(),
            "sms-1.xml",
            r#"<mms date="1451965221740" msg_box="2"><parts><part ct="Text/Plain; charset=utf-8" text="See you" /></parts></mms>"#,
        );

        let (_, rows) = run(temp_dir.path(), &[input]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][6], "See you");
    }

    #[test]
    fn test_mms_without_text_has_no_row() {
        let temp_dir = TempDir::new().unwrap();
        let input = sms_file(
            temp_dir.path(),
            "sms-1.xml",
            r#"<mms date="1" msg_box="1"><parts><part ct="image/png" data="AAAA" /></parts></mms>"#,
        );

        let (summary, rows) = run(temp_dir.path(), &[input]);
        assert!(rows.is_empty());
        assert_eq!(summary.records_processed, 1);
    }

    #[test]
    fn test_missing_id_uses_row_number() {
        let temp_dir = TempDir::new().unwrap();
        let input = sms_file(
            temp_dir.path(),
            "sms-1.xml",
            r#"<sms date="1" body="first" _id="99" /><sms date="2" body="second" />"#,
        );

        let (_, rows) = run(temp_dir.path(), &[input]);
        assert_eq!(rows[0][11], "99");
        assert_eq!(rows[1][11], "2");
        assert_eq!(rows[1][8], "N/A");
        assert_eq!(rows[1][10], "N/A");
    }

    #[test]
    fn test_repeated_messages_not_deduplicated() {
        let temp_dir = TempDir::new().unwrap();
        let sms = r#"<sms date="1451965221740" address="1" body="ok" type="1" />"#;
        let input = sms_file(temp_dir.path(), "sms-1.xml", &sms.repeat(3));

        let (summary, rows) = run(temp_dir.path(), &[input]);
        assert_eq!(rows.len(), 3);
        assert_eq!(summary.duplicates, 0);
    }

    #[test]
    fn test_bad_records_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let input = sms_file(
            temp_dir.path(),
            "sms-1.xml",
            r#"<sms body="no date" /><sms date="x" /><mms date="1" date="1"><parts><part ct="text/plain" text="lost" /></parts></mms><sms date="5" body="kept" />"#,
        );

        let (summary, rows) = run(temp_dir.path(), &[input]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][6], "kept");
        assert_eq!(summary.parse_errors, 3);
    }

    #[test]
    fn test_empty_backup_writes_header_only() {
        let temp_dir = TempDir::new().unwrap();
        let input = sms_file(temp_dir.path(), "sms-1.xml", "");

        let (summary, rows) = run(temp_dir.path(), &[input]);
        assert!(rows.is_empty());
        assert_eq!(summary.records_processed, 0);
        assert_eq!(summary.outcome, Outcome::EmptyResult);
        assert!(temp_dir.path().join(SMS_MESSAGES_FILE).exists());
    }

    #[test]
    fn test_emoji_body() {
        let temp_dir = TempDir::new().unwrap();
        let input = sms_file(
            temp_dir.path(),
            "sms-1.xml",
            r#"<sms date="1" body="Nice &#55357;&#56832;" />"#,
        );

        let (_, rows) = run(temp_dir.path(), &[input]);
        assert_eq!(rows[0][6], "Nice 😀");
    }
}
