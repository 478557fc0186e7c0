//! Call log generation
//!
//! Merges the `<call>` records of every `calls*.xml` input into one
//! deduplicated `call_log.csv`. Two records with the same timestamp are the
//! same call seen in overlapping exports; the first one read is kept.

use super::stream::{Element, XmlEvent};
use super::{local_time, parse_timestamp, stream_inputs, ElementHandler};
use crate::core::dispatch::Extractor;
use crate::core::error::{ExtractionError, Result};
use crate::core::input::BackupFile;
use crate::core::summary::{ExtractionSummary, Progress};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Output file name
pub const CALL_LOG_FILE: &str = "call_log.csv";

/// CSV header
pub const CALL_LOG_HEADER: [&str; 11] = [
    "Call Date (timestamp)",
    "Call date",
    "Call type",
    "Caller name",
    "Caller #",
    "Call duration (s)",
    "Call duration",
    "Read status",
    "SIM slot",
    "Features",
    "Call Id #",
];

/// Shown for values that do not apply or are missing
pub const NOT_AVAILABLE: &str = "N/A";

/// Shown when the backup has no contact name
pub const UNKNOWN_CONTACT: &str = "(Unknown)";

/// Format used when `readable_date` is absent
const READABLE_DATE_FORMAT: &str = "%b %-d, %Y %-I:%M:%S %p";

/// Bits of the Android `features` column
const FEATURE_FLAGS: [(u64, &str); 7] = [
    (0x1, "video"),
    (0x2, "pulled_externally"),
    (0x4, "hd_call"),
    (0x8, "wifi"),
    (0x10, "assisted_dialing"),
    (0x20, "rtt"),
    (0x40, "volte"),
];

/// Android call type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallType {
    Incoming,
    Outgoing,
    Missed,
    Voicemail,
    Rejected,
    Blocked,
    AnsweredExternally,
    /// Unrecognized code, kept as written
    Unknown(Option<String>),
}

impl CallType {
    /// Map the `type` attribute
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(str::trim) {
            Some("1") => CallType::Incoming,
            Some("2") => CallType::Outgoing,
            Some("3") => CallType::Missed,
            Some("4") => CallType::Voicemail,
            Some("5") => CallType::Rejected,
            Some("6") => CallType::Blocked,
            Some("7") => CallType::AnsweredExternally,
            Some(other) if !other.is_empty() => CallType::Unknown(Some(other.to_string())),
            _ => CallType::Unknown(None),
        }
    }

    /// Types where the call never connected
    pub fn is_unconnected(&self) -> bool {
        matches!(
            self,
            CallType::Missed | CallType::Rejected | CallType::Blocked
        )
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallType::Incoming => write!(f, "Incoming"),
            CallType::Outgoing => write!(f, "Outgoing"),
            CallType::Missed => write!(f, "Missed"),
            CallType::Voicemail => write!(f, "Voicemail"),
            CallType::Rejected => write!(f, "Rejected"),
            CallType::Blocked => write!(f, "Blocked"),
            CallType::AnsweredExternally => write!(f, "AnsweredExternally"),
            CallType::Unknown(Some(code)) => write!(f, "Unknown ({})", code),
            CallType::Unknown(None) => write!(f, "Unknown"),
        }
    }
}

/// One call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub timestamp_ms: i64,
    pub call_type: CallType,
    pub caller_name: Option<String>,
    pub caller_number: String,
    pub duration_seconds: Option<u64>,
    pub read_status: Option<bool>,
    pub sim_slot: Option<i64>,
    pub features: Option<String>,
    /// 0-based position among surviving records
    pub sequence_id: usize,
    pub readable_date: String,
}

impl CallRecord {
    /// Build a record from a `<call>` element
    pub fn from_element(call: &Element) -> Result<Self> {
        let timestamp_ms = parse_timestamp(call.attr("date")).ok_or_else(|| {
            ExtractionError::Parse(format!(
                "call with missing or invalid date {:?}",
                call.attr("date")
            ))
        })?;

        let duration_seconds = match call.non_empty("duration") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                ExtractionError::Parse(format!("call {} has invalid duration {:?}", timestamp_ms, raw))
            })?),
            None => None,
        };

        let read_status = match call.non_empty("read").map(str::trim) {
            Some("1") => Some(true),
            Some("0") => Some(false),
            _ => None,
        };

        let sim_slot = call.non_empty("subscription_id").and_then(|raw| {
            let parsed = raw.trim().parse().ok();
            if parsed.is_none() {
                debug!("Ignoring non-numeric subscription_id {:?}", raw);
            }
            parsed
        });

        let readable_date = match call.non_empty("readable_date") {
            Some(date) => date.to_string(),
            None => local_time(timestamp_ms)
                .map(|t| t.format(READABLE_DATE_FORMAT).to_string())
                .unwrap_or_default(),
        };

        Ok(Self {
            timestamp_ms,
            call_type: CallType::from_code(call.attr("type")),
            caller_name: call
                .non_empty("contact_name")
                .filter(|name| *name != UNKNOWN_CONTACT)
                .map(str::to_string),
            caller_number: call.attr("number").unwrap_or_default().to_string(),
            duration_seconds,
            read_status,
            sim_slot,
            features: describe_features(
                call.non_empty("features"),
                call.non_empty("presentation"),
                call.non_empty("post_dial_digits"),
            ),
            sequence_id: 0,
            readable_date,
        })
    }

    /// Both duration columns
    pub fn duration_columns(&self) -> (String, String) {
        match self.duration_seconds {
            None | Some(0) if self.call_type.is_unconnected() => {
                (NOT_AVAILABLE.to_string(), NOT_AVAILABLE.to_string())
            }
            duration => {
                let seconds = duration.unwrap_or(0);
                (seconds.to_string(), humanize_duration(seconds))
            }
        }
    }

    /// CSV row, in header order
    pub fn to_row(&self) -> Vec<String> {
        let (duration_raw, duration_human) = self.duration_columns();
        vec![
            self.timestamp_ms.to_string(),
            self.readable_date.clone(),
            self.call_type.to_string(),
            self.caller_name
                .clone()
                .unwrap_or_else(|| UNKNOWN_CONTACT.to_string()),
            self.caller_number.clone(),
            duration_raw,
            duration_human,
            match self.read_status {
                Some(true) => "1".to_string(),
                Some(false) => "0".to_string(),
                None => NOT_AVAILABLE.to_string(),
            },
            self.sim_slot
                .map(|slot| slot.to_string())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            self.features
                .clone()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            self.sequence_id.to_string(),
        ]
    }
}

/// Human-readable duration: `1 hour, 1 minute, 1 second`
///
/// Zero clauses are left out; zero seconds overall is `0 seconds`.
pub fn humanize_duration(total_seconds: u64) -> String {
    fn clause(n: u64, unit: &str) -> String {
        if n == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", n, unit)
        }
    }

    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(clause(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(clause(minutes, "minute"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(clause(seconds, "second"));
    }
    parts.join(", ")
}

/// Combine feature bits, presentation and post-dial digits into one column
pub fn describe_features(
    features: Option<&str>,
    presentation: Option<&str>,
    post_dial: Option<&str>,
) -> Option<String> {
    let mut labels = Vec::new();

    if let Some(raw) = features.map(str::trim) {
        match raw.parse::<u64>() {
            Ok(bits) => {
                let mut known = 0;
                for (flag, label) in FEATURE_FLAGS {
                    if bits & flag != 0 {
                        labels.push(label.to_string());
                        known |= flag;
                    }
                }
                if bits & !known != 0 {
                    labels.push(format!("{:#x}", bits & !known));
                }
            }
            Err(_) => labels.push(format!("features:{}", raw)),
        }
    }

    if let Some(presentation) = presentation.map(str::trim) {
        if presentation != "1" {
            labels.push(format!("presentation:{}", presentation));
        }
    }

    if let Some(digits) = post_dial {
        labels.push(format!("post_dial:{}", digits));
    }

    if labels.is_empty() {
        None
    } else {
        Some(labels.join(", "))
    }
}

/// Builds `call_log.csv` from call backups
pub struct CallLogGenerator {
    output_dir: PathBuf,
    sort_by_timestamp: bool,
    progress: Progress,
    seen: HashSet<i64>,
    records: Vec<CallRecord>,
}

impl CallLogGenerator {
    pub fn new(output_dir: &Path, sort_by_timestamp: bool, progress: Progress) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            sort_by_timestamp,
            progress,
            seen: HashSet::new(),
            records: Vec::new(),
        }
    }

    /// Surviving records, in the order they will be written
    pub fn records(&self) -> &[CallRecord] {
        &self.records
    }

    fn write_csv(&self, path: &Path) -> Result<usize> {
        let mut writer =
            csv::Writer::from_path(path).map_err(|e| ExtractionError::write(path, e))?;
        writer
            .write_record(CALL_LOG_HEADER)
            .map_err(|e| ExtractionError::write(path, e))?;
        for record in &self.records {
            writer
                .write_record(record.to_row())
                .map_err(|e| ExtractionError::write(path, e))?;
        }
        writer.flush().map_err(|e| ExtractionError::write(path, e))?;
        Ok(self.records.len())
    }
}

impl ElementHandler for CallLogGenerator {
    fn handle(&mut self, event: XmlEvent, summary: &mut ExtractionSummary) -> Result<()> {
        match event {
            XmlEvent::Open(el) if el.name == "call" => {
                summary.records_processed += 1;
                match CallRecord::from_element(&el) {
                    Ok(mut record) => {
                        if !self.seen.insert(record.timestamp_ms) {
                            debug!("Dropping duplicate call at {}", record.timestamp_ms);
                            summary.duplicates += 1;
                            return Ok(());
                        }
                        record.sequence_id = self.records.len();
                        self.records.push(record);
                    }
                    Err(e) => {
                        warn!("Skipping call: {}", e);
                        summary.parse_errors += 1;
                    }
                }
            }
            XmlEvent::Malformed { name, reason, .. } if name == "call" => {
                warn!("Skipping unreadable <call>: {}", reason);
                summary.records_processed += 1;
                summary.parse_errors += 1;
            }
            _ => {}
        }
        Ok(())
    }
}

impl Extractor for CallLogGenerator {
    fn extract(&mut self, inputs: &[BackupFile]) -> Result<ExtractionSummary> {
        let mut summary = ExtractionSummary::default();
        let progress = self.progress.clone();
        stream_inputs(inputs, self, &mut summary, &progress)?;

        if self.sort_by_timestamp {
            self.records.sort_by_key(|r| r.timestamp_ms);
        }

        let path = self.output_dir.join(CALL_LOG_FILE);
        summary.records_written = self.write_csv(&path)?;
        summary.output_csv = Some(path.clone());
        summary.finish(!self.records.is_empty());

        if self.records.is_empty() {
            info!("No calls found; wrote header-only {}", path.display());
        } else {
            info!(
                "Call log written to {} ({} record(s))",
                path.display(),
                self.records.len()
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

    fn calls_file(dir: &Path, name: &str, calls: &[&str]) -> BackupFile {
        let path = dir.join(name);
        fs::write(
            &path,
            format!(
                "<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>\n<calls count=\"{}\">\n{}\n</calls>",
                calls.len(),
                calls.join("\n")
            ),
        )
        .unwrap();
        BackupFile {
            path,
            kind: BackupKind::Calls,
        }
    }

    fn run(dir: &Path, inputs: &[BackupFile], sort: bool) -> (ExtractionSummary, Vec<Vec<String>>) {
        let mut generator = CallLogGenerator::new(dir, sort, Progress::none());
        let summary = generator.extract(inputs).unwrap();
        let mut reader = csv::Reader::from_path(dir.join(CALL_LOG_FILE)).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, CALL_LOG_HEADER);
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        (summary, rows)
    }

    fn element(attrs: &[(&str, &str)]) -> Element {
        Element {
            name: "call".into(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            self_closing: true,
        }
    }

    #[test]
    fn test_humanize_duration() {
        assert_eq!(humanize_duration(0), "0 seconds");
        assert_eq!(humanize_duration(1), "1 second");
        assert_eq!(humanize_duration(2), "2 seconds");
        assert_eq!(humanize_duration(60), "1 minute");
        assert_eq!(humanize_duration(65), "1 minute, 5 seconds");
        assert_eq!(humanize_duration(192), "3 minutes, 12 seconds");
        assert_eq!(humanize_duration(3600), "1 hour");
        assert_eq!(humanize_duration(3661), "1 hour, 1 minute, 1 second");
        assert_eq!(humanize_duration(7322), "2 hours, 2 minutes, 2 seconds");
    }

    #[test]
    fn test_call_type_codes() {
        assert_eq!(CallType::from_code(Some("1")), CallType::Incoming);
        assert_eq!(CallType::from_code(Some("7")), CallType::AnsweredExternally);
        assert_eq!(CallType::from_code(Some("9")).to_string(), "Unknown (9)");
        assert_eq!(CallType::from_code(None).to_string(), "Unknown");
        assert!(CallType::Blocked.is_unconnected());
        assert!(!CallType::Voicemail.is_unconnected());
    }

    #[test]
    fn test_features() {
        assert_eq!(describe_features(None, None, None), None);
        assert_eq!(describe_features(Some("0"), Some("1"), None), None);
        assert_eq!(
            describe_features(Some("5"), None, None).as_deref(),
            Some("video, hd_call")
        );
        assert_eq!(
            describe_features(Some("136"), Some("2"), Some("1234")).as_deref(),
            Some("wifi, 0x80, presentation:2, post_dial:1234")
        );
    }

    #[test]
    fn test_missed_call_duration_is_na() {
        let record = CallRecord::from_element(&element(&[
            ("date", "1451965221740"),
            ("type", "3"),
            ("duration", "0"),
        ]))
        .unwrap();
        let row = record.to_row();
        assert_eq!(row[5], "N/A");
        assert_eq!(row[6], "N/A");

        let record = CallRecord::from_element(&element(&[
            ("date", "1451965221740"),
            ("type", "1"),
            ("duration", "0"),
        ]))
        .unwrap();
        assert_eq!(record.duration_columns(), ("0".into(), "0 seconds".into()));
    }

    #[test]
    fn test_record_defaults() {
        let record = CallRecord::from_element(&element(&[
            ("date", "1451965221740"),
            ("type", "2"),
            ("number", "+15551234567"),
            ("contact_name", "(Unknown)"),
            ("readable_date", "Jan 4, 2016 10:40:21 PM"),
            ("subscription_id", "1"),
            ("read", "1"),
        ]))
        .unwrap();
        let row = record.to_row();
        assert_eq!(row[1], "Jan 4, 2016 10:40:21 PM");
        assert_eq!(row[2], "Outgoing");
        assert_eq!(row[3], "(Unknown)");
        assert_eq!(row[5], "0");
        assert_eq!(row[7], "1");
        assert_eq!(row[8], "1");
        assert_eq!(row[9], "N/A");
    }

    #[test]
    fn test_readable_date_fallback() {
        let record = CallRecord::from_element(&element(&[("date", "1451965221740")])).unwrap();
        let expected = local_time(1451965221740)
            .unwrap()
            .format(READABLE_DATE_FORMAT)
            .to_string();
        assert_eq!(record.readable_date, expected);
    }

    #[test]
    fn test_invalid_records() {
        assert!(CallRecord::from_element(&element(&[("type", "1")])).is_err());
        assert!(CallRecord::from_element(&element(&[("date", "yesterday")])).is_err());
        assert!(
            CallRecord::from_element(&element(&[("date", "1"), ("duration", "long")])).is_err()
        );
    }

    #[test]
    fn test_duplicate_timestamp_keeps_first() {
        let temp_dir = TempDir::new().unwrap();
        let input = calls_file(
            temp_dir.path(),
            "calls-1.xml",
            &[
                r#"<call number="5551234" duration="65" date="1451965221740" type="1" contact_name="Alice" />"#,
                r#"<call number="5551234" duration="65" date="1451965221740" type="2" contact_name="Alice" />"#,
            ],
        );

        let (summary, rows) = run(temp_dir.path(), &[input], false);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "1451965221740");
        assert_eq!(rows[0][2], "Incoming");
        assert_eq!(rows[0][6], "1 minute, 5 seconds");
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.records_written, 1);
    }

    #[test]
    fn test_dedup_across_files_earliest_file_wins() {
        let temp_dir = TempDir::new().unwrap();
        let first = calls_file(
            temp_dir.path(),
            "calls-a.xml",
            &[r#"<call date="1000" type="3" number="1" />"#],
        );
        let second = calls_file(
            temp_dir.path(),
            "calls-b.xml",
            &[
                r#"<call date="1000" type="1" number="1" />"#,
                r#"<call date="500" type="2" number="2" />"#,
            ],
        );

        let (_, rows) = run(temp_dir.path(), &[first, second], false);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][2], "Missed");
        assert_eq!(rows[1][0], "500");
        assert_eq!(rows[1][10], "1");
    }

    #[test]
    fn test_sort_by_timestamp() {
        let temp_dir = TempDir::new().unwrap();
        let input = calls_file(
            temp_dir.path(),
            "calls-1.xml",
            &[
                r#"<call date="3000" type="1" />"#,
                r#"<call date="1000" type="1" />"#,
                r#"<call date="2000" type="1" />"#,
            ],
        );

        let (_, rows) = run(temp_dir.path(), &[input], true);
        let timestamps: Vec<_> = rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(timestamps, vec!["1000", "2000", "3000"]);
        let ids: Vec<_> = rows.iter().map(|r| r[10].as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "0"]);
    }

    #[test]
    fn test_bad_records_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let input = calls_file(
            temp_dir.path(),
            "calls-1.xml",
            &[
                r#"<call type="1" />"#,
                r#"<call date="1" date="2" />"#,
                r#"<call date="42" type="1" duration="10" />"#,
            ],
        );

        let (summary, rows) = run(temp_dir.path(), &[input], false);
        assert_eq!(rows.len(), 1);
        assert_eq!(summary.parse_errors, 2);
        assert_eq!(summary.records_processed, 3);
    }

    #[test]
    fn test_no_calls_writes_header_only() {
        let temp_dir = TempDir::new().unwrap();
        let input = calls_file(temp_dir.path(), "calls-1.xml", &[]);

        let (summary, rows) = run(temp_dir.path(), &[input], false);
        assert!(rows.is_empty());
        assert_eq!(summary.outcome, Outcome::EmptyResult);
        assert_eq!(
            summary.output_csv,
            Some(temp_dir.path().join(CALL_LOG_FILE))
        );
    }
}
