//! Streaming XML reader for backup files
//!
//! Backup files can be several gigabytes (MMS parts carry base64 media in
//! attributes), so they are never loaded whole. `XmlStream` pulls one
//! element at a time and hands out owned, unescaped attributes.
//!
//! Lifecycle per input file: `Open` → `Streaming` → `Closed`.

use crate::core::error::{ExtractionError, Result};
use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Read buffer for backup files
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Phase of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// Opened, nothing read yet
    Open,
    /// At least one event read
    Streaming,
    /// End of file reached, or stopped on an unrecoverable error
    Closed,
}

/// A start or self-closing tag with its attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Unescaped attributes in document order
    pub attributes: Vec<(String, String)>,
    pub self_closing: bool,
}

impl Element {
    /// Attribute value, as written
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value, with `""` and `"null"` treated as absent
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.attr(key).filter(|v| !v.is_empty() && *v != "null")
    }
}

/// One step of the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    Open(Element),
    Close(String),
    /// Element whose attributes could not be read
    Malformed {
        name: String,
        reason: String,
        self_closing: bool,
    },
}

/// Pull parser over one backup file
pub struct XmlStream<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    phase: StreamPhase,
    label: String,
    syntax_errors: usize,
}

impl XmlStream<BufReader<File>> {
    /// Open a backup file
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ExtractionError::InputError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
        Ok(Self::from_reader(reader, &path.display().to_string()))
    }
}

impl<R: BufRead> XmlStream<R> {
    /// Stream from any buffered reader; `label` names it in log messages
    pub fn from_reader(reader: R, label: &str) -> Self {
        let mut reader = Reader::from_reader(reader);
        reader.trim_text(true);
        reader.check_end_names(false);

        Self {
            reader,
            buf: Vec::new(),
            phase: StreamPhase::Open,
            label: label.to_string(),
            syntax_errors: 0,
        }
    }

    /// Current phase
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Syntax errors seen so far
    pub fn syntax_errors(&self) -> usize {
        self.syntax_errors
    }

    /// Next element event, or `None` once the stream is closed
    pub fn next_event(&mut self) -> Option<XmlEvent> {
        loop {
            if self.phase == StreamPhase::Closed {
                return None;
            }
            self.phase = StreamPhase::Streaming;

            let before = self.reader.buffer_position();
            self.buf.clear();

            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(ref e)) => Some(element_event(e, false)),
                Ok(Event::Empty(ref e)) => Some(element_event(e, true)),
                Ok(Event::End(ref e)) => Some(XmlEvent::Close(
                    String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                )),
                Ok(Event::Eof) => {
                    debug!("Finished streaming {}", self.label);
                    self.phase = StreamPhase::Closed;
                    return None;
                }
                Ok(_) => None,
                Err(e) => {
                    self.syntax_errors += 1;
                    let position = self.reader.buffer_position();
                    warn!(
                        "XML error in {} at position {}: {}",
                        self.label, position, e
                    );
                    if position <= before {
                        warn!("Cannot resume reading {}, closing it early", self.label);
                        self.phase = StreamPhase::Closed;
                        return None;
                    }
                    None
                }
            };

            if event.is_some() {
                return event;
            }
        }
    }
}

fn element_event(start: &BytesStart, self_closing: bool) -> XmlEvent {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();

    for attr in start.attributes() {
        match attr {
            Ok(attr) => {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                let raw = String::from_utf8_lossy(&attr.value);
                attributes.push((key, unescape_value(&raw).into_owned()));
            }
            Err(e) => {
                return XmlEvent::Malformed {
                    name,
                    reason: e.to_string(),
                    self_closing,
                }
            }
        }
    }

    XmlEvent::Open(Element {
        name,
        attributes,
        self_closing,
    })
}

/// Unescape an attribute value
///
/// Strict XML unescaping first; values quick-xml rejects (the backup app
/// writes emoji as UTF-16 surrogate pairs, `&#55357;&#56832;`) go through
/// [`unescape_lenient`].
pub fn unescape_value(raw: &str) -> Cow<'_, str> {
    match quick_xml::escape::unescape(raw) {
        Ok(value) => value,
        Err(_) => Cow::Owned(unescape_lenient(raw)),
    }
}

/// Unescape predefined entities and character references, joining
/// surrogate pairs; lone surrogates become U+FFFD and unknown entities are
/// kept verbatim.
pub fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut high: Option<u32> = None;
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        if amp > 0 {
            flush_surrogate(&mut out, &mut high);
            out.push_str(&rest[..amp]);
        }
        let after = &rest[amp + 1..];

        let Some(semi) = after.find(';') else {
            flush_surrogate(&mut out, &mut high);
            out.push('&');
            rest = after;
            continue;
        };

        let entity = &after[..semi];
        match decode_reference(entity) {
            Some(code @ 0xD800..=0xDBFF) => {
                flush_surrogate(&mut out, &mut high);
                high = Some(code);
            }
            Some(low @ 0xDC00..=0xDFFF) => match high.take() {
                Some(hi) => {
                    let code = 0x10000 + ((hi - 0xD800) << 10) + (low - 0xDC00);
                    out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
                None => out.push(char::REPLACEMENT_CHARACTER),
            },
            Some(code) => {
                flush_surrogate(&mut out, &mut high);
                out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            None => {
                flush_surrogate(&mut out, &mut high);
                out.push('&');
                out.push_str(entity);
                out.push(';');
            }
        }
        rest = &after[semi + 1..];
    }

    if !rest.is_empty() {
        flush_surrogate(&mut out, &mut high);
        out.push_str(rest);
    }
    flush_surrogate(&mut out, &mut high);
    out
}

fn flush_surrogate(out: &mut String, high: &mut Option<u32>) {
    if high.take().is_some() {
        out.push(char::REPLACEMENT_CHARACTER);
    }
}

fn decode_reference(entity: &str) -> Option<u32> {
    match entity {
        "amp" => Some('&' as u32),
        "lt" => Some('<' as u32),
        "gt" => Some('>' as u32),
        "quot" => Some('"' as u32),
        "apos" => Some('\'' as u32),
        _ => {
            let number = entity.strip_prefix('#')?;
            match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => number.parse().ok(),
            }
        }
    }
}
