//! vCard property parser
//!
//! Streams `.vcf` files block by block (`BEGIN:VCARD` … `END:VCARD`) and
//! splits each logical line into group, name, parameters and raw value.
//! Supports vCard 2.1, 3.0 and 4.0:
//!
//! - folded lines (continuation lines starting with a space or tab)
//! - 2.1 quoted-printable soft line breaks (`=` at the end of a line)
//! - 2.1 bare parameters (`PHOTO;JPEG;BASE64:...`)
//!
//! Values are kept raw here; decoding happens in [`super::fields`] and
//! [`super::multimedia`].

use super::fields;
use log::warn;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufRead};

/// Parameter keys normalized to upper case
const KNOWN_PARAMETERS: [&str; 4] = ["ENCODING", "CHARSET", "TYPE", "VALUE"];

/// Bare 2.1 parameters that name an encoding
const BARE_ENCODINGS: [&str; 5] = ["BASE64", "B", "QUOTED-PRINTABLE", "8BIT", "7BIT"];

/// Properties that carry media
pub const MULTIMEDIA_PROPERTIES: [&str; 4] = ["PHOTO", "LOGO", "SOUND", "KEY"];

/// A line that could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based physical line where the logical line starts
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// One property line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcfProperty {
    /// `item1` in `item1.TEL:...`
    pub group: Option<String>,
    /// Upper-cased property name
    pub name: String,
    pub parameters: BTreeMap<String, String>,
    /// Value as written (after unfolding)
    pub raw_value: String,
}

impl VcfProperty {
    /// Parameter value, key matched case-insensitively
    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_base64(&self) -> bool {
        self.param("ENCODING")
            .map(|e| e.eq_ignore_ascii_case("BASE64") || e.eq_ignore_ascii_case("B"))
            .unwrap_or(false)
    }

    pub fn is_quoted_printable(&self) -> bool {
        self.param("ENCODING")
            .map(|e| e.eq_ignore_ascii_case("QUOTED-PRINTABLE"))
            .unwrap_or(false)
    }

    /// Values of the TYPE parameter
    pub fn types(&self) -> Vec<String> {
        self.param("TYPE")
            .map(|t| {
                t.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// PHOTO, LOGO, SOUND or KEY
    pub fn is_multimedia(&self) -> bool {
        MULTIMEDIA_PROPERTIES.contains(&self.name.as_str())
    }
}

/// One contact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactRecord {
    /// Decoded FN
    pub formatted_name: Option<String>,
    pub version: Option<String>,
    /// Every property in file order
    pub properties: Vec<VcfProperty>,
}

impl ContactRecord {
    /// FN, or a name assembled from N
    pub fn display_name(&self) -> Option<String> {
        if let Some(name) = self.formatted_name.as_deref() {
            if !name.trim().is_empty() {
                return Some(name.trim().to_string());
            }
        }

        let n = self.property("N")?;
        let name = fields::parse_name(n);
        let assembled = [
            name.prefix,
            name.given,
            name.additional,
            name.family,
            name.suffix,
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        if assembled.is_empty() {
            None
        } else {
            Some(assembled)
        }
    }

    /// First property named `name`
    pub fn property(&self, name: &str) -> Option<&VcfProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// All properties named `name`
    pub fn properties_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a VcfProperty> {
        self.properties.iter().filter(move |p| p.name == name)
    }

    /// PHOTO/LOGO/SOUND/KEY properties
    pub fn multimedia(&self) -> impl Iterator<Item = &VcfProperty> {
        self.properties.iter().filter(|p| p.is_multimedia())
    }
}

/// Raw lines of one `BEGIN:VCARD` … `END:VCARD` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcardBlock {
    /// Line of the BEGIN
    pub start_line: usize,
    /// Logical (unfolded) lines between BEGIN and END, with line numbers
    pub lines: Vec<(usize, String)>,
    /// False if the file ended before END:VCARD
    pub terminated: bool,
}

/// A contact and the warnings raised while parsing it
#[derive(Debug, Clone, Default)]
pub struct ParsedContact {
    pub contact: ContactRecord,
    pub warnings: Vec<ParseWarning>,
}

/// Streaming iterator over the vCard blocks of a file
pub struct VcfReader<R: BufRead> {
    reader: R,
    line_no: usize,
    /// Physical line read ahead while unfolding
    pending: Option<(usize, String)>,
    current: Option<VcardBlock>,
    finished: bool,
}

impl<R: BufRead> VcfReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            pending: None,
            current: None,
            finished: false,
        }
    }

    fn read_physical(&mut self) -> io::Result<Option<(usize, String)>> {
        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        self.line_no += 1;
        Ok(Some((
            self.line_no,
            String::from_utf8_lossy(&buf).into_owned(),
        )))
    }

    fn next_logical(&mut self) -> io::Result<Option<(usize, String)>> {
        let (start, mut line) = match self.pending.take() {
            Some(pending) => pending,
            None => match self.read_physical()? {
                Some(physical) => physical,
                None => return Ok(None),
            },
        };

        while let Some((no, next)) = self.read_physical()? {
            if !join_continuation(&mut line, &next) {
                self.pending = Some((no, next));
                break;
            }
        }
        Ok(Some((start, line)))
    }
}

impl<R: BufRead> Iterator for VcfReader<R> {
    type Item = io::Result<VcardBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let (no, line) = match self.next_logical() {
                Ok(Some(logical)) => logical,
                Ok(None) => {
                    self.finished = true;
                    return self.current.take().map(|block| {
                        warn!(
                            "vCard starting at line {} has no END:VCARD",
                            block.start_line
                        );
                        Ok(block)
                    });
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };

            let trimmed = line.trim();
            if trimmed.eq_ignore_ascii_case("BEGIN:VCARD") {
                let started = VcardBlock {
                    start_line: no,
                    lines: Vec::new(),
                    terminated: false,
                };
                if let Some(previous) = self.current.replace(started) {
                    warn!(
                        "vCard starting at line {} has no END:VCARD",
                        previous.start_line
                    );
                    return Some(Ok(previous));
                }
            } else if trimmed.eq_ignore_ascii_case("END:VCARD") {
                if let Some(mut block) = self.current.take() {
                    block.terminated = true;
                    return Some(Ok(block));
                }
            } else if let Some(block) = self.current.as_mut() {
                if !trimmed.is_empty() {
                    block.lines.push((no, line));
                }
            }
        }
    }
}

/// Join folded lines into logical lines
pub fn unfold_lines<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut logical: Vec<String> = Vec::new();
    for line in lines {
        let line: String = line.into();
        let joined = match logical.last_mut() {
            Some(last) => join_continuation(last, &line),
            None => false,
        };
        if !joined {
            logical.push(line);
        }
    }
    logical
}

/// Append `next` to `line` if it continues it
///
/// A continuation is a folded line (leading space or tab, which is
/// dropped) or any line after a quoted-printable soft line break.
fn join_continuation(line: &mut String, next: &str) -> bool {
    let folded = next.strip_prefix([' ', '\t']);
    if has_soft_line_break(line) {
        line.pop();
        line.push_str(folded.unwrap_or(next));
        return true;
    }
    match folded {
        Some(rest) => {
            line.push_str(rest);
            true
        }
        None => false,
    }
}

/// Quoted-printable line ending in `=`
fn has_soft_line_break(line: &str) -> bool {
    if !line.ends_with('=') {
        return false;
    }
    match find_unquoted(line, ':') {
        Some(colon) => line[..colon]
            .to_ascii_uppercase()
            .contains("QUOTED-PRINTABLE"),
        None => false,
    }
}

/// Byte index of the first `needle` outside double quotes
fn find_unquoted(s: &str, needle: char) -> Option<usize> {
    let mut in_quotes = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c == needle && !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

/// Split on `sep` outside double quotes
fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(idx) = find_unquoted(rest, sep) {
        parts.push(&rest[..idx]);
        rest = &rest[idx + sep.len_utf8()..];
    }
    parts.push(rest);
    parts
}

fn strip_quotes(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn add_parameter(parameters: &mut BTreeMap<String, String>, key: String, value: &str) {
    parameters
        .entry(key)
        .and_modify(|existing| {
            existing.push(',');
            existing.push_str(value);
        })
        .or_insert_with(|| value.to_string());
}

/// Parse one logical line
pub fn parse_property(line: &str, line_no: usize) -> Result<VcfProperty, ParseWarning> {
    let warning = |message: String| ParseWarning {
        line: line_no,
        message,
    };

    let colon = find_unquoted(line, ':')
        .ok_or_else(|| warning(format!("missing ':' separator in {:?}", preview(line))))?;
    let (head, raw_value) = (&line[..colon], &line[colon + 1..]);

    let mut segments = split_unquoted(head, ';').into_iter();
    let full_name = segments.next().unwrap_or_default().trim();
    let (group, name) = match full_name.split_once('.') {
        Some((group, name)) => (Some(group.to_string()), name),
        None => (None, full_name),
    };

    if name.is_empty() {
        return Err(warning(format!("empty property name in {:?}", preview(line))));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(warning(format!("invalid property name {:?}", preview(name))));
    }

    let mut parameters = BTreeMap::new();
    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        match segment.split_once('=') {
            Some((key, value)) => {
                let key = key.trim();
                let upper = key.to_ascii_uppercase();
                let key = if KNOWN_PARAMETERS.contains(&upper.as_str()) {
                    upper
                } else {
                    key.to_string()
                };
                add_parameter(&mut parameters, key, strip_quotes(value));
            }
            None => {
                let upper = segment.to_ascii_uppercase();
                if BARE_ENCODINGS.contains(&upper.as_str()) {
                    parameters.insert("ENCODING".to_string(), upper);
                } else {
                    add_parameter(&mut parameters, "TYPE".to_string(), strip_quotes(segment));
                }
            }
        }
    }

    Ok(VcfProperty {
        group,
        name: name.to_ascii_uppercase(),
        parameters,
        raw_value: raw_value.to_string(),
    })
}

/// Parse every line of a block
pub fn parse_block(block: &VcardBlock) -> ParsedContact {
    let mut parsed = ParsedContact::default();

    if !block.terminated {
        parsed.warnings.push(ParseWarning {
            line: block.start_line,
            message: "vCard is not terminated by END:VCARD".to_string(),
        });
    }

    for (no, line) in &block.lines {
        match parse_property(line, *no) {
            Ok(property) => {
                match property.name.as_str() {
                    "FN" => {
                        let name = fields::decode_text(&property);
                        if !name.trim().is_empty() {
                            parsed.contact.formatted_name = Some(name);
                        }
                    }
                    "VERSION" => {
                        parsed.contact.version = Some(property.raw_value.trim().to_string())
                    }
                    _ => {}
                }
                parsed.contact.properties.push(property);
            }
            Err(warning) => parsed.warnings.push(warning),
        }
    }

    parsed
}

/// First characters of a line, for messages (base64 lines can be huge)
fn preview(line: &str) -> String {
    const MAX: usize = 40;
    if line.chars().count() <= MAX {
        line.to_string()
    } else {
        format!("{}...", line.chars().take(MAX).collect::<String>())
    }
}
