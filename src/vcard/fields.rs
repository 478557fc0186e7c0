//! Typed vCard fields
//!
//! Decoders for the structured text properties (N, ADR, EMAIL, TEL, ORG,
//! GEO, CATEGORIES). Values go through quoted-printable decoding first
//! when the property declares it, then vCard escape handling.

use super::parser::VcfProperty;
use serde::Serialize;

/// N property
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersonName {
    pub family: String,
    pub given: String,
    pub additional: String,
    pub prefix: String,
    pub suffix: String,
}

/// ADR property
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Address {
    /// First TYPE value, lower-cased (`home`, `work`, ...)
    pub kind: Option<String>,
    pub po_box: String,
    pub extended: String,
    pub street: String,
    pub locality: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
}

impl Address {
    /// Non-empty components joined with `, `
    pub fn one_line(&self) -> String {
        [
            &self.po_box,
            &self.extended,
            &self.street,
            &self.locality,
            &self.region,
            &self.postal_code,
            &self.country,
        ]
        .into_iter()
        .filter(|c| !c.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// EMAIL or TEL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypedValue {
    pub kind: Option<String>,
    pub value: String,
}

/// ORG property
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Organization {
    pub name: String,
    pub units: Vec<String>,
}

/// GEO property
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

/// Decode `=XX` sequences; soft line breaks are already joined by the reader
pub fn decode_quoted_printable(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'=' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// Bytes to text in the declared charset
fn decode_charset(bytes: &[u8], charset: Option<&str>) -> String {
    match charset.map(|c| c.to_ascii_uppercase()) {
        Some(c) if c == "ISO-8859-1" || c == "LATIN1" || c == "WINDOWS-1252" => {
            bytes.iter().map(|&b| b as char).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Undo vCard text escaping (`\n`, `\,`, `\;`, `\\`)
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split on unescaped `sep`, unescaping each component
pub fn split_structured(value: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(unescape_text(&current));
            current.clear();
        } else {
            current.push(c);
        }
    }
    if escaped {
        current.push('\\');
    }
    parts.push(unescape_text(&current));
    parts
}

/// Raw value with any quoted-printable encoding removed
fn transfer_decoded(property: &VcfProperty) -> String {
    if property.is_quoted_printable() {
        let bytes = decode_quoted_printable(&property.raw_value);
        decode_charset(&bytes, property.param("CHARSET"))
    } else {
        property.raw_value.clone()
    }
}

/// Text value, decoded and unescaped
pub fn decode_text(property: &VcfProperty) -> String {
    unescape_text(&transfer_decoded(property)).trim().to_string()
}

fn first_type(property: &VcfProperty) -> Option<String> {
    property
        .types()
        .into_iter()
        .map(|t| t.to_ascii_lowercase())
        .find(|t| t != "pref" && t != "internet" && t != "voice")
}

fn component(parts: &[String], i: usize) -> String {
    parts.get(i).map(|p| p.trim().to_string()).unwrap_or_default()
}

pub fn parse_name(property: &VcfProperty) -> PersonName {
    let parts = split_structured(&transfer_decoded(property), ';');
    PersonName {
        family: component(&parts, 0),
        given: component(&parts, 1),
        additional: component(&parts, 2),
        prefix: component(&parts, 3),
        suffix: component(&parts, 4),
    }
}

pub fn parse_address(property: &VcfProperty) -> Address {
    let parts = split_structured(&transfer_decoded(property), ';');
    Address {
        kind: first_type(property),
        po_box: component(&parts, 0),
        extended: component(&parts, 1),
        street: component(&parts, 2),
        locality: component(&parts, 3),
        region: component(&parts, 4),
        postal_code: component(&parts, 5),
        country: component(&parts, 6),
    }
}

/// EMAIL/TEL with its type label; a `tel:` URI prefix is dropped
pub fn parse_typed_value(property: &VcfProperty) -> TypedValue {
    let text = decode_text(property);
    let value = match text.get(..4) {
        Some(scheme) if scheme.eq_ignore_ascii_case("tel:") => text[4..].to_string(),
        _ => text,
    };
    TypedValue {
        kind: first_type(property),
        value,
    }
}

pub fn parse_organization(property: &VcfProperty) -> Organization {
    let mut parts = split_structured(&transfer_decoded(property), ';')
        .into_iter()
        .map(|p| p.trim().to_string());
    let name = parts.next().unwrap_or_default();
    Organization {
        name,
        units: parts.filter(|u| !u.is_empty()).collect(),
    }
}

/// `lat;lon` (2.1/3.0) or `geo:lat,lon` (4.0)
pub fn parse_geo(property: &VcfProperty) -> Option<GeoPosition> {
    let value = property.raw_value.trim();
    let (lat, lon) = match value.get(..4) {
        Some(scheme) if scheme.eq_ignore_ascii_case("geo:") => {
            let coords = value[4..].split(';').next().unwrap_or_default();
            coords.split_once(',')?
        }
        _ => value.split_once(';').or_else(|| value.split_once(','))?,
    };

    let latitude: f64 = lat.trim().parse().ok()?;
    let longitude: f64 = lon.trim().parse().ok()?;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }
    Some(GeoPosition {
        latitude,
        longitude,
    })
}

/// Sorted category list
pub fn parse_categories(property: &VcfProperty) -> Vec<String> {
    let mut categories: Vec<String> = split_structured(&transfer_decoded(property), ',')
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    categories.sort();
    categories
}
