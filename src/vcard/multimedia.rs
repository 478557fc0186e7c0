//! Multimedia vCard properties
//!
//! PHOTO, LOGO, SOUND and KEY carry their content in one of three ways:
//! base64 in the value (including 4.0 `data:` URIs), a URL to fetch, or
//! the value text itself. [`resolve`] turns any of them into bytes plus a
//! file extension.

use super::fetch::Fetcher;
use super::parser::VcfProperty;
use crate::backup::mime::{decode_base64, extension_for_mime, normalize_mime};
use crate::core::error::{ExtractionError, Result};

/// URL schemes fetched remotely
const REMOTE_SCHEMES: [&str; 3] = ["http://", "https://", "ftp://"];

/// Longest URL path suffix taken as an extension
const MAX_URL_EXTENSION: usize = 5;

/// Content of a multimedia property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub bytes: Vec<u8>,
    /// Without the dot
    pub extension: String,
}

/// Where the content of a property lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source<'a> {
    /// `data:<mime>[;base64],<payload>`
    DataUri { mime: &'a str, base64: bool, payload: &'a str },
    Base64(&'a str),
    Remote(&'a str),
    Inline(&'a str),
}

fn classify(property: &VcfProperty) -> Source<'_> {
    let value = property.raw_value.trim();

    if starts_with_ignore_case(value, "data:") {
        if let Some((header, payload)) = value[5..].split_once(',') {
            let mut pieces = header.split(';');
            let mime = pieces.next().unwrap_or_default();
            let base64 = pieces.any(|p| p.eq_ignore_ascii_case("base64"));
            return Source::DataUri {
                mime,
                base64,
                payload,
            };
        }
    }
    if property.is_base64() {
        return Source::Base64(value);
    }
    if REMOTE_SCHEMES
        .iter()
        .any(|scheme| starts_with_ignore_case(value, scheme))
    {
        return Source::Remote(value);
    }
    Source::Inline(&property.raw_value)
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

/// Bytes and extension of a PHOTO/LOGO/SOUND/KEY property
pub fn resolve(property: &VcfProperty, fetcher: &dyn Fetcher) -> Result<ResolvedMedia> {
    if !property.is_multimedia() {
        return Err(ExtractionError::Parse(format!(
            "{} is not a multimedia property",
            property.name
        )));
    }

    match classify(property) {
        Source::DataUri {
            mime,
            base64,
            payload,
        } => {
            let bytes = if base64 {
                decode_base64(payload)?
            } else {
                payload.as_bytes().to_vec()
            };
            let mime = normalize_mime(mime);
            let extension = if mime.contains('/') {
                extension_for_mime(&mime)
            } else {
                type_extension(property).unwrap_or_else(|| "bin".to_string())
            };
            Ok(ResolvedMedia { bytes, extension })
        }
        Source::Base64(value) => Ok(ResolvedMedia {
            bytes: decode_base64(value)?,
            extension: type_extension(property).unwrap_or_else(|| "bin".to_string()),
        }),
        Source::Remote(url) => {
            let fetched = fetcher.fetch(url)?;
            let extension = fetched
                .content_type
                .as_deref()
                .filter(|ct| ct.contains('/') && *ct != "application/octet-stream")
                .map(extension_for_mime)
                .or_else(|| url_extension(url))
                .or_else(|| type_extension(property))
                .unwrap_or_else(|| "bin".to_string());
            Ok(ResolvedMedia {
                bytes: fetched.bytes,
                extension,
            })
        }
        Source::Inline(value) => Ok(ResolvedMedia {
            bytes: value.as_bytes().to_vec(),
            extension: type_extension(property).unwrap_or_else(|| "txt".to_string()),
        }),
    }
}

/// Extension named by the TYPE parameter (`JPEG`, `image/png`, `X509`, ...)
pub fn type_extension(property: &VcfProperty) -> Option<String> {
    let declared = property
        .param("MEDIATYPE")
        .map(str::to_string)
        .or_else(|| property.types().into_iter().next())?;
    let declared = declared.trim().to_ascii_lowercase();

    if declared.contains('/') {
        return Some(extension_for_mime(&normalize_mime(&declared)));
    }

    let known = match declared.as_str() {
        "jpeg" | "jpg" | "pjpeg" => "jpg",
        "tiff" | "tif" => "tif",
        "x509" => "crt",
        "pgp" => "pgp",
        "wave" | "wav" => "wav",
        "mpeg" | "mp3" => "mp3",
        "quicktime" => "mov",
        other => {
            let cleaned: String = other
                .trim_start_matches("x-")
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect();
            if cleaned.is_empty() {
                return None;
            }
            return Some(cleaned);
        }
    };
    Some(known.to_string())
}

/// Extension of the last path segment of a URL
fn url_extension(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let path = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let (_, path) = path.split_once('/')?;
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;

    let valid = !ext.is_empty()
        && ext.len() <= MAX_URL_EXTENSION
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    if !valid {
        return None;
    }
    let ext = ext.to_ascii_lowercase();
    Some(if ext == "jpeg" { "jpg".to_string() } else { ext })
}
