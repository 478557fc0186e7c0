//! MIME filtering and payload decoding for MMS parts

use crate::core::config::MediaConfig;
use crate::core::error::{ExtractionError, Result};
use base64::alphabet;
use base64::engine::general_purpose::GeneralPurposeConfig;
use base64::engine::{DecodePaddingMode, GeneralPurpose};
use base64::Engine;

/// Standard alphabet, padding optional on decode
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Exportable media categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCategory {
    Image,
    Video,
    Audio,
    Pdf,
}

impl MediaCategory {
    /// Whether the category is switched on
    pub fn enabled_in(&self, media: &MediaConfig) -> bool {
        match self {
            MediaCategory::Image => media.include_images,
            MediaCategory::Video => media.include_videos,
            MediaCategory::Audio => media.include_audio,
            MediaCategory::Pdf => media.include_pdfs,
        }
    }
}

/// Lowercase a content type and drop parameters (`; name=...`)
pub fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Category of a normalized mime type, if it is exportable at all
pub fn categorize(mime: &str) -> Option<MediaCategory> {
    let (kind, subtype) = mime.split_once('/')?;
    if subtype.is_empty() {
        return None;
    }
    match kind {
        "image" => Some(MediaCategory::Image),
        "video" => Some(MediaCategory::Video),
        "audio" => Some(MediaCategory::Audio),
        "application" if subtype == "pdf" => Some(MediaCategory::Pdf),
        _ => None,
    }
}

/// File extension for a normalized mime type
///
/// Well-known subtypes map to their usual extension; anything else uses
/// the subtype itself (reduced to file-name-safe characters), then `bin`.
pub fn extension_for_mime(mime: &str) -> String {
    let Some((kind, subtype)) = mime.split_once('/') else {
        return "bin".to_string();
    };

    let known = match (kind, subtype) {
        (_, "jpeg" | "jpg" | "pjpeg") => Some("jpg"),
        (_, "svg+xml") => Some("svg"),
        (_, "x-icon" | "vnd.microsoft.icon") => Some("ico"),
        (_, "quicktime") => Some("mov"),
        (_, "x-ms-wmv") => Some("wmv"),
        (_, "x-flv") => Some("flv"),
        (_, "x-msvideo") => Some("avi"),
        (_, "3gpp") => Some("3gp"),
        (_, "3gpp2") => Some("3g2"),
        ("audio", "mpeg" | "mp3") => Some("mp3"),
        ("video", "mpeg") => Some("mpg"),
        ("audio", "mp4" | "x-m4a") => Some("m4a"),
        ("audio", "x-wav" | "wave") => Some("wav"),
        ("audio", "amr") => Some("amr"),
        ("text", "plain") => Some("txt"),
        ("text", "x-vcard" | "vcard") => Some("vcf"),
        _ => None,
    };
    if let Some(ext) = known {
        return ext.to_string();
    }

    let cleaned: String = subtype
        .trim_start_matches("x-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if cleaned.is_empty() || cleaned == "*" {
        "bin".to_string()
    } else {
        cleaned
    }
}

/// Decode base64 leniently: whitespace ignored, padding optional
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    LENIENT_BASE64
        .decode(compact.as_bytes())
        .map_err(|e| ExtractionError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mime() {
        assert_eq!(normalize_mime("Image/JPEG"), "image/jpeg");
        assert_eq!(normalize_mime("image/png; name=a.png"), "image/png");
        assert_eq!(normalize_mime(""), "");
    }

    #[test]
    fn test_categorize() {
        assert_eq!(categorize("image/heic"), Some(MediaCategory::Image));
        assert_eq!(categorize("video/mp4"), Some(MediaCategory::Video));
        assert_eq!(categorize("audio/amr"), Some(MediaCategory::Audio));
        assert_eq!(categorize("application/pdf"), Some(MediaCategory::Pdf));
        assert_eq!(categorize("application/smil"), None);
        assert_eq!(categorize("text/plain"), None);
        assert_eq!(categorize("image/"), None);
        assert_eq!(categorize("garbage"), None);
    }

    #[test]
    fn test_category_toggles() {
        let media = MediaConfig {
            include_videos: false,
            ..MediaConfig::default()
        };
        assert!(MediaCategory::Image.enabled_in(&media));
        assert!(!MediaCategory::Video.enabled_in(&media));
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/png"), "png");
        assert_eq!(extension_for_mime("video/quicktime"), "mov");
        assert_eq!(extension_for_mime("audio/mpeg"), "mp3");
        assert_eq!(extension_for_mime("video/3gpp"), "3gp");
        assert_eq!(extension_for_mime("application/pdf"), "pdf");
        assert_eq!(extension_for_mime("image/x-portable-pixmap"), "portablepixmap");
        assert_eq!(extension_for_mime("image/*"), "bin");
        assert_eq!(extension_for_mime("nonsense"), "bin");
    }

    #[test]
    fn test_decode_base64_lenient() {
        assert_eq!(decode_base64("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_base64("aGVsbG8").unwrap(), b"hello");
        assert_eq!(decode_base64("aGVs\nbG8=\r\n").unwrap(), b"hello");
        assert!(decode_base64("").unwrap().is_empty());
        assert!(matches!(
            decode_base64("not*base64!"),
            Err(ExtractionError::Decode(_))
        ));
    }
}
