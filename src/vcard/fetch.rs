//! Remote resources referenced by vCard properties
//!
//! Contacts may point at their photo or key by URL instead of embedding
//! it. Fetching goes through the [`Fetcher`] trait so the extractor can
//! run offline and tests can substitute canned responses.

use crate::core::error::{ExtractionError, Result};
use log::debug;
use std::io::Read;
use std::time::Duration;

/// Downloads larger than this are refused
pub const MAX_FETCH_BYTES: u64 = 64 * 1024 * 1024;

/// Body and declared type of a fetched URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    pub bytes: Vec<u8>,
    /// `Content-Type` without parameters, lower-cased
    pub content_type: Option<String>,
}

/// Retrieves the content behind a URL
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<FetchedResource>;
}

/// Blocking HTTP(S) fetcher
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| ExtractionError::IoError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedResource> {
        let fetch_error = |message: String| ExtractionError::Fetch {
            url: url.to_string(),
            message,
        };

        debug!("Fetching {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| fetch_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(format!("HTTP {}", status)));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase()
            })
            .filter(|v| !v.is_empty());

        let mut bytes = Vec::new();
        response
            .take(MAX_FETCH_BYTES + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| fetch_error(e.to_string()))?;
        if bytes.len() as u64 > MAX_FETCH_BYTES {
            return Err(fetch_error(format!(
                "response larger than {} bytes",
                MAX_FETCH_BYTES
            )));
        }

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(FetchedResource {
            bytes,
            content_type,
        })
    }
}

/// Refuses every URL (offline runs)
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledFetcher;

impl Fetcher for DisabledFetcher {
    fn fetch(&self, url: &str) -> Result<FetchedResource> {
        Err(ExtractionError::Fetch {
            url: url.to_string(),
            message: "remote fetching is disabled".to_string(),
        })
    }
}
