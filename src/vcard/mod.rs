//! vCard contact extraction
//!
//! # Submodules
//!
//! - `parser` - Block splitting, unfolding and property-line parsing
//! - `fields` - Typed decoders for N, ADR, TEL, EMAIL, ORG, GEO, CATEGORIES
//! - `fetch` - Fetching media referenced by URL
//! - `multimedia` - PHOTO/LOGO/SOUND/KEY to bytes and extension
//! - `contacts` - The contacts extractor

pub mod contacts;
pub mod fetch;
pub mod fields;
pub mod multimedia;
pub mod parser;

pub use contacts::ContactsVcardExtractor;
pub use fetch::{DisabledFetcher, FetchedResource, Fetcher, HttpFetcher};
pub use parser::{ContactRecord, VcfProperty, VcfReader};
