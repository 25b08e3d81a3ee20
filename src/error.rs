//! Error types for locator decoding, fetching, extraction and crawl tasks
//!
//! Every error that can happen while a single task moves through the crawl is
//! folded into [`TaskError`]. Task errors are reported and counted, they never
//! abort the crawl as a whole.

use std::path::PathBuf;

/// Errors produced by the URL codec
///
/// Decoding is pure string parsing, so these errors describe the input,
/// never the filesystem or the network.
///
/// # Examples
///
/// ```ignore
/// use cachecrawl::{LocatorError, sites};
///
/// let codec = sites::nameberry_profile("/tmp/cache").codec()?;
/// match codec.decode_str("") {
///     Err(LocatorError::EmptyPath) => {}
///     other => panic!("unexpected: {:?}", other),
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocatorError {
    /// The locator had no usable name segment
    #[error("Locator has an empty path")]
    EmptyPath,

    /// The locator used a scheme other than http, https or file
    #[error("Unsupported scheme in locator '{locator}'")]
    UnsupportedScheme { locator: String },

    /// The remote URL could not be parsed
    #[error("Invalid URL '{locator}': {error}")]
    InvalidUrl { locator: String, error: String },

    /// The remote URL does not live under the site's base URL
    #[error("URL '{locator}' is not under '{base}'")]
    ForeignHost { locator: String, base: String },

    /// The key cannot be encoded without breaking the round trip
    #[error("Key '{name}' cannot be encoded: {reason}")]
    InvalidKey { name: String, reason: &'static str },

    /// The cache file name lacks the site's file prefix
    #[error("Cache file '{locator}' does not start with '{prefix}'")]
    ForeignFile { locator: String, prefix: String },
}

/// Errors that can occur while fetching page bytes
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// A cached file could not be read
    #[error("Failed to read cached file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote fetch was refused because the crawl runs local-only
    #[error("Remote fetch of {url} refused in local-only mode")]
    LocalOnly { url: String },
}

/// Errors raised by page extractors
///
/// A page that was fetched but does not have the expected shape produces one
/// of these. The page stays cached so it can be re-extracted offline.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// A required field's selector matched nothing
    #[error("Required field '{field}' not found using selector '{selector}'")]
    MissingField { field: String, selector: String },

    /// A CSS selector failed to parse
    #[error("Failed to parse selector '{selector}': {error}")]
    InvalidSelector { selector: String, error: String },

    /// An embedded JSON block could not be decoded
    #[error("Invalid embedded JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure while writing a cache file
#[derive(Debug, thiserror::Error)]
#[error("Failed to persist {}: {source}", path.display())]
pub struct PersistError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Errors that can occur during crawler configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Crawling concurrency must be greater than 0
    #[error("Crawling concurrency must be greater than 0, got {0}")]
    InvalidCrawlingConcurrency(usize),

    /// Processing concurrency must be greater than 0
    #[error("Processing concurrency must be greater than 0, got {0}")]
    InvalidProcessingConcurrency(usize),

    /// Per-host concurrency must be greater than 0
    #[error("Per-host concurrency must be greater than 0, got {0}")]
    InvalidPerHostConcurrency(usize),

    /// Queue multiplier must be greater than 0
    #[error("Queue multiplier must be greater than 0, got {0}")]
    InvalidQueueMultiplier(usize),

    /// Rate limit must be a positive number of requests per second
    #[error("Rate limit must be positive, got {0}")]
    InvalidRateLimit(f64),

    /// No route was registered for a handler
    #[error("No route registered for handler '{0}'")]
    UnknownHandler(String),

    /// The default HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    /// The settings file could not be read
    #[error("Failed to read settings {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for [`crate::Settings`]
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors raised while loading seed names
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Failed to read seeds {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Seeds must be a JSON array of names or {{\"name\": ...}} objects: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Error that ends a single crawl task
///
/// The crawler records the task's key next to the error and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The task's locator, or a link found on its page, could not be decoded
    #[error("Malformed locator: {0}")]
    MalformedLocator(#[from] LocatorError),

    /// Network or cache read failure; nothing was persisted
    #[error("Fetch failed: {0}")]
    FetchFailure(#[from] FetchError),

    /// The page was fetched (and cached) but the expected fields are missing
    #[error("Extraction mismatch: {0}")]
    ExtractionMismatch(#[from] ExtractError),

    /// The fetched page could not be written to the cache
    #[error("Cache write failed: {0}")]
    Persist(#[from] PersistError),
}

impl TaskError {
    /// Short label used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedLocator(_) => "malformed_locator",
            Self::FetchFailure(_) => "fetch_failure",
            Self::ExtractionMismatch(_) => "extraction_mismatch",
            Self::Persist(_) => "persist",
        }
    }
}
