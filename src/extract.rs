//! Extractor seam between the crawl core and page-specific selectors
//!
//! The core hands an [`Extractor`] the raw bytes of a page together with the
//! key it was fetched for. The extractor answers with one of three outcomes:
//! a record, a definitive "no record", or a list of links that must be
//! visited instead of (or in addition to) this page.

use scraper::Html;

use crate::codec::ResourceLocator;
use crate::error::ExtractError;
use crate::key::EntityKey;

/// Field name to value mapping produced by an extractor
pub type Record = serde_json::Map<String, serde_json::Value>;

/// A fetched page body
#[derive(Debug, Clone)]
pub struct Page {
    locator: ResourceLocator,
    body: Vec<u8>,
}

impl Page {
    pub fn new(locator: ResourceLocator, body: Vec<u8>) -> Self {
        Self { locator, body }
    }

    /// Where the bytes came from
    pub fn locator(&self) -> &ResourceLocator {
        &self.locator
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the body as an HTML document
    pub fn document(&self) -> Html {
        Html::parse_document(&self.text())
    }
}

/// A link discovered on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// Already decoded key
    Key(EntityKey),
    /// Absolute URL still to be decoded by the follow handler's codec
    Url(String),
}

impl From<EntityKey> for Link {
    fn from(key: EntityKey) -> Self {
        Link::Key(key)
    }
}

/// Outcome of extracting one page
#[derive(Debug, Clone)]
pub enum Extraction {
    /// The page holds the target content
    Record(Record),
    /// The site says the entity does not exist
    NoRecord,
    /// The page is an anchor or listing page; visit these links instead
    NeedsExpansion(Vec<Link>),
}

/// Page-specific field extraction
///
/// # Example
///
/// ```ignore
/// use cachecrawl::{Extractor, Extraction, Page, EntityKey, ExtractError, Record};
///
/// struct TitleExtractor;
///
/// impl Extractor for TitleExtractor {
///     fn extract(&self, page: &Page, key: &EntityKey) -> Result<Extraction, ExtractError> {
///         let mut record = Record::new();
///         record.insert("name".into(), key.name().into());
///         record.insert("bytes".into(), page.body().len().into());
///         Ok(Extraction::Record(record))
///     }
/// }
/// ```
pub trait Extractor: Send + Sync {
    /// Classify `page`, fetched for `key`, and pull out its fields
    fn extract(&self, page: &Page, key: &EntityKey) -> Result<Extraction, ExtractError>;
}

impl<F> Extractor for F
where
    F: Fn(&Page, &EntityKey) -> Result<Extraction, ExtractError> + Send + Sync,
{
    fn extract(&self, page: &Page, key: &EntityKey) -> Result<Extraction, ExtractError> {
        self(page, key)
    }
}
