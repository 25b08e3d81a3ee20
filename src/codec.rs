//! URL codec: entity keys to remote URLs and local cache paths, and back
//!
//! Every site is described by a [`SiteProfile`], a plain data structure that
//! captures how the site lays out its URLs and how pages are named on disk.
//! A [`UrlCodec`] built from a profile provides three operations:
//!
//! - [`UrlCodec::encode_remote`]: key to canonical remote URL
//! - [`UrlCodec::encode_local`]: key to canonical cache file
//! - [`UrlCodec::decode`]: either locator back to the key
//!
//! For every valid key both encodings decode back to the same key.
//!
//! # Examples
//!
//! ```ignore
//! use cachecrawl::{EntityKey, Gender, sites};
//!
//! let codec = sites::nameberry_profile("/cache").codec()?;
//! let key = EntityKey::gendered("Liam", Gender::Girl);
//!
//! let remote = codec.encode_remote(&key)?;
//! assert_eq!(remote.path(), "https://nameberry.com/babyname/Liam/girl");
//!
//! let local = codec.encode_local(&key)?;
//! assert_eq!(local.to_url(), "file:///cache/nameberry/liam-girl.html");
//!
//! assert_eq!(codec.decode(&remote)?, key);
//! assert_eq!(codec.decode(&local)?, key);
//! ```

use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::LocatorError;
use crate::key::{AttributeVocabulary, EntityKey};

const FILE_SCHEME: &str = "file://";

/// Where a locator points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// An http(s) URL
    Remote,
    /// A file in the local cache
    Local,
}

/// Resolved address for fetching content for a key
///
/// Locators are produced by the codec only. For [`Protocol::Remote`] the path
/// is the absolute URL, for [`Protocol::Local`] it is the filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceLocator {
    protocol: Protocol,
    path: String,
}

impl ResourceLocator {
    pub(crate) fn remote(url: impl Into<String>) -> Self {
        Self {
            protocol: Protocol::Remote,
            path: url.into(),
        }
    }

    pub(crate) fn local(path: &Path) -> Self {
        Self {
            protocol: Protocol::Local,
            path: path.to_string_lossy().into_owned(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_local(&self) -> bool {
        self.protocol == Protocol::Local
    }

    pub fn is_remote(&self) -> bool {
        self.protocol == Protocol::Remote
    }

    /// Render as a URL; local locators use the `file://` scheme
    pub fn to_url(&self) -> String {
        match self.protocol {
            Protocol::Remote => self.path.clone(),
            Protocol::Local => format!("{}{}", FILE_SCHEME, self.path),
        }
    }

    /// Host name of a remote locator
    pub fn host(&self) -> Option<String> {
        match self.protocol {
            Protocol::Remote => Url::parse(&self.path)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string)),
            Protocol::Local => None,
        }
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}

/// How the attribute appears in a remote URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeStyle {
    /// Own trailing segment: `/babyname/William/boy`
    Segment,
    /// Dash suffix on the name segment: `/name/william-1`
    #[default]
    DashSuffix,
}

/// Letter case of names in remote URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameCase {
    #[default]
    Lower,
    /// First letter upper-cased: `William`
    Capitalized,
}

impl NameCase {
    pub(crate) fn apply(self, name: &str) -> String {
        match self {
            NameCase::Lower => name.to_string(),
            NameCase::Capitalized => {
                let mut chars = name.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        }
    }
}

fn default_extension() -> String {
    "html".to_string()
}

/// Per-site URL and cache layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteProfile {
    /// Absolute URL that every entity URL extends, e.g. `https://babynames.com/name`
    pub remote_base: String,
    /// Fixed segment after the name, e.g. `rating`
    #[serde(default)]
    pub remote_tail: Option<String>,
    #[serde(default)]
    pub remote_attribute: AttributeStyle,
    #[serde(default)]
    pub remote_case: NameCase,
    /// Directory holding this site's cached pages
    pub cache_dir: PathBuf,
    /// File name prefix, e.g. `index_`
    #[serde(default)]
    pub local_prefix: String,
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub vocabulary: AttributeVocabulary,
}

impl SiteProfile {
    pub fn new(remote_base: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            remote_base: remote_base.into(),
            remote_tail: None,
            remote_attribute: AttributeStyle::default(),
            remote_case: NameCase::default(),
            cache_dir: cache_dir.into(),
            local_prefix: String::new(),
            extension: default_extension(),
            vocabulary: AttributeVocabulary::default(),
        }
    }

    pub fn tail(mut self, tail: impl Into<String>) -> Self {
        self.remote_tail = Some(tail.into());
        self
    }

    pub fn attribute_style(mut self, style: AttributeStyle) -> Self {
        self.remote_attribute = style;
        self
    }

    pub fn case(mut self, case: NameCase) -> Self {
        self.remote_case = case;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.local_prefix = prefix.into();
        self
    }

    pub fn vocabulary(mut self, vocabulary: AttributeVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Build the codec, validating the base URL
    pub fn codec(self) -> Result<UrlCodec, LocatorError> {
        UrlCodec::new(self)
    }
}

/// Bidirectional mapping between [`EntityKey`] and [`ResourceLocator`]
#[derive(Debug, Clone)]
pub struct UrlCodec {
    profile: SiteProfile,
    base: Url,
    base_segments: Vec<String>,
}

impl UrlCodec {
    pub fn new(profile: SiteProfile) -> Result<Self, LocatorError> {
        let base = Url::parse(&profile.remote_base).map_err(|e| LocatorError::InvalidUrl {
            locator: profile.remote_base.clone(),
            error: e.to_string(),
        })?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(LocatorError::UnsupportedScheme {
                locator: profile.remote_base.clone(),
            });
        }
        let base_segments = non_empty_segments(&base);
        Ok(Self {
            profile,
            base,
            base_segments,
        })
    }

    pub fn profile(&self) -> &SiteProfile {
        &self.profile
    }

    pub fn cache_dir(&self) -> &Path {
        &self.profile.cache_dir
    }

    /// Reject keys whose encodings would not decode back to themselves
    pub fn validate(&self, key: &EntityKey) -> Result<(), LocatorError> {
        let invalid = |reason| LocatorError::InvalidKey {
            name: key.name().to_string(),
            reason,
        };
        let name = key.name();
        if name.is_empty() {
            return Err(invalid("empty name"));
        }
        if name.contains(['/', '\\']) {
            return Err(invalid("name contains a path separator"));
        }
        if name.starts_with('.') {
            return Err(invalid("name starts with a dot"));
        }
        if let Some(attribute) = key.attribute()
            && !self.profile.vocabulary.admits(&attribute)
        {
            return Err(invalid("attribute is not part of the site vocabulary"));
        }
        if self.profile.vocabulary.split_dash_suffix(name).1.is_some() {
            return Err(invalid("name ends with an attribute suffix"));
        }
        if self.profile.remote_case.apply(name).to_lowercase() != name {
            return Err(invalid("name does not survive the remote letter case"));
        }
        Ok(())
    }

    /// Canonical remote URL for `key`
    pub fn encode_remote(&self, key: &EntityKey) -> Result<ResourceLocator, LocatorError> {
        self.validate(key)?;
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| LocatorError::UnsupportedScheme {
                    locator: self.profile.remote_base.clone(),
                })?;
            segments.pop_if_empty();
            let name = self.profile.remote_case.apply(key.name());
            match (key.attribute(), self.profile.remote_attribute) {
                (Some(attribute), AttributeStyle::Segment) => {
                    segments.push(&name);
                    segments.push(&attribute.suffix());
                }
                (Some(attribute), AttributeStyle::DashSuffix) => {
                    segments.push(&format!("{}-{}", name, attribute.suffix()));
                }
                (None, _) => {
                    segments.push(&name);
                }
            }
            if let Some(tail) = &self.profile.remote_tail {
                segments.push(tail);
            }
        }
        Ok(ResourceLocator::remote(url.to_string()))
    }

    /// Canonical cache file path for `key`
    pub fn local_path(&self, key: &EntityKey) -> Result<PathBuf, LocatorError> {
        self.validate(key)?;
        let file_name = match key.attribute() {
            Some(attribute) => format!(
                "{}{}-{}.{}",
                self.profile.local_prefix,
                key.name(),
                attribute.suffix(),
                self.profile.extension
            ),
            None => format!(
                "{}{}.{}",
                self.profile.local_prefix,
                key.name(),
                self.profile.extension
            ),
        };
        Ok(self.profile.cache_dir.join(file_name))
    }

    /// Canonical cache locator for `key`
    pub fn encode_local(&self, key: &EntityKey) -> Result<ResourceLocator, LocatorError> {
        Ok(ResourceLocator::local(&self.local_path(key)?))
    }

    /// Classify a raw URL or path by its scheme prefix
    ///
    /// `http://` and `https://` are remote, `file://` and bare paths are
    /// local. A trailing slash is dropped.
    pub fn parse_locator(&self, raw: &str) -> Result<ResourceLocator, LocatorError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(LocatorError::EmptyPath);
        }
        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(ResourceLocator::remote(raw));
        }
        let path = if lower.starts_with(FILE_SCHEME) {
            &raw[FILE_SCHEME.len()..]
        } else if raw.contains("://") {
            return Err(LocatorError::UnsupportedScheme {
                locator: raw.to_string(),
            });
        } else {
            raw
        };
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return Err(LocatorError::EmptyPath);
        }
        Ok(ResourceLocator {
            protocol: Protocol::Local,
            path: path.to_string(),
        })
    }

    /// Recover the key a locator was encoded from
    pub fn decode(&self, locator: &ResourceLocator) -> Result<EntityKey, LocatorError> {
        match locator.protocol() {
            Protocol::Remote => self.decode_remote(locator.path()),
            Protocol::Local => self.decode_local(locator.path()),
        }
    }

    /// Whether `locator` belongs to this site
    ///
    /// Remote locators must decode. Local ones must also sit directly in
    /// the site's cache directory, so sites sharing a file layout are told
    /// apart by where their files live.
    pub fn holds(&self, locator: &ResourceLocator) -> bool {
        let in_cache_dir = match locator.protocol() {
            Protocol::Remote => true,
            Protocol::Local => Path::new(locator.path()).parent() == Some(self.cache_dir()),
        };
        in_cache_dir && self.decode(locator).is_ok()
    }

    /// [`parse_locator`](Self::parse_locator) followed by [`decode`](Self::decode)
    pub fn decode_str(&self, raw: &str) -> Result<EntityKey, LocatorError> {
        self.decode(&self.parse_locator(raw)?)
    }

    fn decode_remote(&self, raw: &str) -> Result<EntityKey, LocatorError> {
        let url = Url::parse(raw).map_err(|e| LocatorError::InvalidUrl {
            locator: raw.to_string(),
            error: e.to_string(),
        })?;
        let foreign = || LocatorError::ForeignHost {
            locator: raw.to_string(),
            base: self.profile.remote_base.clone(),
        };
        if !url
            .host_str()
            .zip(self.base.host_str())
            .is_some_and(|(host, base)| host.eq_ignore_ascii_case(base))
        {
            return Err(foreign());
        }

        let mut segments: Vec<String> = url
            .path_segments()
            .map(|s| s.map(str::to_string).collect())
            .unwrap_or_default();
        if segments.last().is_some_and(|s| s.is_empty()) {
            segments.pop();
        }
        if !segments.starts_with(&self.base_segments) {
            return Err(foreign());
        }
        let mut rest = segments.split_off(self.base_segments.len());

        if let Some(tail) = &self.profile.remote_tail
            && rest.last().is_some_and(|s| s == tail)
        {
            rest.pop();
        }

        let vocabulary = self.profile.vocabulary;
        let mut attribute = None;
        if self.profile.remote_attribute == AttributeStyle::Segment
            && rest.len() >= 2
            && let Some(parsed) = rest
                .last()
                .and_then(|s| vocabulary.parse(&s.to_ascii_lowercase()))
        {
            attribute = Some(parsed);
            rest.pop();
        }

        let segment = rest.pop().filter(|s| !s.is_empty()).ok_or(LocatorError::EmptyPath)?;
        let segment = urlencoding::decode(&segment).map_err(|e| LocatorError::InvalidUrl {
            locator: raw.to_string(),
            error: e.to_string(),
        })?;
        let segment = segment.to_lowercase();

        let name = if self.profile.remote_attribute == AttributeStyle::DashSuffix {
            let (name, parsed) = vocabulary.split_dash_suffix(&segment);
            attribute = parsed;
            name.to_string()
        } else {
            segment
        };

        Ok(build_key(name, attribute))
    }

    fn decode_local(&self, path: &str) -> Result<EntityKey, LocatorError> {
        let file_name = path
            .trim_end_matches('/')
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        let extension = format!(".{}", self.profile.extension);
        let stem = file_name.strip_suffix(&extension).unwrap_or(file_name);
        let stem = stem
            .strip_prefix(self.profile.local_prefix.as_str())
            .ok_or_else(|| LocatorError::ForeignFile {
                locator: path.to_string(),
                prefix: self.profile.local_prefix.clone(),
            })?;
        if stem.is_empty() {
            return Err(LocatorError::EmptyPath);
        }
        let stem = stem.to_lowercase();
        let (name, attribute) = self.profile.vocabulary.split_dash_suffix(&stem);
        Ok(build_key(name.to_string(), attribute))
    }
}

fn build_key(name: String, attribute: Option<crate::key::Attribute>) -> EntityKey {
    match attribute {
        Some(attribute) => EntityKey::with_attribute(name, attribute),
        None => EntityKey::new(name),
    }
}

fn non_empty_segments(url: &Url) -> Vec<String> {
    url.path_segments()
        .map(|s| s.filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalization_only_touches_first_letter() {
        assert_eq!(NameCase::Capitalized.apply("mary-kate"), "Mary-kate");
        assert_eq!(NameCase::Capitalized.apply(""), "");
        assert_eq!(NameCase::Lower.apply("liam"), "liam");
    }

    #[test]
    fn base_with_trailing_slash_encodes_cleanly() {
        let codec = SiteProfile::new("https://babynames.com/name/", "/cache")
            .codec()
            .unwrap();
        let locator = codec.encode_remote(&EntityKey::new("Liam")).unwrap();
        assert_eq!(locator.path(), "https://babynames.com/name/liam");
    }

    #[test]
    fn non_http_base_rejected() {
        let result = SiteProfile::new("ftp://example.com/names", "/cache").codec();
        assert!(matches!(
            result,
            Err(LocatorError::UnsupportedScheme { .. })
        ));
    }
}
