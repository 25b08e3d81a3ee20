//! Crawl settings loaded from TOML
//!
//! Every field is optional in the file; missing fields take the same
//! defaults as [`CrawlerBuilder`].
//!
//! ```toml
//! cache_root = "/data/cache"
//! crawling_concurrency = 4
//! per_host_concurrency = 1
//! requests_per_second = 2.0
//! local_only = false
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::crawler::CrawlerBuilder;
use crate::error::ConfigError;
use crate::fetch::DEFAULT_USER_AGENT;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory holding one cache subdirectory per site
    pub cache_root: PathBuf,
    pub crawling_concurrency: usize,
    pub processing_concurrency: usize,
    pub per_host_concurrency: usize,
    /// Token bucket limit; takes precedence over `delay_ms`
    pub requests_per_second: Option<f64>,
    /// Fixed pause before every remote request
    pub delay_ms: u64,
    pub local_only: bool,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("cache"),
            crawling_concurrency: 2,
            processing_concurrency: 2,
            per_host_concurrency: 1,
            requests_per_second: None,
            delay_ms: 200,
            local_only: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Builder preconfigured with these settings; routes are added by the caller
    pub fn builder(&self) -> CrawlerBuilder {
        let builder = CrawlerBuilder::new()
            .crawling_concurrency(self.crawling_concurrency)
            .processing_concurrency(self.processing_concurrency)
            .per_host_concurrency(self.per_host_concurrency)
            .local_only(self.local_only)
            .user_agent(self.user_agent.clone())
            .timeout(Duration::from_secs(self.timeout_secs));
        match self.requests_per_second {
            Some(rps) => builder.rate_limit(rps),
            None => builder.delay(Duration::from_millis(self.delay_ms)),
        }
    }
}
