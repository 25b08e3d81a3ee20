//! Remote page fetching

use std::time::Duration;

use crate::error::FetchError;

/// Default user agent sent by [`HttpFetcher`]
pub const DEFAULT_USER_AGENT: &str = concat!("cachecrawl/", env!("CARGO_PKG_VERSION"));

/// Source of remote page bytes
///
/// Timeouts and retries belong to the implementation; the crawler calls
/// `fetch` once per remote task.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`Fetcher`] backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the given user agent and request timeout
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await?;
        Ok(body.to_vec())
    }
}

/// Fetcher that refuses every request, for cache-only replays
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

#[async_trait::async_trait]
impl Fetcher for OfflineFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::LocalOnly {
            url: url.to_string(),
        })
    }
}
