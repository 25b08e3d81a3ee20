pub mod cache;
pub mod codec;
pub mod config;
pub mod crawler;
mod error;
pub mod extract;
pub mod fetch;
pub mod frontier;
pub mod html;
pub mod key;
pub mod news;
pub mod seeds;
pub mod sink;
pub mod sites;

// Public exports
pub use cache::{CacheGate, CacheWriter};
pub use codec::{AttributeStyle, NameCase, Protocol, ResourceLocator, SiteProfile, UrlCodec};
pub use config::Settings;
pub use crawler::{
    CompletionDetector, CrawlObserver, CrawlReport, CrawlStats, Crawler, CrawlerBuilder,
    CrawlerConfig, DelayLimiter, HostLimiter, ObserverRegistry, RateLimiter, RateLimiterConfig,
    StatsTracker, TaskFailure, TokenBucketLimiter, VisitOutcome, VisitResult,
};
pub use error::{
    ConfigError, ExtractError, FetchError, LocatorError, PersistError, SeedError, TaskError,
};
pub use extract::{Extraction, Extractor, Link, Page, Record};
pub use fetch::{Fetcher, HttpFetcher, OfflineFetcher};
pub use frontier::{Admission, CrawlTask, Frontier, HandlerId, KeyState, Route};
pub use key::{Attribute, AttributeVocabulary, EntityKey, Gender};
pub use sink::{CrawlItem, JsonLinesSink, MemorySink, NullSink, RecordSink};
