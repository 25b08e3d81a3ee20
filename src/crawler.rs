//! Concurrent cache-gated crawler
//!
//! This module drives [`CrawlTask`]s from seed keys to extracted records:
//! - **Cache first**: every task goes through its route's cache gate, so
//!   pages already on disk are never fetched again
//! - **Per-host limits**: remote fetches share a semaphore per host plus a
//!   crawl-wide rate limiter; cached reads skip both
//! - **Graceful cancellation**: stop admitting tasks, let in-flight ones finish
//! - **Observability**: observers and a live statistics channel
//! - **Run report**: counts, failures, negatives and unresolved keys are
//!   returned to the caller instead of being kept in globals
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```ignore
//! use cachecrawl::{Crawler, EntityKey, sites};
//!
//! let crawler = Crawler::builder()
//!     .route(sites::babynames_route("/data/cache")?)
//!     .per_host_concurrency(1)
//!     .build()?;
//!
//! let seeds = ["William", "Olivia"].map(EntityKey::new);
//! let report = crawler.crawl("babynames", seeds).await?;
//! println!("{}", report.summary());
//! ```
//!
//! ## Replaying the cache only
//!
//! ```ignore
//! let crawler = Crawler::builder()
//!     .route(sites::nameberry_route("/data/cache", NameberryContent::Meaning)?)
//!     .local_only(true)
//!     .build()?;
//! ```
//!
//! ## With Cancellation
//!
//! ```ignore
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel_token = CancellationToken::new();
//! let report = crawler
//!     .crawl_with_cancellation("nameberry", seeds, cancel_token.clone())
//!     .await?;
//! ```

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;
use futures_util::StreamExt;
use tokio::{
    sync::{Mutex, OwnedSemaphorePermit, Semaphore, mpsc, watch},
    time::sleep,
};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, FetchError, TaskError};
use crate::extract::{Extraction, Link, Page};
use crate::fetch::{DEFAULT_USER_AGENT, Fetcher, HttpFetcher, OfflineFetcher};
use crate::frontier::{Admission, CrawlTask, Frontier, HandlerId, KeyState, Route};
use crate::key::EntityKey;
use crate::sink::{CrawlItem, NullSink, RecordSink};

/// How a visited task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    /// A record was extracted
    Extracted,
    /// The site reported that the entity does not exist
    NoRecord,
    /// The page linked to other pages instead of holding content
    Expanded,
    /// The task failed; see [`VisitResult::error`]
    Failed,
}

/// Result of visiting one task
#[derive(Debug)]
pub struct VisitResult {
    /// The task that was visited
    pub task: CrawlTask,
    /// Lifecycle steps taken, in order
    pub trail: Vec<KeyState>,
    pub outcome: VisitOutcome,
    /// Links to expand into new tasks
    pub links: Vec<Link>,
    pub error: Option<TaskError>,
}

impl VisitResult {
    fn new(task: CrawlTask) -> Self {
        Self {
            task,
            trail: Vec::new(),
            outcome: VisitOutcome::Failed,
            links: Vec::new(),
            error: None,
        }
    }

    fn fail(mut self, error: impl Into<TaskError>) -> Self {
        self.trail.push(KeyState::Failed);
        self.outcome = VisitOutcome::Failed;
        self.error = Some(error.into());
        self
    }
}

/// Counts tasks handed to the workers whose results are not yet settled
///
/// The crawl is over once this reaches zero with nothing left to dispatch.
#[derive(Clone)]
pub struct CompletionDetector {
    pending_tasks: Arc<AtomicUsize>,
}

impl CompletionDetector {
    pub fn new() -> Self {
        Self {
            pending_tasks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A task was handed to the workers
    pub fn task_queued(&self) {
        self.pending_tasks.fetch_add(1, Ordering::SeqCst);
    }

    /// A task's result was consumed by the coordinator
    pub fn task_completed(&self) {
        self.pending_tasks.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn pending_count(&self) -> usize {
        self.pending_tasks.load(Ordering::SeqCst)
    }

    /// No task is waiting for its result to be settled
    pub fn is_idle(&self) -> bool {
        self.pending_count() == 0
    }
}

impl Default for CompletionDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer trait for receiving crawl events
///
/// # Example
///
/// ```ignore
/// use cachecrawl::{CrawlObserver, VisitResult};
///
/// struct LoggingObserver;
///
/// #[async_trait::async_trait]
/// impl CrawlObserver for LoggingObserver {
///     async fn on_task_visited(&self, result: &VisitResult) {
///         println!("{} -> {:?}", result.task.locator(), result.outcome);
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait CrawlObserver: Send + Sync {
    /// Called when a task is handed to the workers
    async fn on_task_queued(&self, _task: &CrawlTask) {}

    /// Called when a task has been visited, whatever the outcome
    async fn on_task_visited(&self, _result: &VisitResult) {}

    /// Called for every extracted record before it reaches the sink
    async fn on_record(&self, _item: &CrawlItem) {}

    /// Called when a task or a link on its page fails
    async fn on_task_error(&self, _handler: &HandlerId, _locator: &str, _error: &TaskError) {}

    /// Called when the crawl completes
    async fn on_crawl_complete(&self, _report: &CrawlReport) {}
}

/// Registry for managing multiple crawl observers
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn CrawlObserver>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn CrawlObserver>) {
        self.observers.push(observer);
    }

    pub async fn notify_task_queued(&self, task: &CrawlTask) {
        for observer in &self.observers {
            observer.on_task_queued(task).await;
        }
    }

    pub async fn notify_task_visited(&self, result: &VisitResult) {
        for observer in &self.observers {
            observer.on_task_visited(result).await;
        }
    }

    pub async fn notify_record(&self, item: &CrawlItem) {
        for observer in &self.observers {
            observer.on_record(item).await;
        }
    }

    pub async fn notify_task_error(&self, handler: &HandlerId, locator: &str, error: &TaskError) {
        for observer in &self.observers {
            observer.on_task_error(handler, locator, error).await;
        }
    }

    pub async fn notify_crawl_complete(&self, report: &CrawlReport) {
        for observer in &self.observers {
            observer.on_crawl_complete(report).await;
        }
    }
}

/// Trait for implementing rate limiting strategies
#[async_trait::async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until a remote request is allowed
    async fn acquire(&self);
}

struct Bucket {
    tokens: f64,
    last_refill: tokio::time::Instant,
}

/// Token bucket rate limiter
///
/// Allows short bursts up to one second's worth of requests while holding
/// the average rate.
pub struct TokenBucketLimiter {
    bucket: Mutex<Bucket>,
    capacity: f64,
    refill_rate: f64,
}

impl TokenBucketLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: requests_per_second,
                last_refill: tokio::time::Instant::now(),
            }),
            capacity: requests_per_second,
            refill_rate: requests_per_second,
        }
    }
}

#[async_trait::async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = tokio::time::Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.capacity);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                let seconds = (1.0 - bucket.tokens) / self.refill_rate;
                Duration::from_secs_f64(seconds.max(0.001))
            };
            sleep(wait).await;
        }
    }
}

/// Fixed pause before every remote request
pub struct DelayLimiter {
    delay: Duration,
}

impl DelayLimiter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait::async_trait]
impl RateLimiter for DelayLimiter {
    async fn acquire(&self) {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
    }
}

/// Caps concurrent remote requests per host
pub struct HostLimiter {
    permits: usize,
    hosts: DashMap<String, Arc<Semaphore>>,
}

impl HostLimiter {
    pub fn new(permits: usize) -> Self {
        Self {
            permits,
            hosts: DashMap::new(),
        }
    }

    /// Wait for a slot on `host`; the slot is released when the permit drops
    pub async fn acquire(&self, host: &str) -> Option<OwnedSemaphorePermit> {
        let semaphore = self
            .hosts
            .entry(host.to_ascii_lowercase())
            .or_insert_with(|| Arc::new(Semaphore::new(self.permits)))
            .clone();
        semaphore.acquire_owned().await.ok()
    }

    /// Free slots currently available on `host`
    pub fn available(&self, host: &str) -> usize {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .map(|s| s.available_permits())
            .unwrap_or(self.permits)
    }
}

/// Configuration for rate limiting strategy
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimiterConfig {
    /// Use a fixed delay between requests
    Delay(Duration),
    /// Use token bucket algorithm with requests per second
    TokenBucket { requests_per_second: f64 },
    /// No rate limiting
    None,
}

/// Validated configuration for the crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub(crate) crawling_concurrency: usize,
    pub(crate) processing_concurrency: usize,
    pub(crate) per_host_concurrency: usize,
    pub(crate) crawling_queue_multiplier: usize,
    pub(crate) processing_queue_multiplier: usize,
    pub(crate) rate_limiter: RateLimiterConfig,
    pub(crate) local_only: bool,
}

impl CrawlerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawling_concurrency == 0 {
            return Err(ConfigError::InvalidCrawlingConcurrency(0));
        }
        if self.processing_concurrency == 0 {
            return Err(ConfigError::InvalidProcessingConcurrency(0));
        }
        if self.per_host_concurrency == 0 {
            return Err(ConfigError::InvalidPerHostConcurrency(0));
        }
        if self.crawling_queue_multiplier == 0 || self.processing_queue_multiplier == 0 {
            return Err(ConfigError::InvalidQueueMultiplier(0));
        }
        if let RateLimiterConfig::TokenBucket {
            requests_per_second,
        } = self.rate_limiter
            && !(requests_per_second.is_finite() && requests_per_second > 0.0)
        {
            return Err(ConfigError::InvalidRateLimit(requests_per_second));
        }
        Ok(())
    }

    pub fn crawling_queue_capacity(&self) -> usize {
        self.crawling_concurrency * self.crawling_queue_multiplier
    }

    pub fn processing_queue_capacity(&self) -> usize {
        self.processing_concurrency * self.processing_queue_multiplier
    }

    pub fn local_only(&self) -> bool {
        self.local_only
    }

    fn build_rate_limiter(&self) -> Arc<dyn RateLimiter> {
        match &self.rate_limiter {
            RateLimiterConfig::Delay(delay) => Arc::new(DelayLimiter::new(*delay)),
            RateLimiterConfig::TokenBucket {
                requests_per_second,
            } => Arc::new(TokenBucketLimiter::new(*requests_per_second)),
            RateLimiterConfig::None => Arc::new(DelayLimiter::new(Duration::ZERO)),
        }
    }
}

const DEFAULT_CRAWLING_QUEUE_MULTIPLIER: usize = 400;
const DEFAULT_PROCESSING_QUEUE_MULTIPLIER: usize = 10;
const DEFAULT_DELAY_MS: u64 = 200;
const DEFAULT_CRAWLING_CONCURRENCY: usize = 2;
const DEFAULT_PROCESSING_CONCURRENCY: usize = 2;
const DEFAULT_PER_HOST_CONCURRENCY: usize = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Counters collected during one crawl
#[derive(Debug, Clone)]
pub struct CrawlStats {
    /// Tasks served from the local cache
    pub cache_hits: usize,
    /// Tasks fetched from the network
    pub remote_fetches: usize,
    /// Records extracted
    pub records: usize,
    /// Definitive "no record" pages
    pub no_records: usize,
    /// Anchor or listing pages that expanded into more tasks
    pub expansions: usize,
    /// Remote tasks withheld in local-only mode
    pub skipped_remote: usize,
    /// Failed tasks and rejected links
    pub failures: usize,
    /// Tasks whose visit finished, whatever the outcome
    pub tasks_visited: usize,
    pub start_time: Instant,
    pub last_update: Instant,
}

impl CrawlStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            cache_hits: 0,
            remote_fetches: 0,
            records: 0,
            no_records: 0,
            expansions: 0,
            skipped_remote: 0,
            failures: 0,
            tasks_visited: 0,
            start_time: now,
            last_update: now,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.last_update.duration_since(self.start_time)
    }

    pub fn tasks_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.tasks_visited as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl Default for CrawlStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe statistics with live broadcasting
pub struct StatsTracker {
    cache_hits: AtomicUsize,
    remote_fetches: AtomicUsize,
    records: AtomicUsize,
    no_records: AtomicUsize,
    expansions: AtomicUsize,
    skipped_remote: AtomicUsize,
    failures: AtomicUsize,
    tasks_visited: AtomicUsize,
    start_time: Instant,
    tx: Arc<watch::Sender<CrawlStats>>,
}

impl StatsTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CrawlStats::new());
        Self::with_sender(Arc::new(tx))
    }

    /// Tracker that publishes to an existing channel
    pub fn with_sender(tx: Arc<watch::Sender<CrawlStats>>) -> Self {
        Self {
            cache_hits: AtomicUsize::new(0),
            remote_fetches: AtomicUsize::new(0),
            records: AtomicUsize::new(0),
            no_records: AtomicUsize::new(0),
            expansions: AtomicUsize::new(0),
            skipped_remote: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            tasks_visited: AtomicUsize::new(0),
            start_time: Instant::now(),
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CrawlStats> {
        self.tx.subscribe()
    }

    pub fn cache_hit(&self) {
        self.bump(&self.cache_hits);
    }

    pub fn remote_fetch(&self) {
        self.bump(&self.remote_fetches);
    }

    pub fn record_extracted(&self) {
        self.bump(&self.records);
    }

    pub fn no_record(&self) {
        self.bump(&self.no_records);
    }

    pub fn expanded(&self) {
        self.bump(&self.expansions);
    }

    pub fn skipped_remote(&self) {
        self.bump(&self.skipped_remote);
    }

    pub fn failure(&self) {
        self.bump(&self.failures);
    }

    pub fn task_visited(&self) {
        self.bump(&self.tasks_visited);
    }

    fn bump(&self, counter: &AtomicUsize) {
        // Statistics never drive control flow.
        counter.fetch_add(1, Ordering::Relaxed);
        self.tx.send_replace(self.snapshot());
    }

    pub fn snapshot(&self) -> CrawlStats {
        CrawlStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            remote_fetches: self.remote_fetches.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            no_records: self.no_records.load(Ordering::Relaxed),
            expansions: self.expansions.load(Ordering::Relaxed),
            skipped_remote: self.skipped_remote.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            tasks_visited: self.tasks_visited.load(Ordering::Relaxed),
            start_time: self.start_time,
            last_update: Instant::now(),
        }
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A failed task or rejected link
#[derive(Debug)]
pub struct TaskFailure {
    pub handler: HandlerId,
    /// Absent when a link could not be decoded into a key
    pub key: Option<EntityKey>,
    pub locator: String,
    pub error: TaskError,
}

/// Everything a crawl run produced besides the records themselves
#[derive(Debug)]
pub struct CrawlReport {
    pub stats: CrawlStats,
    pub failures: Vec<TaskFailure>,
    /// Keys the site reported as non-existent; not worth retrying
    pub negatives: Vec<(HandlerId, EntityKey)>,
    /// Keys without a cache file after this run; a later run will retry them
    pub unresolved: Vec<(HandlerId, EntityKey)>,
    pub cancelled: bool,
}

impl CrawlReport {
    /// One-line summary of the run
    pub fn summary(&self) -> String {
        let s = &self.stats;
        format!(
            "{} cache hits, {} remote fetches, {} records, {} no-record, {} expanded, {} skipped remote, {} failures in {:.1}s",
            s.cache_hits,
            s.remote_fetches,
            s.records,
            s.no_records,
            s.expansions,
            s.skipped_remote,
            s.failures,
            s.elapsed().as_secs_f64()
        )
    }
}

struct VisitContext {
    fetcher: Arc<dyn Fetcher>,
    hosts: Arc<HostLimiter>,
    rate_limiter: Arc<dyn RateLimiter>,
    items_tx: mpsc::Sender<CrawlItem>,
    stats: Arc<StatsTracker>,
}

/// Cache-gated crawler over a set of routes
pub struct Crawler {
    config: CrawlerConfig,
    routes: Arc<HashMap<HandlerId, Arc<Route>>>,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn RecordSink>,
    observers: Arc<ObserverRegistry>,
    stats_tx: Arc<watch::Sender<CrawlStats>>,
}

impl Crawler {
    pub fn builder() -> CrawlerBuilder {
        CrawlerBuilder::default()
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn route(&self, handler: &str) -> Option<&Arc<Route>> {
        self.routes.get(handler)
    }

    /// Subscribe to live statistics of the running crawl
    pub fn subscribe_stats(&self) -> watch::Receiver<CrawlStats> {
        self.stats_tx.subscribe()
    }

    /// Crawl `seeds` with the route registered as `handler`
    ///
    /// Resolves once every admitted task has been visited and every record
    /// has reached the sink.
    pub async fn crawl<I>(
        &self,
        handler: impl Into<HandlerId>,
        seeds: I,
    ) -> Result<CrawlReport, ConfigError>
    where
        I: IntoIterator<Item = EntityKey>,
        I::IntoIter: Send,
    {
        self.crawl_internal(handler.into(), seeds.into_iter(), None)
            .await
    }

    /// Crawl with cancellation support
    ///
    /// When the token fires the crawler stops admitting tasks, lets in-flight
    /// tasks finish and still returns a complete report for them.
    pub async fn crawl_with_cancellation<I>(
        &self,
        handler: impl Into<HandlerId>,
        seeds: I,
        cancel_token: CancellationToken,
    ) -> Result<CrawlReport, ConfigError>
    where
        I: IntoIterator<Item = EntityKey>,
        I::IntoIter: Send,
    {
        self.crawl_internal(handler.into(), seeds.into_iter(), Some(cancel_token))
            .await
    }

    async fn crawl_internal<S>(
        &self,
        handler: HandlerId,
        mut seeds: S,
        cancel_token: Option<CancellationToken>,
    ) -> Result<CrawlReport, ConfigError>
    where
        S: Iterator<Item = EntityKey> + Send,
    {
        if !self.routes.contains_key(&handler) {
            return Err(ConfigError::UnknownHandler(handler.to_string()));
        }

        let mut frontier = Frontier::new(self.routes.values().cloned());
        let stats = Arc::new(StatsTracker::with_sender(self.stats_tx.clone()));
        let completion = CompletionDetector::new();
        let mut ledger = Ledger::default();

        let (tasks_tx, tasks_rx) = mpsc::channel::<CrawlTask>(self.config.crawling_queue_capacity());
        let (items_tx, items_rx) = mpsc::channel::<CrawlItem>(self.config.processing_queue_capacity());
        let (results_tx, mut results_rx) =
            mpsc::channel::<VisitResult>(self.config.crawling_queue_capacity());

        let context = Arc::new(VisitContext {
            fetcher: self.fetcher.clone(),
            hosts: Arc::new(HostLimiter::new(self.config.per_host_concurrency)),
            rate_limiter: self.config.build_rate_limiter(),
            items_tx,
            stats: stats.clone(),
        });

        let processor_handle = self.launch_processors(items_rx);
        let scraper_handle =
            self.launch_scrapers(tasks_rx, results_tx, context);

        let mut pending: VecDeque<CrawlTask> = VecDeque::new();
        let mut seeds_done = false;
        let mut cancelled = false;

        loop {
            // Pull seeds lazily, only when nothing else is waiting.
            while pending.is_empty() && !seeds_done {
                match seeds.next() {
                    Some(key) => {
                        if let Some(admission) = frontier.admit(&handler, Link::Key(key)) {
                            self.accept(admission, &mut frontier, &mut pending, &stats, &mut ledger)
                                .await;
                        }
                    }
                    None => seeds_done = true,
                }
            }

            if pending.is_empty() && seeds_done && completion.is_idle() {
                break;
            }

            tokio::select! {
                permit = tasks_tx.reserve(), if !pending.is_empty() => {
                    let Ok(permit) = permit else { break };
                    if let Some(task) = pending.pop_front() {
                        completion.task_queued();
                        self.observers.notify_task_queued(&task).await;
                        permit.send(task);
                    }
                }

                result = results_rx.recv() => {
                    let Some(result) = result else { break };
                    self.settle(result, &mut frontier, &mut pending, &stats, &mut ledger, cancelled)
                        .await;
                    completion.task_completed();
                }

                _ = wait_cancelled(cancel_token.as_ref()), if !cancelled => {
                    tracing::info!(dropped = pending.len(), "crawl cancelled");
                    cancelled = true;
                    seeds_done = true;
                    pending.clear();
                }
            }
        }

        drop(tasks_tx);
        let _ = scraper_handle.await;
        let _ = processor_handle.await;

        let mut unresolved = ledger.unresolved;
        unresolved.extend(
            frontier
                .unfinished()
                .into_iter()
                .filter(|(h, key)| {
                    frontier
                        .route(h.as_str())
                        .is_some_and(|route| !route.gate().is_cached(key))
                }),
        );

        let report = CrawlReport {
            stats: stats.snapshot(),
            failures: ledger.failures,
            negatives: ledger.negatives,
            unresolved,
            cancelled,
        };
        tracing::info!(summary = %report.summary(), "crawl finished");
        self.observers.notify_crawl_complete(&report).await;
        Ok(report)
    }

    /// Queue an admitted task or record why it was not queued
    async fn accept(
        &self,
        admission: Admission,
        frontier: &mut Frontier,
        pending: &mut VecDeque<CrawlTask>,
        stats: &StatsTracker,
        ledger: &mut Ledger,
    ) {
        match admission {
            Admission::Task(task) => {
                if self.config.local_only && task.locator().is_remote() {
                    frontier.mark(&task, KeyState::CacheMiss);
                    frontier.mark(&task, KeyState::Skipped);
                    stats.skipped_remote();
                    tracing::debug!(key = %task.key(), url = %task.locator(), "local-only: skipping remote");
                    ledger
                        .unresolved
                        .push((task.handler().clone(), task.key().clone()));
                } else {
                    pending.push_back(task);
                }
            }
            Admission::Rejected {
                handler,
                link,
                error,
            } => {
                stats.failure();
                let error = TaskError::MalformedLocator(error);
                tracing::warn!(handler = %handler, link = %link, error = %error, "link rejected");
                self.observers
                    .notify_task_error(&handler, &link, &error)
                    .await;
                ledger.failures.push(TaskFailure {
                    handler,
                    key: None,
                    locator: link,
                    error,
                });
            }
        }
    }

    /// Fold a visit result into the frontier, stats and ledger
    async fn settle(
        &self,
        mut result: VisitResult,
        frontier: &mut Frontier,
        pending: &mut VecDeque<CrawlTask>,
        stats: &StatsTracker,
        ledger: &mut Ledger,
        cancelled: bool,
    ) {
        for state in &result.trail {
            frontier.mark(&result.task, *state);
        }
        stats.task_visited();
        self.observers.notify_task_visited(&result).await;

        let task = result.task.clone();
        match result.outcome {
            VisitOutcome::Extracted => {}
            VisitOutcome::NoRecord => {
                stats.no_record();
                tracing::info!(key = %task.key(), "no record");
                ledger
                    .negatives
                    .push((task.handler().clone(), task.key().clone()));
            }
            VisitOutcome::Expanded => {
                stats.expanded();
                let links = std::mem::take(&mut result.links);
                tracing::debug!(key = %task.key(), links = links.len(), "expanding");
                if !cancelled {
                    let admissions: Vec<Admission> = frontier.expand(&task, links).collect();
                    for admission in admissions {
                        self.accept(admission, frontier, pending, stats, ledger).await;
                    }
                }
            }
            VisitOutcome::Failed => {
                stats.failure();
                if let Some(error) = result.error.take() {
                    tracing::warn!(
                        key = %task.key(),
                        locator = %task.locator(),
                        kind = error.kind(),
                        error = %error,
                        "task failed"
                    );
                    self.observers
                        .notify_task_error(task.handler(), task.locator().path(), &error)
                        .await;
                    if matches!(error, TaskError::FetchFailure(_) | TaskError::Persist(_)) {
                        ledger
                            .unresolved
                            .push((task.handler().clone(), task.key().clone()));
                    }
                    ledger.failures.push(TaskFailure {
                        handler: task.handler().clone(),
                        key: Some(task.key().clone()),
                        locator: task.locator().to_url(),
                        error,
                    });
                }
            }
        }
    }

    /// Launch processor tasks that hand records to the sink
    fn launch_processors(&self, items: mpsc::Receiver<CrawlItem>) -> tokio::task::JoinHandle<()> {
        let concurrency = self.config.processing_concurrency;
        let sink = self.sink.clone();
        let observers = self.observers.clone();

        tokio::spawn(async move {
            ReceiverStream::new(items)
                .for_each_concurrent(concurrency, |item| {
                    let sink = sink.clone();
                    let observers = observers.clone();
                    async move {
                        observers.notify_record(&item).await;
                        if let Err(e) = sink.write(item).await {
                            tracing::error!(error = %e, "failed to write record");
                        }
                    }
                })
                .await;
            if let Err(e) = sink.flush().await {
                tracing::error!(error = %e, "failed to flush sink");
            }
        })
    }

    /// Launch scraper tasks that fetch, persist and extract
    fn launch_scrapers(
        &self,
        tasks: mpsc::Receiver<CrawlTask>,
        results_tx: mpsc::Sender<VisitResult>,
        context: Arc<VisitContext>,
    ) -> tokio::task::JoinHandle<()> {
        let concurrency = self.config.crawling_concurrency;
        let routes = self.routes.clone();

        tokio::spawn(async move {
            ReceiverStream::new(tasks)
                .for_each_concurrent(concurrency, |task| {
                    let routes = routes.clone();
                    let context = context.clone();
                    let results_tx = results_tx.clone();

                    async move {
                        let result = match routes.get(task.handler()).cloned() {
                            Some(route) => visit(task, &route, &context).await,
                            None => VisitResult::new(task),
                        };
                        if let Err(e) = results_tx.send(result).await {
                            tracing::error!(error = %e, "failed to report visit result");
                        }
                    }
                })
                .await;

            drop(context);
            drop(results_tx);
        })
    }
}

#[derive(Default)]
struct Ledger {
    failures: Vec<TaskFailure>,
    negatives: Vec<(HandlerId, EntityKey)>,
    unresolved: Vec<(HandlerId, EntityKey)>,
}

async fn wait_cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending::<()>().await,
    }
}

/// Fetch (cache or network), persist, and extract one task
async fn visit(task: CrawlTask, route: &Route, context: &VisitContext) -> VisitResult {
    let mut result = VisitResult::new(task);
    let locator = result.task.locator().clone();

    let body = if locator.is_local() {
        result.trail.push(KeyState::CacheHit);
        match tokio::fs::read(locator.path()).await {
            Ok(body) => {
                context.stats.cache_hit();
                result.trail.push(KeyState::FetchedLocal);
                body
            }
            Err(source) => {
                return result.fail(FetchError::Io {
                    path: locator.path().into(),
                    source,
                });
            }
        }
    } else {
        result.trail.push(KeyState::CacheMiss);
        let slot = match locator.host() {
            Some(host) => context.hosts.acquire(&host).await,
            None => None,
        };
        context.rate_limiter.acquire().await;
        tracing::info!(key = %result.task.key(), url = %locator, "fetching");
        let fetched = context.fetcher.fetch(locator.path()).await;
        drop(slot);
        let body = match fetched {
            Ok(body) => body,
            Err(e) => return result.fail(e),
        };
        context.stats.remote_fetch();
        result.trail.push(KeyState::FetchedRemote);
        if let Err(e) = route.writer().persist(result.task.key(), &body).await {
            return result.fail(e);
        }
        result.trail.push(KeyState::Persisted);
        body
    };

    let page = Page::new(locator, body);
    let extraction = route.extractor().extract(&page, result.task.key());
    match extraction {
        Ok(Extraction::Record(record)) => {
            result.trail.push(KeyState::Extracted);
            result.outcome = VisitOutcome::Extracted;
            context.stats.record_extracted();
            let item = CrawlItem::new(result.task.handler(), result.task.key(), record);
            if let Err(e) = context.items_tx.send(item).await {
                tracing::error!(error = %e, "failed to queue record");
            }
        }
        Ok(Extraction::NoRecord) => {
            result.trail.push(KeyState::Extracted);
            result.outcome = VisitOutcome::NoRecord;
        }
        Ok(Extraction::NeedsExpansion(links)) => {
            result.trail.push(KeyState::Expanded);
            result.outcome = VisitOutcome::Expanded;
            result.links = links;
        }
        Err(e) => return result.fail(e),
    }
    result
}

/// Builder for configuring a Crawler
pub struct CrawlerBuilder {
    config: CrawlerConfig,
    routes: Vec<Route>,
    fetcher: Option<Arc<dyn Fetcher>>,
    sink: Option<Arc<dyn RecordSink>>,
    observers: Vec<Arc<dyn CrawlObserver>>,
    user_agent: String,
    timeout: Duration,
}

impl Default for CrawlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlerBuilder {
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig {
                crawling_concurrency: DEFAULT_CRAWLING_CONCURRENCY,
                processing_concurrency: DEFAULT_PROCESSING_CONCURRENCY,
                per_host_concurrency: DEFAULT_PER_HOST_CONCURRENCY,
                crawling_queue_multiplier: DEFAULT_CRAWLING_QUEUE_MULTIPLIER,
                processing_queue_multiplier: DEFAULT_PROCESSING_QUEUE_MULTIPLIER,
                rate_limiter: RateLimiterConfig::Delay(Duration::from_millis(DEFAULT_DELAY_MS)),
                local_only: false,
            },
            routes: Vec::new(),
            fetcher: None,
            sink: None,
            observers: Vec::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set the number of concurrent fetch/extract workers (default: 2)
    pub fn crawling_concurrency(mut self, concurrency: usize) -> Self {
        self.config.crawling_concurrency = concurrency;
        self
    }

    /// Set the number of concurrent sink writers (default: 2)
    pub fn processing_concurrency(mut self, concurrency: usize) -> Self {
        self.config.processing_concurrency = concurrency;
        self
    }

    /// Set the number of concurrent remote requests per host (default: 1)
    pub fn per_host_concurrency(mut self, concurrency: usize) -> Self {
        self.config.per_host_concurrency = concurrency;
        self
    }

    /// Set the task queue capacity multiplier (default: 400)
    ///
    /// The actual queue capacity will be `crawling_concurrency * multiplier`.
    pub fn crawling_queue_multiplier(mut self, multiplier: usize) -> Self {
        self.config.crawling_queue_multiplier = multiplier;
        self
    }

    /// Set the record queue capacity multiplier (default: 10)
    pub fn processing_queue_multiplier(mut self, multiplier: usize) -> Self {
        self.config.processing_queue_multiplier = multiplier;
        self
    }

    /// Pause before every remote request (default: 200ms)
    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.rate_limiter = RateLimiterConfig::Delay(delay);
        self
    }

    /// Token bucket rate limit for remote requests
    pub fn rate_limit(mut self, requests_per_second: f64) -> Self {
        self.config.rate_limiter = RateLimiterConfig::TokenBucket {
            requests_per_second,
        };
        self
    }

    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limiter = RateLimiterConfig::None;
        self
    }

    /// Never touch the network; remote tasks are skipped and reported
    pub fn local_only(mut self, local_only: bool) -> Self {
        self.config.local_only = local_only;
        self
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// User agent for the default HTTP fetcher
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Request timeout for the default HTTP fetcher (default: 30s)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn observe_with(mut self, observer: Arc<dyn CrawlObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Build the Crawler with the configured settings
    pub fn build(self) -> Result<Crawler, ConfigError> {
        self.config.validate()?;

        let routes: HashMap<HandlerId, Arc<Route>> = self
            .routes
            .into_iter()
            .map(|route| (route.handler().clone(), Arc::new(route)))
            .collect();
        for route in routes.values() {
            if !routes.contains_key(route.follow_handler()) {
                return Err(ConfigError::UnknownHandler(
                    route.follow_handler().to_string(),
                ));
            }
        }

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None if self.config.local_only => Arc::new(OfflineFetcher),
            None => Arc::new(
                HttpFetcher::new(&self.user_agent, self.timeout)
                    .map_err(|e| ConfigError::HttpClient(e.to_string()))?,
            ),
        };

        let mut registry = ObserverRegistry::new();
        for observer in self.observers {
            registry.register(observer);
        }
        let (stats_tx, _) = watch::channel(CrawlStats::new());

        Ok(Crawler {
            config: self.config,
            routes: Arc::new(routes),
            fetcher,
            sink: self.sink.unwrap_or_else(|| Arc::new(NullSink)),
            observers: Arc::new(registry),
            stats_tx: Arc::new(stats_tx),
        })
    }
}
