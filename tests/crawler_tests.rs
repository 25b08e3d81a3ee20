use cachecrawl::sites::NameberryExtractor;
use cachecrawl::*;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

/// In-memory site: URL to body, or to an HTTP status for failures
#[derive(Default)]
struct ScriptedFetcher {
    pages: HashMap<String, Result<String, u16>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), Ok(body.to_string()));
        self
    }

    fn status(mut self, url: &str, status: u16) -> Self {
        self.pages.insert(url.to_string(), Err(status));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some(Ok(body)) => Ok(body.clone().into_bytes()),
            Some(Err(status)) => Err(FetchError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

const WILLIAM_ANCHOR: &str = r#"<html><body>
    <h1>William</h1>
    <a href="/babyname/William/boy">William Continued</a>
</body></html>"#;

fn meaning_page(text: &str) -> String {
    format!(
        r#"<html><body><div class="t-copy"><p>{}</p></div></body></html>"#,
        text
    )
}

fn william_site() -> ScriptedFetcher {
    ScriptedFetcher::default()
        .page("https://nameberry.com/babyname/William", WILLIAM_ANCHOR)
        .page(
            "https://nameberry.com/babyname/William/boy",
            &meaning_page("William is a boy's name of German origin."),
        )
        .page(
            "https://nameberry.com/babyname/William/girl",
            &meaning_page("William for girls is rare."),
        )
}

fn nameberry_crawler(root: &Path, fetcher: Arc<dyn Fetcher>, sink: Arc<dyn RecordSink>) -> Crawler {
    Crawler::builder()
        .route(sites::nameberry_route(root, NameberryExtractor::default()).unwrap())
        .fetcher(fetcher)
        .sink(sink)
        .no_rate_limit()
        .build()
        .unwrap()
}

#[cfg(test)]
mod crawl_tests {
    use super::*;

    #[tokio::test]
    async fn test_anchor_page_yields_two_variant_records() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(william_site());
        let sink = MemorySink::new();
        let crawler = nameberry_crawler(dir.path(), fetcher.clone(), Arc::new(sink.clone()));

        let report = crawler
            .crawl(sites::NAMEBERRY, [EntityKey::new("William")])
            .await
            .unwrap();

        assert_eq!(report.stats.records, 2);
        assert_eq!(report.stats.expansions, 1);
        assert_eq!(report.stats.remote_fetches, 3);
        assert!(report.failures.is_empty());
        assert!(report.unresolved.is_empty());

        let mut items = sink.items().await;
        items.sort_by_key(|item| item.attribute.map(|a| a.suffix()));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "william");
        assert_eq!(items[0].attribute, Some(Attribute::Gender(Gender::Boy)));
        assert_eq!(items[1].attribute, Some(Attribute::Gender(Gender::Girl)));
        assert_eq!(
            items[1].record["description"],
            "William for girls is rare."
        );

        for file in ["william.html", "william-boy.html", "william-girl.html"] {
            assert!(dir.path().join("nameberry").join(file).is_file(), "{} cached", file);
        }
    }

    #[tokio::test]
    async fn test_second_run_reads_cache_only() {
        let dir = tempfile::tempdir().unwrap();
        let first = nameberry_crawler(dir.path(), Arc::new(william_site()), Arc::new(NullSink));
        first
            .crawl(sites::NAMEBERRY, [EntityKey::new("William")])
            .await
            .unwrap();

        let fetcher = Arc::new(ScriptedFetcher::default());
        let sink = MemorySink::new();
        let second = nameberry_crawler(dir.path(), fetcher.clone(), Arc::new(sink.clone()));
        let report = second
            .crawl(sites::NAMEBERRY, [EntityKey::new("William")])
            .await
            .unwrap();

        assert!(fetcher.calls().is_empty());
        assert_eq!(report.stats.cache_hits, 3);
        assert_eq!(report.stats.remote_fetches, 0);
        assert_eq!(sink.items().await.len(), 2);
    }

    #[tokio::test]
    async fn test_local_only_never_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("nameberry/olivia.html");
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, meaning_page("Olivia means olive tree.")).unwrap();

        let fetcher = Arc::new(william_site());
        let sink = MemorySink::new();
        let crawler = Crawler::builder()
            .route(sites::nameberry_route(dir.path(), NameberryExtractor::default()).unwrap())
            .fetcher(fetcher.clone())
            .sink(Arc::new(sink.clone()))
            .local_only(true)
            .build()
            .unwrap();

        let report = crawler
            .crawl(sites::NAMEBERRY, ["Olivia", "William"].map(EntityKey::new))
            .await
            .unwrap();

        assert!(fetcher.calls().is_empty());
        assert_eq!(report.stats.cache_hits, 1);
        assert_eq!(report.stats.skipped_remote, 1);
        assert_eq!(report.stats.records, 1);
        assert_eq!(
            report.unresolved,
            vec![(HandlerId::from(sites::NAMEBERRY), EntityKey::new("william"))]
        );
        assert_eq!(sink.items().await[0].name, "olivia");
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_no_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            ScriptedFetcher::default().status("https://nameberry.com/babyname/Emma", 503),
        );
        let crawler = nameberry_crawler(dir.path(), fetcher, Arc::new(NullSink));

        let report = crawler
            .crawl(sites::NAMEBERRY, [EntityKey::new("Emma")])
            .await
            .unwrap();

        assert_eq!(report.stats.failures, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].error.kind(), "fetch_failure");
        assert_eq!(report.failures[0].key, Some(EntityKey::new("emma")));
        assert_eq!(report.unresolved.len(), 1);
        assert!(!dir.path().join("nameberry/emma.html").exists());
    }

    #[tokio::test]
    async fn test_extraction_mismatch_still_persists_page() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::default().page(
            "https://nameberry.com/babyname/Ava",
            "<html><body><p>Redesigned page</p></body></html>",
        ));
        let crawler = nameberry_crawler(dir.path(), fetcher, Arc::new(NullSink));

        let report = crawler
            .crawl(sites::NAMEBERRY, [EntityKey::new("Ava")])
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].error.kind(), "extraction_mismatch");
        assert!(report.unresolved.is_empty());
        assert!(dir.path().join("nameberry/ava.html").is_file());
    }

    #[tokio::test]
    async fn test_no_record_pages_are_negatives() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::default().page(
            "https://babynames.com/name/zzyzx",
            "<html><body><h1>No names found</h1></body></html>",
        ));
        let crawler = Crawler::builder()
            .route(sites::babynames_route(dir.path()).unwrap())
            .fetcher(fetcher)
            .no_rate_limit()
            .build()
            .unwrap();

        let report = crawler
            .crawl(sites::BABYNAMES, [EntityKey::new("Zzyzx")])
            .await
            .unwrap();

        assert_eq!(report.stats.no_records, 1);
        assert_eq!(report.stats.records, 0);
        assert_eq!(
            report.negatives,
            vec![(HandlerId::from(sites::BABYNAMES), EntityKey::new("zzyzx"))]
        );
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_listing_pages_follow_into_recipe_handler() {
        let dir = tempfile::tempdir().unwrap();
        let listing = r#"<html><body>
            <section class="o-RecipeResult o-ResultCard">
              <h3 class="m-MediaBlock__a-Headline"><a href="//www.foodnetwork.com/recipes/taco-recipe-1">Taco</a></h3>
            </section>
            <section class="o-RecipeResult o-ResultCard">
              <h3 class="m-MediaBlock__a-Headline"><a href="//www.foodnetwork.com/recipes/taco-recipe-1">Taco again</a></h3>
            </section>
        </body></html>"#;
        let recipe = r#"<html><head><script type="application/ld+json">
            {"@context": "https://schema.org", "@type": "Recipe", "name": "Taco",
             "recipeIngredient": ["1 tortilla"], "recipeInstructions": "Fold it."}
        </script></head></html>"#;
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .page("https://www.foodnetwork.com/search/recipe-/p/1", listing)
                .page("https://www.foodnetwork.com/recipes/taco-recipe-1", recipe),
        );
        let sink = MemorySink::new();
        let [search, recipes] = sites::foodnetwork_routes(dir.path()).unwrap();
        let crawler = Crawler::builder()
            .route(search)
            .route(recipes)
            .fetcher(fetcher.clone())
            .sink(Arc::new(sink.clone()))
            .no_rate_limit()
            .build()
            .unwrap();

        let report = crawler
            .crawl(sites::FOODNETWORK_SEARCH, seeds::page_range(1..=2))
            .await
            .unwrap();

        let items = sink.items().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].handler, sites::FOODNETWORK_RECIPE);
        assert_eq!(items[0].record["title"], "Taco");
        // page 2 is a 404 in the scripted site
        assert_eq!(report.failures.len(), 1);
        assert_eq!(fetcher.calls().len(), 3);
        assert!(dir.path().join("foodnetwork/index_1.html").is_file());
        assert!(dir.path().join("foodnetwork/recipes/taco-recipe-1.html").is_file());
    }

    #[tokio::test]
    async fn test_rejected_links_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let page = r#"<html><body>
            <p>There were no ratings found for George.</p>
            <div class="browsename"><span class="listname"><a href="https://example.com/name/george-1/rating">George (1)</a></span></div>
        </body></html>"#;
        let fetcher = Arc::new(
            ScriptedFetcher::default()
                .page("https://www.behindthename.com/name/george/rating", page),
        );
        let crawler = Crawler::builder()
            .route(sites::behindthename_route(dir.path()).unwrap())
            .fetcher(fetcher)
            .no_rate_limit()
            .build()
            .unwrap();

        let report = crawler
            .crawl(sites::BEHINDTHENAME, [EntityKey::new("george")])
            .await
            .unwrap();

        assert_eq!(report.stats.expansions, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].error.kind(), "malformed_locator");
        assert_eq!(report.failures[0].key, None);
    }

    #[tokio::test]
    async fn test_cancelled_crawl_stops_admitting() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(william_site());
        let crawler = nameberry_crawler(dir.path(), fetcher, Arc::new(NullSink));

        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let names: Vec<EntityKey> = (0..50).map(|i| EntityKey::new(format!("name{}", i))).collect();

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            crawler.crawl_with_cancellation(sites::NAMEBERRY, names, token),
        )
        .await
        .expect("cancelled crawl should finish")
        .unwrap();

        assert!(report.cancelled);
        assert!(report.stats.tasks_visited < 50);
    }
}

#[cfg(test)]
mod limiter_tests {
    use super::*;

    #[tokio::test]
    async fn test_host_limiter_caps_each_host() {
        let limiter = HostLimiter::new(1);

        let permit = limiter.acquire("nameberry.com").await;
        assert!(permit.is_some());
        assert_eq!(limiter.available("nameberry.com"), 0);
        assert_eq!(limiter.available("babynames.com"), 1);

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), limiter.acquire("NAMEBERRY.com")).await;
        assert!(blocked.is_err(), "second request to the same host must wait");

        drop(permit);
        assert_eq!(limiter.available("nameberry.com"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_bucket_spaces_requests() {
        let limiter = TokenBucketLimiter::new(2.0);
        let start = tokio::time::Instant::now();

        for _ in 0..4 {
            limiter.acquire().await;
        }

        // Two tokens are available at once, the next two take half a second each
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_limiter_waits() {
        let limiter = DelayLimiter::new(Duration::from_millis(200));
        let start = tokio::time::Instant::now();

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}

#[cfg(test)]
mod stats_tracker_tests {
    use super::*;

    #[test]
    fn test_initial_stats() {
        let stats = StatsTracker::new().snapshot();

        assert_eq!(stats.cache_hits, 0);
        assert_eq!(stats.records, 0);
        assert_eq!(stats.failures, 0);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::thread;

        let tracker = Arc::new(StatsTracker::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let t = tracker.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    t.task_visited();
                    t.record_extracted();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = tracker.snapshot();
        assert_eq!(stats.tasks_visited, 1000);
        assert_eq!(stats.records, 1000);
    }

    #[tokio::test]
    async fn test_crawler_broadcasts_stats() {
        let dir = tempfile::tempdir().unwrap();
        let crawler = nameberry_crawler(dir.path(), Arc::new(william_site()), Arc::new(NullSink));
        let rx = crawler.subscribe_stats();

        crawler
            .crawl(sites::NAMEBERRY, [EntityKey::new("William")])
            .await
            .unwrap();

        assert_eq!(rx.borrow().records, 2);
    }
}

#[cfg(test)]
mod observer_tests {
    use super::*;

    #[derive(Default)]
    struct TestObserver {
        queued: Mutex<Vec<String>>,
        visited: Mutex<Vec<VisitOutcome>>,
        records: Mutex<usize>,
        completed: Mutex<bool>,
    }

    #[async_trait::async_trait]
    impl CrawlObserver for TestObserver {
        async fn on_task_queued(&self, task: &CrawlTask) {
            self.queued.lock().unwrap().push(task.key().to_string());
        }

        async fn on_task_visited(&self, result: &VisitResult) {
            self.visited.lock().unwrap().push(result.outcome);
        }

        async fn on_record(&self, _item: &CrawlItem) {
            *self.records.lock().unwrap() += 1;
        }

        async fn on_crawl_complete(&self, _report: &CrawlReport) {
            *self.completed.lock().unwrap() = true;
        }
    }

    #[tokio::test]
    async fn test_observer_sees_every_task() {
        let dir = tempfile::tempdir().unwrap();
        let observer = Arc::new(TestObserver::default());
        let crawler = Crawler::builder()
            .route(sites::nameberry_route(dir.path(), NameberryExtractor::default()).unwrap())
            .fetcher(Arc::new(william_site()))
            .observe_with(observer.clone())
            .no_rate_limit()
            .build()
            .unwrap();

        crawler
            .crawl(sites::NAMEBERRY, [EntityKey::new("William")])
            .await
            .unwrap();

        let mut queued = observer.queued.lock().unwrap().clone();
        queued.sort();
        assert_eq!(queued, ["william", "william-boy", "william-girl"]);

        let visited = observer.visited.lock().unwrap().clone();
        assert_eq!(visited.len(), 3);
        assert_eq!(
            visited
                .iter()
                .filter(|o| **o == VisitOutcome::Expanded)
                .count(),
            1
        );
        assert_eq!(*observer.records.lock().unwrap(), 2);
        assert!(*observer.completed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_multiple_observers() {
        let observer1 = Arc::new(TestObserver::default());
        let observer2 = Arc::new(TestObserver::default());

        let mut registry = ObserverRegistry::new();
        registry.register(observer1.clone());
        registry.register(observer2.clone());

        let item = CrawlItem::new(&"nameberry".into(), &EntityKey::new("liam"), Record::new());
        registry.notify_record(&item).await;

        assert_eq!(*observer1.records.lock().unwrap(), 1);
        assert_eq!(*observer2.records.lock().unwrap(), 1);
    }
}
