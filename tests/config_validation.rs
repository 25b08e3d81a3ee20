use cachecrawl::{ConfigError, Crawler, Settings, sites};
use std::time::Duration;

#[test]
fn test_zero_crawling_concurrency_rejected() {
    let result = Crawler::builder().crawling_concurrency(0).build();

    match result {
        Err(ConfigError::InvalidCrawlingConcurrency(0)) => {}
        _ => panic!("Expected InvalidCrawlingConcurrency error"),
    }
}

#[test]
fn test_zero_processing_concurrency_rejected() {
    let result = Crawler::builder().processing_concurrency(0).build();

    match result {
        Err(ConfigError::InvalidProcessingConcurrency(0)) => {}
        _ => panic!("Expected InvalidProcessingConcurrency error"),
    }
}

#[test]
fn test_zero_per_host_concurrency_rejected() {
    let result = Crawler::builder().per_host_concurrency(0).build();

    match result {
        Err(ConfigError::InvalidPerHostConcurrency(0)) => {}
        _ => panic!("Expected InvalidPerHostConcurrency error"),
    }
}

#[test]
fn test_zero_queue_multipliers_rejected() {
    assert!(matches!(
        Crawler::builder().crawling_queue_multiplier(0).build(),
        Err(ConfigError::InvalidQueueMultiplier(0))
    ));
    assert!(matches!(
        Crawler::builder().processing_queue_multiplier(0).build(),
        Err(ConfigError::InvalidQueueMultiplier(0))
    ));
}

#[test]
fn test_non_positive_rate_limit_rejected() {
    assert!(matches!(
        Crawler::builder().rate_limit(0.0).build(),
        Err(ConfigError::InvalidRateLimit(_))
    ));
    assert!(matches!(
        Crawler::builder().rate_limit(f64::NAN).build(),
        Err(ConfigError::InvalidRateLimit(_))
    ));
}

#[test]
fn test_valid_configuration_accepted() {
    let result = Crawler::builder()
        .crawling_concurrency(4)
        .processing_concurrency(2)
        .per_host_concurrency(2)
        .crawling_queue_multiplier(100)
        .processing_queue_multiplier(20)
        .delay(Duration::from_millis(100))
        .build();

    assert!(result.is_ok());
}

#[test]
fn test_default_configuration_valid() {
    let crawler = Crawler::builder().build().unwrap();
    assert!(!crawler.config().local_only());
    assert_eq!(crawler.config().crawling_queue_capacity(), 2 * 400);
    assert_eq!(crawler.config().processing_queue_capacity(), 2 * 10);
}

#[test]
fn test_follow_into_unknown_handler_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let route = sites::babynames_route(dir.path())
        .unwrap()
        .follow_into("nowhere");

    match Crawler::builder().route(route).build() {
        Err(ConfigError::UnknownHandler(handler)) => assert_eq!(handler, "nowhere"),
        _ => panic!("Expected UnknownHandler error"),
    }
}

#[test]
fn test_foodnetwork_routes_resolve_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let [search, recipe] = sites::foodnetwork_routes(dir.path()).unwrap();

    let crawler = Crawler::builder().route(search).route(recipe).build().unwrap();
    assert!(crawler.route(sites::FOODNETWORK_SEARCH).is_some());
    assert!(crawler.route(sites::FOODNETWORK_RECIPE).is_some());
}

#[tokio::test]
async fn test_crawl_with_unregistered_handler_fails() {
    let crawler = Crawler::builder().local_only(true).build().unwrap();
    let result = crawler.crawl("babynames", Vec::new()).await;

    assert!(matches!(result, Err(ConfigError::UnknownHandler(_))));
}

#[cfg(test)]
mod settings_tests {
    use super::*;

    #[test]
    fn test_empty_settings_use_defaults() {
        let settings = Settings::parse("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.per_host_concurrency, 1);
        assert_eq!(settings.delay_ms, 200);
    }

    #[test]
    fn test_settings_override_fields() {
        let settings = Settings::parse(
            r#"
            cache_root = "/data/cache"
            crawling_concurrency = 8
            requests_per_second = 2.5
            local_only = true
            "#,
        )
        .unwrap();

        assert_eq!(settings.cache_root, std::path::PathBuf::from("/data/cache"));
        assert_eq!(settings.crawling_concurrency, 8);
        assert_eq!(settings.requests_per_second, Some(2.5));
        assert!(settings.local_only);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            Settings::parse("concurency = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_settings_build_crawler() {
        let settings = Settings {
            local_only: true,
            requests_per_second: Some(4.0),
            ..Settings::default()
        };

        let crawler = settings.builder().build().unwrap();
        assert!(crawler.config().local_only());
    }
}
