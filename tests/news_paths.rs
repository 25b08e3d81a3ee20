use cachecrawl::news::{mirror, storage_path};
use cachecrawl::*;
use std::path::PathBuf;

const EXPECTED_HTML: &str = "/tmp/www.bbc.com/zhongwen/simp/world-67325336.html";
const EXPECTED_XHTML: &str = "/tmp/www.bbc.com/zhongwen/simp/world-67325336.xhtml";

struct OnePage(&'static str);

#[async_trait::async_trait]
impl Fetcher for OnePage {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        Ok(self.0.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod storage_path_tests {
    use super::*;

    #[test]
    fn test_https_urls() {
        for (url, expected) in [
            ("https://www.bbc.com/zhongwen/simp/world-67325336", EXPECTED_HTML),
            ("https://www.bbc.com/zhongwen/simp/world-67325336.html", EXPECTED_HTML),
            ("https://www.bbc.com/zhongwen/simp/world-67325336.xhtml", EXPECTED_XHTML),
        ] {
            assert_eq!(storage_path("/tmp", url), PathBuf::from(expected), "{}", url);
        }
    }

    #[test]
    fn test_http_urls() {
        for (url, expected) in [
            ("http://www.bbc.com/zhongwen/simp/world-67325336", EXPECTED_HTML),
            ("http://www.bbc.com/zhongwen/simp/world-67325336.html", EXPECTED_HTML),
            ("http://www.bbc.com/zhongwen/simp/world-67325336.xhtml", EXPECTED_XHTML),
        ] {
            assert_eq!(storage_path("/tmp", url), PathBuf::from(expected), "{}", url);
        }
    }

    #[test]
    fn test_bare_path_with_leading_slash() {
        assert_eq!(
            storage_path("/tmp", "/www.bbc.com/zhongwen/simp/world-67325336.xhtml"),
            PathBuf::from(EXPECTED_XHTML)
        );
    }

    #[test]
    fn test_scheme_matched_case_insensitively() {
        assert_eq!(
            storage_path("/tmp", "HTTPS://www.bbc.com/zhongwen/simp/world-67325336"),
            PathBuf::from(EXPECTED_HTML)
        );
    }
}

#[cfg(test)]
mod mirror_tests {
    use super::*;

    #[tokio::test]
    async fn test_mirror_writes_body_at_storage_path() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://www.bbc.com/zhongwen/simp/world-1";

        let path = mirror(&OnePage("<article>news</article>"), dir.path(), url)
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("www.bbc.com/zhongwen/simp/world-1.html"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<article>news</article>");
    }

    #[tokio::test]
    async fn test_mirror_propagates_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = mirror(&OfflineFetcher, dir.path(), "https://www.bbc.com/a").await;

        assert!(matches!(result, Err(TaskError::FetchFailure(_))));
        assert!(!dir.path().join("www.bbc.com").exists());
    }
}
