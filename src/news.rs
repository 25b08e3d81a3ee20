//! Article mirroring: one file per article URL under a storage root

use std::path::{Path, PathBuf};

use crate::cache::write_atomic;
use crate::error::TaskError;
use crate::fetch::Fetcher;

const SCHEMES: [&str; 2] = ["https://", "http://"];

/// Mirror path for `url` under `root`
///
/// The scheme is dropped and the rest of the URL becomes a relative path.
/// `.html` is appended unless the URL already ends in `.html` or `.xhtml`.
///
/// ```ignore
/// let path = storage_path("/tmp", "https://www.bbc.com/zhongwen/simp/world-67325336");
/// assert_eq!(path, PathBuf::from("/tmp/www.bbc.com/zhongwen/simp/world-67325336.html"));
/// ```
pub fn storage_path(root: impl AsRef<Path>, url: &str) -> PathBuf {
    let relative = SCHEMES
        .iter()
        .find_map(|scheme| {
            url.get(..scheme.len())
                .filter(|prefix| prefix.eq_ignore_ascii_case(scheme))
                .map(|_| &url[scheme.len()..])
        })
        .unwrap_or(url);

    let mut path = root.as_ref().join(relative.trim_start_matches('/'));
    if !(relative.ends_with(".html") || relative.ends_with(".xhtml")) {
        path.as_mut_os_string().push(".html");
    }
    path
}

/// Fetch `url` and store it at its mirror path, returning the path
pub async fn mirror(
    fetcher: &dyn Fetcher,
    root: impl AsRef<Path>,
    url: &str,
) -> Result<PathBuf, TaskError> {
    let body = fetcher.fetch(url).await?;
    let path = storage_path(root, url);
    write_atomic(&path, &body).await?;
    tracing::info!(url = %url, path = %path.display(), bytes = body.len(), "saved article");
    Ok(path)
}
