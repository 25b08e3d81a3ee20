//! Seed key sources

use std::{collections::HashSet, ops::RangeInclusive, path::Path};

use serde::Deserialize;

use crate::error::SeedError;
use crate::key::EntityKey;

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedEntry {
    Named { name: String },
    Plain(String),
}

impl SeedEntry {
    fn into_name(self) -> String {
        match self {
            SeedEntry::Named { name } | SeedEntry::Plain(name) => name,
        }
    }
}

/// Parse seed names from JSON text
///
/// Accepts an array of plain strings or of objects with a `name` field;
/// other fields are ignored. Blank names are dropped and order is kept.
pub fn parse_names(json: &str) -> Result<Vec<EntityKey>, SeedError> {
    let entries: Vec<SeedEntry> = serde_json::from_str(json)?;
    Ok(entries
        .into_iter()
        .map(SeedEntry::into_name)
        .filter(|name| !name.trim().is_empty())
        .map(EntityKey::new)
        .collect())
}

/// Read seed names from a JSON file, see [`parse_names`]
pub async fn load_names(path: impl AsRef<Path>) -> Result<Vec<EntityKey>, SeedError> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SeedError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let names = parse_names(&json)?;
    tracing::info!(path = %path.display(), count = names.len(), "loaded seed names");
    Ok(names)
}

/// Numeric keys for paginated listings, e.g. search result pages
pub fn page_range(pages: RangeInclusive<u32>) -> impl Iterator<Item = EntityKey> + Send {
    pages.map(|page| EntityKey::new(page.to_string()))
}

/// Set of seed names, for allow-lists
pub fn name_set(keys: &[EntityKey]) -> HashSet<String> {
    keys.iter().map(|key| key.name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_and_strings_are_both_accepted() {
        let keys = parse_names(r#"[{"name": "William", "rank": 3}, "Olivia", "  "]"#).unwrap();
        assert_eq!(keys, vec![EntityKey::new("william"), EntityKey::new("olivia")]);
    }

    #[test]
    fn non_array_is_rejected() {
        assert!(matches!(parse_names(r#"{"name": "x"}"#), Err(SeedError::Parse(_))));
    }

    #[test]
    fn page_range_is_inclusive() {
        let pages: Vec<_> = page_range(3..=5).map(|k| k.name().to_string()).collect();
        assert_eq!(pages, ["3", "4", "5"]);
    }
}
