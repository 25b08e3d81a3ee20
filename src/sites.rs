//! Built-in site profiles, extractors and routes
//!
//! Each site is a [`SiteProfile`] (URL and cache layout as data) plus an
//! [`Extractor`] for its pages. The `*_route` functions bundle both under the
//! handler names below, ready to register on a [`crate::CrawlerBuilder`].

use std::{collections::HashSet, path::Path};

use scraper::{ElementRef, Html};
use serde_json::{Value, json};
use url::Url;

use crate::codec::{AttributeStyle, NameCase, SiteProfile};
use crate::error::{ExtractError, LocatorError};
use crate::extract::{Extraction, Extractor, Link, Page, Record};
use crate::frontier::Route;
use crate::html::{Query, attr_of, collapse_whitespace, text_of};
use crate::key::{AttributeVocabulary, EntityKey, Gender};

pub const BABYNAMES: &str = "babynames";
pub const NAMEBERRY: &str = "nameberry";
pub const BEHINDTHENAME: &str = "behindthename";
pub const FOODNETWORK_SEARCH: &str = "foodnetwork";
pub const FOODNETWORK_RECIPE: &str = "foodnetwork_recipe";

/// `https://babynames.com/name/<name>`, cached as `<root>/babynames/<name>.html`
pub fn babynames_profile(root: impl AsRef<Path>) -> SiteProfile {
    SiteProfile::new("https://babynames.com/name", root.as_ref().join(BABYNAMES))
}

/// `https://nameberry.com/babyname/<Name>[/<gender>]`, cached as
/// `<root>/nameberry/<name>[-<gender>].html`
pub fn nameberry_profile(root: impl AsRef<Path>) -> SiteProfile {
    SiteProfile::new("https://nameberry.com/babyname", root.as_ref().join(NAMEBERRY))
        .attribute_style(AttributeStyle::Segment)
        .case(NameCase::Capitalized)
        .vocabulary(AttributeVocabulary::Gender)
}

/// `https://www.behindthename.com/name/<name>[-<n>]/rating`, cached as
/// `<root>/behindthename/<name>[-<n>].html`
pub fn behindthename_profile(root: impl AsRef<Path>) -> SiteProfile {
    SiteProfile::new(
        "https://www.behindthename.com/name",
        root.as_ref().join(BEHINDTHENAME),
    )
    .tail("rating")
    .vocabulary(AttributeVocabulary::Sequence)
}

/// `https://www.foodnetwork.com/search/recipe-/p/<page>`, cached as
/// `<root>/foodnetwork/index_<page>.html`
pub fn foodnetwork_search_profile(root: impl AsRef<Path>) -> SiteProfile {
    SiteProfile::new(
        "https://www.foodnetwork.com/search/recipe-/p",
        root.as_ref().join(FOODNETWORK_SEARCH),
    )
    .prefix("index_")
}

/// `https://www.foodnetwork.com/recipes/<slug>`, cached as
/// `<root>/foodnetwork/recipes/<slug>.html`
pub fn foodnetwork_recipe_profile(root: impl AsRef<Path>) -> SiteProfile {
    SiteProfile::new(
        "https://www.foodnetwork.com/recipes",
        root.as_ref().join(FOODNETWORK_SEARCH).join("recipes"),
    )
}

pub fn babynames_route(root: impl AsRef<Path>) -> Result<Route, LocatorError> {
    Ok(Route::new(
        BABYNAMES,
        babynames_profile(root).codec()?,
        BabyNamesExtractor,
    ))
}

pub fn nameberry_route(
    root: impl AsRef<Path>,
    extractor: NameberryExtractor,
) -> Result<Route, LocatorError> {
    Ok(Route::new(NAMEBERRY, nameberry_profile(root).codec()?, extractor))
}

pub fn behindthename_route(root: impl AsRef<Path>) -> Result<Route, LocatorError> {
    Ok(Route::new(
        BEHINDTHENAME,
        behindthename_profile(root).codec()?,
        BehindTheNameExtractor,
    ))
}

/// Search listing route plus the recipe route its links follow into
pub fn foodnetwork_routes(root: impl AsRef<Path>) -> Result<[Route; 2], LocatorError> {
    let root = root.as_ref();
    let search = Route::new(
        FOODNETWORK_SEARCH,
        foodnetwork_search_profile(root).codec()?,
        FoodNetworkSearchExtractor,
    )
    .follow_into(FOODNETWORK_RECIPE);
    let recipe = Route::new(
        FOODNETWORK_RECIPE,
        foodnetwork_recipe_profile(root).codec()?,
        FoodNetworkRecipeExtractor,
    );
    Ok([search, recipe])
}

/// The route a raw URL or cache path belongs to
///
/// A route whose cache directory holds the file wins over one that merely
/// decodes its name.
pub fn route_for<'a>(routes: &'a [Route], raw: &str) -> Option<&'a Route> {
    routes
        .iter()
        .find(|route| {
            let codec = route.codec();
            codec
                .parse_locator(raw)
                .is_ok_and(|locator| codec.holds(&locator))
        })
        .or_else(|| {
            routes
                .iter()
                .find(|route| route.codec().decode_str(raw).is_ok())
        })
}

fn field(record: &mut Record, name: &str, value: impl Into<Value>) {
    record.insert(name.to_string(), value.into());
}

fn page_contains(document: &Html, needle: &str) -> bool {
    document.root_element().text().any(|t| t.contains(needle))
}

/// Meaning pages on babynames.com
#[derive(Debug, Clone, Copy, Default)]
pub struct BabyNamesExtractor;

impl BabyNamesExtractor {
    const META: &'static str = "ul.namemeta li";

    fn meta_item<'a>(document: &'a Html, label: &str) -> Result<Option<ElementRef<'a>>, ExtractError> {
        Ok(document
            .select_all(Self::META)?
            .into_iter()
            .find(|li| text_of(li).contains(label)))
    }

    fn meta_link(document: &Html, field: &str, label: &str) -> Result<String, ExtractError> {
        let missing = || ExtractError::MissingField {
            field: field.to_string(),
            selector: format!("{} a ({})", Self::META, label),
        };
        let li = Self::meta_item(document, label)?.ok_or_else(missing)?;
        let link = li.select_one("a")?.ok_or_else(missing)?;
        Ok(text_of(&link))
    }

    /// Paragraphs between the "What is the meaning" heading and the next heading
    fn long_meaning(document: &Html) -> Result<String, ExtractError> {
        let Some(stats) = document.select_one("div.stats")? else {
            return Ok(String::new());
        };
        let mut parts = Vec::new();
        let mut inside = false;
        for child in stats.children().filter_map(ElementRef::wrap) {
            if child.value().name() == "h2" {
                if inside {
                    break;
                }
                inside = text_of(&child).contains("What is the meaning");
                continue;
            }
            if inside {
                let text = text_of(&child);
                if !text.is_empty() {
                    parts.push(text);
                }
            }
        }
        Ok(parts.join(" "))
    }
}

impl Extractor for BabyNamesExtractor {
    fn extract(&self, page: &Page, _key: &EntityKey) -> Result<Extraction, ExtractError> {
        let document = page.document();
        let not_found = document
            .select_all("h1")?
            .iter()
            .any(|h1| text_of(h1).contains("No names found"));
        if not_found {
            return Ok(Extraction::NoRecord);
        }

        let gender = Self::meta_link(&document, "gender", "Gender:")?;
        let origin = Self::meta_link(&document, "origin", "Origin:")?;
        let short_meaning = Self::meta_item(&document, "Meaning:")?
            .map(|li| text_of(&li).replacen("Meaning:", "", 1).trim().to_string())
            .ok_or_else(|| ExtractError::MissingField {
                field: "short_meaning".to_string(),
                selector: format!("{} (Meaning:)", Self::META),
            })?;

        let mut record = Record::new();
        field(&mut record, "gender", gender);
        field(&mut record, "origin", origin);
        field(&mut record, "short_meaning", short_meaning);
        field(&mut record, "long_meaning", Self::long_meaning(&document)?);
        Ok(Extraction::Record(record))
    }
}

/// What to pull out of a nameberry name page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameberryContent {
    /// Gender and description text
    #[default]
    Meaning,
    /// Names listed as similar, limited to the known names when given
    SimilarNames,
}

/// Name pages on nameberry.com
///
/// Unisex names have an anchor page linking to "<Name> Continued"; that page
/// expands into the boy and girl variants and yields no record itself.
#[derive(Debug, Clone, Default)]
pub struct NameberryExtractor {
    content: NameberryContent,
    known_names: Option<HashSet<String>>,
}

impl NameberryExtractor {
    pub fn new(content: NameberryContent) -> Self {
        Self {
            content,
            known_names: None,
        }
    }

    /// Only report similar names contained in `names`
    pub fn known_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.known_names = Some(
            names
                .into_iter()
                .map(|n| n.as_ref().trim().to_lowercase())
                .collect(),
        );
        self
    }

    fn is_anchor(document: &Html, key: &EntityKey) -> Result<bool, ExtractError> {
        if key.attribute().is_some() {
            return Ok(false);
        }
        let label = format!("{} Continued", NameCase::Capitalized.apply(key.name()));
        Ok(document
            .select_all("a[href]")?
            .iter()
            .any(|a| text_of(a).contains(&label)))
    }

    fn meaning(document: &Html, key: &EntityKey) -> Result<Extraction, ExtractError> {
        let copy = document.require("description", "div.t-copy")?;
        let description = text_of(&copy);
        if description.is_empty() {
            return Err(ExtractError::MissingField {
                field: "description".to_string(),
                selector: "div.t-copy".to_string(),
            });
        }
        let mut record = Record::new();
        field(&mut record, "gender", gender_label(key));
        field(&mut record, "description", description);
        Ok(Extraction::Record(record))
    }

    fn similar_names(&self, document: &Html, key: &EntityKey) -> Result<Extraction, ExtractError> {
        let mut seen = HashSet::new();
        let names: Vec<String> = document
            .select_all(r#"li[class*="Listing-name"] a[href*="/babyname/"]"#)?
            .iter()
            .filter_map(|a| attr_of(a, "href"))
            .filter_map(|href| href.trim_end_matches('/').rsplit('/').next())
            .map(|name| name.to_lowercase())
            .filter(|name| {
                self.known_names
                    .as_ref()
                    .is_none_or(|known| known.contains(name))
            })
            .filter(|name| seen.insert(name.clone()))
            .collect();
        if names.is_empty() {
            return Ok(Extraction::NoRecord);
        }
        let mut record = Record::new();
        field(&mut record, "similar_names", names);
        if key.attribute().is_some() {
            field(&mut record, "gender", gender_label(key));
        }
        Ok(Extraction::Record(record))
    }
}

fn gender_label(key: &EntityKey) -> String {
    key.attribute().map(|a| a.suffix()).unwrap_or_default()
}

impl Extractor for NameberryExtractor {
    fn extract(&self, page: &Page, key: &EntityKey) -> Result<Extraction, ExtractError> {
        let document = page.document();
        if Self::is_anchor(&document, key)? {
            let variants = Gender::ALL
                .into_iter()
                .map(|gender| Link::Key(EntityKey::gendered(key.name(), gender)))
                .collect();
            return Ok(Extraction::NeedsExpansion(variants));
        }
        match self.content {
            NameberryContent::Meaning => Self::meaning(&document, key),
            NameberryContent::SimilarNames => self.similar_names(&document, key),
        }
    }
}

/// Rating pages on behindthename.com
///
/// Names shared by several origins have no ratings on the plain page; it
/// lists numbered variants (`william-1`, `william-2`) which are followed
/// instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct BehindTheNameExtractor;

impl BehindTheNameExtractor {
    const SITE: &'static str = "https://www.behindthename.com/";
    const NO_RATINGS: &'static str = "There were no ratings found for";
    const VOTES: &'static str = "Based on the responses of";

    fn variant_links(document: &Html) -> Result<Vec<Link>, ExtractError> {
        let site = Url::parse(Self::SITE).map_err(|e| ExtractError::InvalidSelector {
            selector: Self::SITE.to_string(),
            error: e.to_string(),
        })?;
        Ok(document
            .select_all("div.browsename span.listname a")?
            .iter()
            .filter_map(|a| attr_of(a, "href"))
            .filter_map(|href| site.join(href).ok())
            .map(|url| Link::Url(url.to_string()))
            .collect())
    }

    fn ratings(document: &Html) -> Result<Vec<Value>, ExtractError> {
        let mut ratings = Vec::new();
        for row in document.select_all("center table tr")? {
            let cells: Vec<String> = row
                .select_all("td")?
                .iter()
                .flat_map(|td| td.text())
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if cells.len() < 6 {
                continue;
            }
            let mut pair = Record::new();
            field(&mut pair, &cells[0], cells[2].clone());
            field(&mut pair, &cells[5], cells[3].clone());
            ratings.push(Value::Object(pair));
        }
        Ok(ratings)
    }

    fn voted_people(document: &Html) -> Result<String, ExtractError> {
        let sentence = document
            .select_all("center p")?
            .iter()
            .map(text_of)
            .find(|text| text.contains(Self::VOTES))
            .ok_or_else(|| ExtractError::MissingField {
                field: "voted_people".to_string(),
                selector: format!("center p ({})", Self::VOTES),
            })?;
        let count: String = sentence
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit() || *c == ',')
            .filter(char::is_ascii_digit)
            .collect();
        if count.is_empty() {
            return Err(ExtractError::MissingField {
                field: "voted_people".to_string(),
                selector: format!("center p ({})", Self::VOTES),
            });
        }
        Ok(count)
    }
}

impl Extractor for BehindTheNameExtractor {
    fn extract(&self, page: &Page, _key: &EntityKey) -> Result<Extraction, ExtractError> {
        let document = page.document();
        if page_contains(&document, Self::NO_RATINGS) {
            let links = Self::variant_links(&document)?;
            if links.is_empty() {
                return Ok(Extraction::NoRecord);
            }
            return Ok(Extraction::NeedsExpansion(links));
        }

        let mut record = Record::new();
        field(&mut record, "rating", Self::ratings(&document)?);
        field(&mut record, "voted_people", Self::voted_people(&document)?);
        Ok(Extraction::Record(record))
    }
}

/// Recipe search listings on foodnetwork.com
#[derive(Debug, Clone, Copy, Default)]
pub struct FoodNetworkSearchExtractor;

impl FoodNetworkSearchExtractor {
    const RESULTS: &'static str =
        "section.o-RecipeResult.o-ResultCard h3.m-MediaBlock__a-Headline a";

    fn absolute(href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else if href.starts_with("//") {
            format!("https:{}", href)
        } else {
            format!("https://www.foodnetwork.com/{}", href.trim_start_matches('/'))
        }
    }
}

impl Extractor for FoodNetworkSearchExtractor {
    fn extract(&self, page: &Page, _key: &EntityKey) -> Result<Extraction, ExtractError> {
        let document = page.document();
        let links: Vec<Link> = document
            .select_all(Self::RESULTS)?
            .iter()
            .filter_map(|a| attr_of(a, "href"))
            .map(|href| Link::Url(Self::absolute(href.trim())))
            .collect();
        if links.is_empty() {
            return Ok(Extraction::NoRecord);
        }
        Ok(Extraction::NeedsExpansion(links))
    }
}

/// Recipe pages on foodnetwork.com, read from their schema.org JSON-LD
#[derive(Debug, Clone, Copy, Default)]
pub struct FoodNetworkRecipeExtractor;

impl FoodNetworkRecipeExtractor {
    const JSON_LD: &'static str = r#"script[type="application/ld+json"]"#;

    fn find_recipe(value: &Value) -> Option<&Value> {
        match value {
            Value::Array(items) => items.iter().find_map(Self::find_recipe),
            Value::Object(map) => {
                if is_recipe_type(map.get("@type")) {
                    return Some(value);
                }
                map.get("@graph").and_then(Self::find_recipe)
            }
            _ => None,
        }
    }

    fn instructions(value: Option<&Value>) -> Vec<String> {
        let mut steps = Vec::new();
        collect_steps(value, &mut steps);
        steps
    }
}

fn is_recipe_type(kind: Option<&Value>) -> bool {
    match kind {
        Some(Value::String(s)) => s == "Recipe",
        Some(Value::Array(kinds)) => kinds.iter().any(|k| k.as_str() == Some("Recipe")),
        _ => false,
    }
}

fn collect_steps(value: Option<&Value>, steps: &mut Vec<String>) {
    match value {
        Some(Value::String(text)) => {
            let text = collapse_whitespace(text);
            if !text.is_empty() {
                steps.push(text);
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                collect_steps(Some(item), steps);
            }
        }
        Some(Value::Object(map)) => {
            if let Some(list) = map.get("itemListElement") {
                collect_steps(Some(list), steps);
            } else {
                collect_steps(map.get("text"), steps);
            }
        }
        _ => {}
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![collapse_whitespace(s)],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(collapse_whitespace)
            .collect(),
        _ => Vec::new(),
    }
}

fn first_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(items)) => items.iter().find_map(|v| first_string(Some(v))),
        Some(Value::Object(map)) => map.get("url").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn author_names(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items.iter().flat_map(|v| author_names(Some(v))).collect(),
        Some(Value::Object(map)) => map
            .get("name")
            .and_then(Value::as_str)
            .map(|s| vec![s.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

impl Extractor for FoodNetworkRecipeExtractor {
    fn extract(&self, page: &Page, _key: &EntityKey) -> Result<Extraction, ExtractError> {
        let document = page.document();
        let mut last_error = None;
        let mut recipe = None;
        for script in document.select_all(Self::JSON_LD)? {
            let raw: String = script.text().collect();
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => {
                    if let Some(found) = Self::find_recipe(&value) {
                        recipe = Some(found.clone());
                        break;
                    }
                }
                Err(e) => last_error = Some(e),
            }
        }
        let recipe = match (recipe, last_error) {
            (Some(recipe), _) => recipe,
            (None, Some(e)) => return Err(ExtractError::Json(e)),
            (None, None) => {
                return Err(ExtractError::MissingField {
                    field: "recipe".to_string(),
                    selector: Self::JSON_LD.to_string(),
                });
            }
        };

        let text = |name: &str| {
            recipe
                .get(name)
                .and_then(Value::as_str)
                .map(collapse_whitespace)
        };
        let title = text("name").ok_or_else(|| ExtractError::MissingField {
            field: "title".to_string(),
            selector: format!("{} name", Self::JSON_LD),
        })?;

        let mut record = Record::new();
        field(&mut record, "title", title);
        field(&mut record, "description", json!(text("description")));
        field(&mut record, "author", author_names(recipe.get("author")));
        field(&mut record, "total_time", json!(text("totalTime")));
        field(&mut record, "yields", json!(first_string(recipe.get("recipeYield"))));
        field(&mut record, "image", json!(first_string(recipe.get("image"))));
        field(
            &mut record,
            "ingredients",
            string_list(recipe.get("recipeIngredient")),
        );
        field(
            &mut record,
            "instructions",
            Self::instructions(recipe.get("recipeInstructions")),
        );
        Ok(Extraction::Record(record))
    }
}
