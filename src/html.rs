//! Selector helpers over `scraper` elements used by the site extractors

use scraper::{ElementRef, Html, Selector};

use crate::error::ExtractError;

/// Parse a CSS selector, reporting failures as [`ExtractError::InvalidSelector`]
pub fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::InvalidSelector {
        selector: css.to_string(),
        error: e.to_string(),
    })
}

/// Query methods shared by documents and elements
pub trait Query {
    /// First element matching `css`
    fn select_one(&self, css: &str) -> Result<Option<ElementRef<'_>>, ExtractError>;

    /// All elements matching `css`
    fn select_all(&self, css: &str) -> Result<Vec<ElementRef<'_>>, ExtractError>;

    /// First element matching `css`, or a missing-field error naming `field`
    fn require(&self, field: &str, css: &str) -> Result<ElementRef<'_>, ExtractError> {
        self.select_one(css)?
            .ok_or_else(|| ExtractError::MissingField {
                field: field.to_string(),
                selector: css.to_string(),
            })
    }
}

impl Query for Html {
    fn select_one(&self, css: &str) -> Result<Option<ElementRef<'_>>, ExtractError> {
        let selector = selector(css)?;
        Ok(self.select(&selector).next())
    }

    fn select_all(&self, css: &str) -> Result<Vec<ElementRef<'_>>, ExtractError> {
        let selector = selector(css)?;
        Ok(self.select(&selector).collect())
    }
}

impl Query for ElementRef<'_> {
    fn select_one(&self, css: &str) -> Result<Option<ElementRef<'_>>, ExtractError> {
        let selector = selector(css)?;
        Ok(self.select(&selector).next())
    }

    fn select_all(&self, css: &str) -> Result<Vec<ElementRef<'_>>, ExtractError> {
        let selector = selector(css)?;
        Ok(self.select(&selector).collect())
    }
}

/// Text content of an element with whitespace runs collapsed
pub fn text_of(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Value of an attribute on an element
pub fn attr_of<'a>(element: &ElementRef<'a>, name: &str) -> Option<&'a str> {
    element.value().attr(name)
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_reports_missing_field() {
        let html = Html::parse_document("<div><p>hi</p></div>");
        match html.require("title", "h1") {
            Err(ExtractError::MissingField { field, selector }) => {
                assert_eq!(field, "title");
                assert_eq!(selector, "h1");
            }
            other => panic!("Expected MissingField, got {:?}", other.map(|e| e.html())),
        }
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let html = Html::parse_document("<div></div>");
        assert!(matches!(
            html.select_all("div[[["),
            Err(ExtractError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn text_is_collapsed() {
        let html = Html::parse_document("<p>  Hello\n   <b>big</b>   world </p>");
        let p = html.select_one("p").unwrap().unwrap();
        assert_eq!(text_of(&p), "Hello big world");
    }
}
