//! Entity keys and the attributes that qualify them

use std::fmt;

use serde::{Deserialize, Serialize};

/// Gender qualifier used by name sites that split unisex names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Boy,
    Girl,
}

impl Gender {
    /// All genders in expansion order
    pub const ALL: [Gender; 2] = [Gender::Boy, Gender::Girl];

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Boy => "boy",
            Gender::Girl => "girl",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional qualifier of an [`EntityKey`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attribute {
    /// Gender-specific variant page
    Gender(Gender),
    /// Disambiguating sequence number, e.g. `william-1`
    Sequence(u32),
}

impl Attribute {
    /// Text form used in URLs and file names
    pub fn suffix(&self) -> String {
        match self {
            Attribute::Gender(g) => g.as_str().to_string(),
            Attribute::Sequence(n) => n.to_string(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Gender(g) => write!(f, "{}", g),
            Attribute::Sequence(n) => write!(f, "{}", n),
        }
    }
}

/// Which attribute family a site recognizes in its URLs and file names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeVocabulary {
    /// Names carry no attribute; dashes are part of the name
    #[default]
    None,
    /// `boy` / `girl`
    Gender,
    /// Decimal sequence numbers
    Sequence,
}

impl AttributeVocabulary {
    /// Parse an attribute suffix, returning `None` when it is not part of
    /// this vocabulary.
    pub fn parse(self, text: &str) -> Option<Attribute> {
        match self {
            AttributeVocabulary::None => None,
            AttributeVocabulary::Gender => match text {
                "boy" => Some(Attribute::Gender(Gender::Boy)),
                "girl" => Some(Attribute::Gender(Gender::Girl)),
                _ => None,
            },
            AttributeVocabulary::Sequence => {
                if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                text.parse().ok().map(Attribute::Sequence)
            }
        }
    }

    /// Whether this vocabulary can express `attribute`
    pub fn admits(self, attribute: &Attribute) -> bool {
        matches!(
            (self, attribute),
            (AttributeVocabulary::Gender, Attribute::Gender(_))
                | (AttributeVocabulary::Sequence, Attribute::Sequence(_))
        )
    }

    /// Split `name-suffix` into name and attribute when the suffix belongs
    /// to this vocabulary.
    pub fn split_dash_suffix(self, stem: &str) -> (&str, Option<Attribute>) {
        if let Some((name, suffix)) = stem.rsplit_once('-')
            && !name.is_empty()
            && let Some(attribute) = self.parse(suffix)
        {
            return (name, Some(attribute));
        }
        (stem, None)
    }
}

/// Canonical identity of the thing being crawled
///
/// Names are case-insensitive: they are trimmed and stored lowercase, so
/// `EntityKey::new("William")` equals `EntityKey::new("william")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    name: String,
    attribute: Option<Attribute>,
}

impl EntityKey {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: name.as_ref().trim().to_lowercase(),
            attribute: None,
        }
    }

    pub fn with_attribute(name: impl AsRef<str>, attribute: Attribute) -> Self {
        Self {
            attribute: Some(attribute),
            ..Self::new(name)
        }
    }

    pub fn gendered(name: impl AsRef<str>, gender: Gender) -> Self {
        Self::with_attribute(name, Attribute::Gender(gender))
    }

    pub fn sequenced(name: impl AsRef<str>, seq: u32) -> Self {
        Self::with_attribute(name, Attribute::Sequence(seq))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self) -> Option<Attribute> {
        self.attribute
    }

    /// The same name without its attribute
    pub fn base(&self) -> EntityKey {
        EntityKey {
            name: self.name.clone(),
            attribute: None,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(attribute) => write!(f, "{}-{}", self.name, attribute),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_case_folded() {
        assert_eq!(EntityKey::new("William"), EntityKey::new(" william "));
        assert_ne!(
            EntityKey::new("william"),
            EntityKey::gendered("william", Gender::Boy)
        );
    }

    #[test]
    fn sequence_vocabulary_rejects_non_digits() {
        let vocab = AttributeVocabulary::Sequence;
        assert_eq!(vocab.parse("12"), Some(Attribute::Sequence(12)));
        assert_eq!(vocab.parse("+1"), None);
        assert_eq!(vocab.parse("kate"), None);
        assert_eq!(vocab.parse(""), None);
    }

    #[test]
    fn dash_suffix_only_splits_known_suffixes() {
        let vocab = AttributeVocabulary::Gender;
        assert_eq!(
            vocab.split_dash_suffix("liam-girl"),
            ("liam", Some(Attribute::Gender(Gender::Girl)))
        );
        assert_eq!(vocab.split_dash_suffix("mary-kate"), ("mary-kate", None));
        assert_eq!(vocab.split_dash_suffix("-boy"), ("-boy", None));
        assert_eq!(
            AttributeVocabulary::None.split_dash_suffix("taco-recipe-2346079"),
            ("taco-recipe-2346079", None)
        );
    }
}
