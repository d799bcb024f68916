//! Citation key generation.
//!
//! Keys are built from a format template such as `%a%y` and the `author`,
//! `year` and `title` fields of each document, then made unique within the
//! batch by appending `b`, `c`, ... to colliding keys (`Alice99`, `Alice99b`).

use crate::entry::Record;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// Format used when none is configured
pub const DEFAULT_FORMAT: &str = "%a%y";

/// Characters dropped from titles before they are used in keys
const TITLE_STRIP_CHARS: [char; 12] = [
    ':', '-', '[', ']', '{', '}', ',', '+', '/', '*', '.', '?',
];

/// Words skipped when looking for the first meaningful title word
const STOPWORDS: [&str; 3] = ["a", "an", "the"];

const FIRST_SUFFIX: char = 'b';
const LAST_SUFFIX: char = 'z';

/// Base key plus suffixes `b..=z`
pub const MAX_SHARED_KEYS: usize = 26;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("More than {max} documents share the key '{base}'")]
    CollisionOverflow { base: String, max: usize },
}

/// Key format template.
///
/// | Token | Replacement                         |
/// |-------|-------------------------------------|
/// | `%y`  | two-digit year                      |
/// | `%Y`  | year as written                     |
/// | `%a`  | first author's surname              |
/// | `%t`  | title without spaces                |
/// | `%T`  | title with capitalized words        |
/// | `%w`  | first meaningful word of the title  |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFormat(String);

impl KeyFormat {
    /// An empty template falls back to [`DEFAULT_FORMAT`]
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        if template.is_empty() {
            Self::default()
        } else {
            Self(template)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for KeyFormat {
    fn default() -> Self {
        Self(DEFAULT_FORMAT.to_string())
    }
}

impl std::fmt::Display for KeyFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Values derived from one document that can be substituted into a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyParts {
    pub surname: String,
    pub short_year: String,
    pub year: String,
    pub title_compact: String,
    pub title_capitalized: String,
    pub first_word: String,
}

impl KeyParts {
    pub fn from_record<R: Record>(record: &R) -> Result<Self, KeyError> {
        let surname = first_surname(record.field("author").unwrap_or(""));
        if surname.is_empty() {
            return Err(KeyError::MissingField("author"));
        }

        let year = record.field("year").unwrap_or("").to_string();
        let short_year = if year.chars().count() == 4 {
            year.chars().skip(2).collect()
        } else {
            year.clone()
        };

        let title = clean_title(record.field("title").unwrap_or(""));
        let first_word = title
            .split_whitespace()
            .find(|w| !STOPWORDS.contains(&w.to_lowercase().as_str()))
            .ok_or(KeyError::MissingField("title"))?
            .to_string();
        let title_capitalized = title
            .split_whitespace()
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" ");
        let title_compact = title.split_whitespace().collect();

        Ok(Self {
            surname: surname.to_string(),
            short_year,
            year,
            title_compact,
            title_capitalized,
            first_word,
        })
    }

    /// Substitute into the template.
    ///
    /// Each token is replaced everywhere in turn, so a token that appears in
    /// an earlier substituted value is replaced as well.
    pub fn render(&self, format: &KeyFormat) -> String {
        format
            .as_str()
            .replace("%y", &self.short_year)
            .replace("%Y", &self.year)
            .replace("%a", &self.surname)
            .replace("%t", &self.title_compact)
            .replace("%T", &self.title_capitalized)
            .replace("%w", &self.first_word)
    }
}

/// Assigns keys to a batch of documents, keeping them unique within the batch
#[derive(Debug, Default)]
pub struct KeyGenerator {
    format: KeyFormat,
    assigned: HashSet<String>,
}

impl KeyGenerator {
    pub fn new(format: KeyFormat) -> Self {
        Self {
            format,
            assigned: HashSet::new(),
        }
    }

    pub fn format(&self) -> &KeyFormat {
        &self.format
    }

    pub fn is_assigned(&self, key: &str) -> bool {
        self.assigned.contains(key)
    }

    /// Key for a document before any uniqueness suffix
    pub fn base_key<R: Record>(&self, record: &R) -> Result<String, KeyError> {
        Ok(KeyParts::from_record(record)?.render(&self.format))
    }

    /// First free key among `base`, `base`b, `base`c, ... `base`z
    pub fn unique_key(&self, base: &str) -> Result<String, KeyError> {
        if !self.assigned.contains(base) {
            return Ok(base.to_string());
        }

        let mut suffix = FIRST_SUFFIX;
        loop {
            let candidate = format!("{}{}", base, suffix);
            if !self.assigned.contains(&candidate) {
                return Ok(candidate);
            }
            if suffix == LAST_SUFFIX {
                return Err(KeyError::CollisionOverflow {
                    base: base.to_string(),
                    max: MAX_SHARED_KEYS,
                });
            }
            suffix = (suffix as u8 + 1) as char;
        }
    }

    /// Derive, reserve and set the key of one document.
    ///
    /// On error the document keeps its key and nothing is reserved.
    pub fn assign<R: Record>(&mut self, record: &mut R) -> Result<String, KeyError> {
        let base = self.base_key(record)?;
        let key = self.unique_key(&base)?;

        debug!(previous = record.key(), key = %key, "assigned citation key");
        self.assigned.insert(key.clone());
        record.set_key(key.clone());
        Ok(key)
    }
}

/// Generate keys for a batch, in order. Returns one result per document.
pub fn generate_keys<R: Record>(
    records: &mut [R],
    format: &KeyFormat,
) -> Vec<Result<String, KeyError>> {
    let mut generator = KeyGenerator::new(format.clone());
    records
        .iter_mut()
        .map(|record| generator.assign(record))
        .collect()
}

/// Surname of the first author: text before the word `and`, cut at the first
/// comma or whitespace.
///
/// `and` only separates authors when it stands alone between whitespace, so
/// names such as `Anderson` or `Sandra` are kept whole instead of being cut
/// at the substring as a plain `split("and")` would do.
fn first_surname(author: &str) -> &str {
    let head = match find_word(author, "and") {
        Some(idx) => &author[..idx],
        None => author,
    };
    head.trim_start()
        .split(|c: char| c == ',' || c.is_whitespace())
        .next()
        .unwrap_or("")
}

/// Byte offset of `word` where it stands alone between whitespace or the ends
fn find_word(haystack: &str, word: &str) -> Option<usize> {
    haystack.match_indices(word).map(|(idx, _)| idx).find(|&idx| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + word.len()..].chars().next();
        before.map_or(true, char::is_whitespace) && after.map_or(true, char::is_whitespace)
    })
}

fn clean_title(title: &str) -> String {
    title.chars().filter(|c| !TITLE_STRIP_CHARS.contains(c)).collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Document;

    fn doc(author: &str, year: &str, title: &str) -> Document {
        Document::new("orig".to_string(), "article".to_string())
            .with_field("author", author)
            .with_field("year", year)
            .with_field("title", title)
    }

    #[test]
    fn surname_and_short_year() {
        let mut docs = vec![doc("Doe, Jane and Smith, John", "1999", "A Study of Things")];
        let results = generate_keys(&mut docs, &KeyFormat::new("%a%y"));

        assert_eq!(results, vec![Ok("Doe99".to_string())]);
        assert_eq!(docs[0].key, "Doe99");
    }

    #[test]
    fn given_name_first_author() {
        let document = doc("Jane Doe and John Smith", "2008", "Things");
        let parts = KeyParts::from_record(&document).unwrap();
        assert_eq!(parts.surname, "Jane");
    }

    #[test]
    fn and_inside_a_name_is_not_a_separator() {
        let parts = KeyParts::from_record(&doc("Anderson, Sandra", "2008", "Things")).unwrap();
        assert_eq!(parts.surname, "Anderson");
    }

    #[test]
    fn two_digit_year_is_kept() {
        let parts = KeyParts::from_record(&doc("Bob", "99", "Things")).unwrap();
        assert_eq!(parts.short_year, "99");
        assert_eq!(parts.render(&KeyFormat::new("%Y")), "99");
        assert_eq!(parts.render(&KeyFormat::new("%y")), "99");
    }

    #[test]
    fn title_variants() {
        let document = doc("Roe", "2001", "Effects of Stress: A Review");
        let parts = KeyParts::from_record(&document).unwrap();

        assert_eq!(parts.title_compact, "EffectsofStressAReview");
        assert_eq!(parts.title_capitalized, "Effects Of Stress A Review");
        assert_eq!(parts.first_word, "Effects");
    }

    #[test]
    fn first_word_skips_stopwords() {
        let document = doc("Roe", "2001", "The {Quantum} Hall effect");
        let parts = KeyParts::from_record(&document).unwrap();
        assert_eq!(parts.first_word, "Quantum");
        assert_eq!(parts.render(&KeyFormat::new("%a%Y%w")), "Roe2001Quantum");
    }

    #[test]
    fn title_of_only_stopwords_is_an_error() {
        let err = KeyParts::from_record(&doc("Roe", "2001", "The A an")).unwrap_err();
        assert_eq!(err, KeyError::MissingField("title"));
    }

    #[test]
    fn empty_author_is_an_error_and_key_is_untouched() {
        let mut docs = vec![doc("", "2001", "Things")];
        let results = generate_keys(&mut docs, &KeyFormat::default());

        assert_eq!(results, vec![Err(KeyError::MissingField("author"))]);
        assert_eq!(docs[0].key, "orig");
    }

    #[test]
    fn collisions_get_letter_suffixes() {
        let mut docs = vec![
            doc("Smith", "2008", "One"),
            doc("Smith", "2008", "Two"),
        ];
        let results = generate_keys(&mut docs, &KeyFormat::default());
        assert_eq!(results, vec![Ok("Smith08".to_string()), Ok("Smith08b".to_string())]);

        let mut docs = vec![
            doc("Lee", "2010", "One"),
            doc("Lee", "2010", "Two"),
            doc("Lee", "2010", "Three"),
        ];
        let keys: Vec<_> = generate_keys(&mut docs, &KeyFormat::default())
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(keys, vec!["Lee10", "Lee10b", "Lee10c"]);
    }

    #[test]
    fn unique_key_skips_taken_suffixes() {
        let mut generator = KeyGenerator::new(KeyFormat::new("%a"));
        for author in ["Roe", "Roeb", "Roe"] {
            generator.assign(&mut doc(author, "2001", "Things")).unwrap();
        }

        // "Roeb" was taken by its own document, so the second "Roe" got "Roec"
        assert!(generator.is_assigned("Roec"));
        assert_eq!(generator.unique_key("Roe"), Ok("Roed".to_string()));
        assert_eq!(generator.format().as_str(), "%a");
    }

    #[test]
    fn failed_document_does_not_reserve_a_key() {
        let mut docs = vec![
            doc("Lee", "2010", "One"),
            doc("Lee", "2010", "The"),
            doc("Lee", "2010", "Three"),
        ];
        let results = generate_keys(&mut docs, &KeyFormat::default());

        assert_eq!(results[1], Err(KeyError::MissingField("title")));
        assert_eq!(results[2], Ok("Lee10b".to_string()));
    }

    #[test]
    fn twenty_seventh_collision_overflows() {
        let mut docs: Vec<_> = (0..27).map(|_| doc("Lee", "2010", "Same")).collect();
        let results = generate_keys(&mut docs, &KeyFormat::default());

        assert_eq!(results[25], Ok("Lee10z".to_string()));
        assert_eq!(
            results[26],
            Err(KeyError::CollisionOverflow {
                base: "Lee10".to_string(),
                max: MAX_SHARED_KEYS,
            })
        );
    }

    #[test]
    fn substitution_is_literal() {
        // %w inside the substituted title is replaced too
        let parts = KeyParts::from_record(&doc("Doe", "2001", "Growth 5%wings")).unwrap();
        assert_eq!(parts.render(&KeyFormat::new("%a%t")), "DoeGrowth5Growthings");
    }

    #[test]
    fn empty_format_uses_default() {
        assert_eq!(KeyFormat::new(""), KeyFormat::default());
        assert_eq!(KeyFormat::new("").as_str(), "%a%y");
    }
}
