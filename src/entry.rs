use std::collections::BTreeMap;

/// A bibliographic record whose fields can be read and whose key can be replaced.
///
/// The key generator and the journal renamer only talk to documents through
/// this trait, so callers can plug in their own record type.
pub trait Record {
    /// Raw value of a named field, if present
    fn field(&self, name: &str) -> Option<&str>;

    /// Overwrite a named field
    fn set_field(&mut self, name: &str, value: String);

    /// Current citation key
    fn key(&self) -> &str;

    /// Replace the citation key
    fn set_key(&mut self, key: String);
}

/// Bibliography entry as loaded from a .bib file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Citation key from the bib file
    pub key: String,
    /// Entry type (article, inproceedings, book, etc.)
    pub entry_type: String,
    /// Field values keyed by lower-case field name
    fields: BTreeMap<String, String>,
}

impl Document {
    pub fn new(key: String, entry_type: String) -> Self {
        Self {
            key,
            entry_type,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter, mostly for tests
    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.set_field(name, value.to_string());
        self
    }
}

impl Record for Document {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(&name.to_lowercase()).map(String::as_str)
    }

    fn set_field(&mut self, name: &str, value: String) {
        self.fields.insert(name.to_lowercase(), value);
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn set_key(&mut self, key: String) {
        self.key = key;
    }
}

/// Normalize a name for lookups: trim and lowercase
pub fn normalize_name(s: &str) -> String {
    s.trim().to_lowercase()
}
