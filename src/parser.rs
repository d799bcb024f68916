use crate::entry::{Document, Record};
use biblatex::{Bibliography, ChunksExt};
use std::collections::HashSet;
use std::fs;
use std::ops::Range;
use std::path::Path;
use thiserror::Error;

/// Fields copied from bib entries into documents
const DOCUMENT_FIELDS: [&str; 6] = ["author", "year", "title", "journal", "doi", "date"];

/// Fields written back when a document is saved
const WRITABLE_FIELDS: [&str; 1] = ["journal"];

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse BibTeX: {0}")]
    ParseError(String),
    #[error("Expected {expected} documents for this file, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
    #[error("Citation key '{0}' is used by more than one entry")]
    DuplicateKey(String),
}

/// Parse a .bib file and return its documents in file order
pub fn parse_bib_file(path: &Path) -> Result<Vec<Document>, ParseError> {
    let content = fs::read_to_string(path)?;
    parse_bib_string(&content)
}

/// Parse a BibTeX string and return its documents in order
pub fn parse_bib_string(content: &str) -> Result<Vec<Document>, ParseError> {
    let bibliography =
        Bibliography::parse(content).map_err(|e| ParseError::ParseError(e.to_string()))?;

    let mut documents = Vec::new();

    for bib_entry in bibliography.into_iter() {
        let entry_type = format!("{:?}", bib_entry.entry_type).to_lowercase();
        let mut document = Document::new(bib_entry.key.clone(), entry_type);

        // Raw values, so `author` keeps its "Last, First and ..." form
        for name in DOCUMENT_FIELDS {
            if let Some(chunks) = bib_entry.get(name) {
                document.set_field(name, chunks.format_verbatim());
            }
        }

        // Fall back to the date field for entries without a year
        if document.field("year").is_none() {
            if let Some(year) = document.field("date").and_then(extract_year_from_string) {
                document.set_field("year", year);
            }
        }

        documents.push(document);
    }

    Ok(documents)
}

/// Rewrite `content` with keys and writable fields taken from `documents`.
///
/// Documents are matched to bib entries by position, so `documents` must be
/// the result of parsing the same content. Only citation keys and changed
/// writable field values are replaced; comments, `@string` and `@preamble`
/// blocks and all other text are kept as written.
pub fn write_bib_string(content: &str, documents: &[Document]) -> Result<String, ParseError> {
    let originals = parse_bib_string(content)?;
    if originals.len() != documents.len() {
        return Err(ParseError::CountMismatch {
            expected: originals.len(),
            actual: documents.len(),
        });
    }

    let layouts = scan_layout(content)?;
    if layouts.len() != originals.len() {
        return Err(ParseError::ParseError(format!(
            "found {} entries in the source text but {} parsed entries",
            layouts.len(),
            originals.len()
        )));
    }
    for (layout, original) in layouts.iter().zip(&originals) {
        let found = &content[layout.key.clone()];
        if found != original.key {
            return Err(ParseError::ParseError(format!(
                "entry key '{}' does not match parsed key '{}'",
                found, original.key
            )));
        }
    }

    let mut seen = HashSet::new();
    for document in documents {
        if !seen.insert(document.key.as_str()) {
            return Err(ParseError::DuplicateKey(document.key.clone()));
        }
    }

    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    for ((layout, original), document) in layouts.iter().zip(&originals).zip(documents) {
        if document.key != original.key {
            edits.push((layout.key.clone(), document.key.clone()));
        }
        for name in WRITABLE_FIELDS {
            let value = document.field(name);
            if value == original.field(name) {
                continue;
            }
            if let (Some(range), Some(value)) = (layout.field(name), value) {
                edits.push((range, format!("{{{}}}", value)));
            }
        }
    }
    edits.sort_by_key(|(range, _)| range.start);

    let mut updated = String::with_capacity(content.len());
    let mut last = 0;
    for (range, text) in edits {
        updated.push_str(&content[last..range.start]);
        updated.push_str(&text);
        last = range.end;
    }
    updated.push_str(&content[last..]);

    Ok(updated)
}

/// Rewrite a .bib file in place from its updated documents
pub fn write_bib_file(path: &Path, documents: &[Document]) -> Result<(), ParseError> {
    let content = fs::read_to_string(path)?;
    let updated = write_bib_string(&content, documents)?;
    fs::write(path, updated)?;
    Ok(())
}

/// Byte ranges of the rewritable parts of one entry in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
struct EntryLayout {
    key: Range<usize>,
    /// Lower-case field name and the range of its whole value expression
    fields: Vec<(String, Range<usize>)>,
}

impl EntryLayout {
    fn field(&self, name: &str) -> Option<Range<usize>> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, range)| range.clone())
    }
}

/// Locate the key and field values of every regular entry, in file order.
/// `@comment`, `@string` and `@preamble` blocks are skipped.
fn scan_layout(content: &str) -> Result<Vec<EntryLayout>, ParseError> {
    let mut scanner = Scanner {
        src: content.as_bytes(),
        pos: 0,
    };
    let mut layouts = Vec::new();

    while let Some(c) = scanner.peek() {
        match c {
            b'%' => scanner.skip_line(),
            b'@' => {
                scanner.pos += 1;
                if let Some(layout) = scanner.entry()? {
                    layouts.push(layout);
                }
            }
            _ => scanner.pos += 1,
        }
    }

    Ok(layouts)
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Scanner<'_> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn skip_line(&mut self) {
        while self.peek().is_some_and(|c| c != b'\n') {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> Range<usize> {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        start..self.pos
    }

    fn unterminated(&self) -> ParseError {
        ParseError::ParseError(format!("unterminated entry at byte {}", self.pos))
    }

    /// Parse an entry after its `@`; `None` for non-entry blocks and stray `@`s
    fn entry(&mut self) -> Result<Option<EntryLayout>, ParseError> {
        self.skip_ws();
        let kind = self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'-');
        let kind = String::from_utf8_lossy(&self.src[kind]).to_ascii_lowercase();
        self.skip_ws();

        let close = match self.peek() {
            Some(b'{') => b'}',
            Some(b'(') => b')',
            _ => return Ok(None),
        };
        self.pos += 1;

        if matches!(kind.as_str(), "comment" | "string" | "preamble") {
            self.skip_group(close)?;
            return Ok(None);
        }

        self.skip_ws();
        let key = self.take_while(|c| c != b',' && c != close && !c.is_ascii_whitespace());
        let mut fields = Vec::new();

        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(self.unterminated()),
                Some(c) if c == close => {
                    self.pos += 1;
                    break;
                }
                Some(b',') => self.pos += 1,
                Some(_) => {
                    let name = self.take_while(|c| {
                        c != b'=' && c != b',' && c != close && !c.is_ascii_whitespace()
                    });
                    let name = String::from_utf8_lossy(&self.src[name]).to_lowercase();
                    self.skip_ws();
                    if self.peek() != Some(b'=') {
                        return Err(ParseError::ParseError(format!(
                            "expected '=' after field '{}' at byte {}",
                            name, self.pos
                        )));
                    }
                    self.pos += 1;
                    let value = self.value(close)?;
                    fields.push((name, value));
                }
            }
        }

        Ok(Some(EntryLayout { key, fields }))
    }

    /// A value expression: braced, quoted or bare parts joined with `#`
    fn value(&mut self, close: u8) -> Result<Range<usize>, ParseError> {
        self.skip_ws();
        let start = self.pos;
        loop {
            match self.peek() {
                Some(b'{') => {
                    self.pos += 1;
                    self.skip_group(b'}')?;
                }
                Some(b'"') => {
                    self.pos += 1;
                    self.skip_quoted()?;
                }
                Some(c) if c != b',' && c != b'#' && c != close && !c.is_ascii_whitespace() => {
                    self.take_while(|c| {
                        c != b',' && c != b'#' && c != close && !c.is_ascii_whitespace()
                    });
                }
                _ => {
                    return Err(ParseError::ParseError(format!(
                        "expected field value at byte {}",
                        self.pos
                    )))
                }
            }
            let end = self.pos;
            self.skip_ws();
            if self.peek() == Some(b'#') {
                self.pos += 1;
                self.skip_ws();
            } else {
                return Ok(start..end);
            }
        }
    }

    /// Skip to just past `close` at brace depth zero
    fn skip_group(&mut self, close: u8) -> Result<(), ParseError> {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                b'}' if depth == 0 && close == b'}' => return Ok(()),
                b'{' => depth += 1,
                b'}' => depth = depth.saturating_sub(1),
                c if c == close && depth == 0 => return Ok(()),
                _ => {}
            }
        }
        Err(self.unterminated())
    }

    /// Skip to just past the closing quote at brace depth zero
    fn skip_quoted(&mut self) -> Result<(), ParseError> {
        let mut depth = 0usize;
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                b'"' if depth == 0 => return Ok(()),
                b'{' => depth += 1,
                b'}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        Err(self.unterminated())
    }
}

/// Extract a 4-digit year from a string
fn extract_year_from_string(s: &str) -> Option<String> {
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            let mut num = c.to_string();
            while let Some(&next) = chars.peek() {
                if next.is_ascii_digit() && num.len() < 4 {
                    num.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if num.len() == 4 {
                return Some(num);
            }
        }
    }
    None
}
