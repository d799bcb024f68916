//! Journal name database for expanding and abbreviating `journal` fields.
//!
//! The file format follows the JabRef abbreviation lists: one
//! `<full name> = <abbreviation>` pair per line, `#` starts a comment.

use crate::entry::normalize_name;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use strsim::jaro_winkler;
use thiserror::Error;
use tracing::debug;

/// Entries added by the user
pub const USER_DB_FILE: &str = "journaldb_user.txt";
/// Entries from a downloaded list
pub const BASE_DB_FILE: &str = "journaldb_base.txt";

/// Number of suggestions offered when there is no exact match
pub const MAX_SUGGESTIONS: usize = 5;
const SUGGESTION_THRESHOLD: f64 = 0.75;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Document type must be text/plain and not {0}")]
    ContentType(String),
    #[error("No valid entries found in download")]
    EmptyDownload,
    #[error("No entries to save")]
    NothingToSave,
}

/// One full name with its abbreviation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub full: String,
    pub abbreviation: String,
}

/// Which way to convert journal names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Abbreviation to full name
    Expand,
    /// Full name to abbreviation
    Shorten,
}

impl Direction {
    /// Column matched against the current name
    fn source(self, entry: &JournalEntry) -> &str {
        match self {
            Direction::Expand => &entry.abbreviation,
            Direction::Shorten => &entry.full,
        }
    }

    /// Column the name is converted to
    fn target(self, entry: &JournalEntry) -> &str {
        match self {
            Direction::Expand => &entry.full,
            Direction::Shorten => &entry.abbreviation,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Expand => write!(f, "expand"),
            Direction::Shorten => write!(f, "shorten"),
        }
    }
}

/// Result of looking a journal name up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Field is empty
    Empty,
    /// Exact match, replace with this name
    Replace(String),
    /// Name is already in the requested form
    AlreadyConverted,
    /// No exact match; closest candidates in the requested form, best first
    Suggestions(Vec<String>),
}

/// Parse one database line into an entry
pub fn parse_line(line: &str) -> Option<JournalEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let parts: Vec<&str> = line.split('=').collect();
    if parts.len() != 2 {
        debug!(line, "unparsable line in journal name database");
        return None;
    }

    Some(JournalEntry {
        full: parts[0].trim().to_string(),
        abbreviation: parts[1].trim().to_string(),
    })
}

/// In-memory journal name table
#[derive(Debug, Default, Clone)]
pub struct JournalDb {
    entries: Vec<JournalEntry>,
    loaded_files: usize,
}

impl JournalDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the user database, then the base database, from `dir`
    pub fn load_dir(dir: &Path) -> Result<Self, JournalError> {
        Self::load(&[dir.join(USER_DB_FILE), dir.join(BASE_DB_FILE)])
    }

    /// Load all existing files in order; missing files are skipped
    pub fn load(paths: &[PathBuf]) -> Result<Self, JournalError> {
        let mut db = Self::new();
        for path in paths {
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "journal database not found");
                    continue;
                }
                Err(source) => {
                    return Err(JournalError::Io {
                        path: path.clone(),
                        source,
                    })
                }
            };
            db.extend_from_str(&content);
            db.loaded_files += 1;
        }
        debug!(entries = db.len(), files = db.loaded_files, "loaded journal database");
        Ok(db)
    }

    /// Add every valid line of `content`
    pub fn extend_from_str(&mut self, content: &str) {
        self.entries.extend(content.lines().filter_map(parse_line));
    }

    /// False when no database file could be read
    pub fn has_sources(&self) -> bool {
        self.loaded_files > 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn add(&mut self, full: &str, abbreviation: &str) {
        self.entries.push(JournalEntry {
            full: full.trim().to_string(),
            abbreviation: abbreviation.trim().to_string(),
        });
    }

    /// Abbreviation to full name
    pub fn expand(&self, name: &str) -> Lookup {
        self.lookup(name, Direction::Expand)
    }

    /// Full name to abbreviation
    pub fn shorten(&self, name: &str) -> Lookup {
        self.lookup(name, Direction::Shorten)
    }

    pub fn lookup(&self, name: &str, direction: Direction) -> Lookup {
        let wanted = normalize_name(name);
        if wanted.is_empty() {
            return Lookup::Empty;
        }

        let exact = self
            .entries
            .iter()
            .find(|e| normalize_name(direction.source(e)) == wanted);
        if let Some(entry) = exact {
            return Lookup::Replace(direction.target(entry).to_string());
        }
        if self.entries.iter().any(|e| normalize_name(direction.target(e)) == wanted) {
            return Lookup::AlreadyConverted;
        }

        let mut scored: Vec<(&JournalEntry, f64)> = self
            .entries
            .iter()
            .map(|e| (e, jaro_winkler(name.trim(), direction.source(e))))
            .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut suggestions: Vec<String> = Vec::new();
        for (entry, _) in scored {
            let candidate = direction.target(entry).to_string();
            if !suggestions.contains(&candidate) {
                suggestions.push(candidate);
            }
            if suggestions.len() == MAX_SUGGESTIONS {
                break;
            }
        }
        Lookup::Suggestions(suggestions)
    }

    /// Append the most recently added entry to the file at `path`
    pub fn append_last_to_file(&self, path: &Path) -> Result<(), JournalError> {
        let entry = self.entries.last().ok_or(JournalError::NothingToSave)?;
        let io_err = |source| JournalError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;
        writeln!(file, "{} = {}", entry.full, entry.abbreviation).map_err(io_err)?;
        Ok(())
    }
}

/// Lines of `content` that hold a valid entry, as written
pub fn valid_lines(content: &str) -> Vec<&str> {
    content.lines().filter(|line| parse_line(line).is_some()).collect()
}
