pub mod download;
pub mod entry;
pub mod journals;
pub mod keygen;
pub mod parser;
pub mod prefs;
pub mod report;

use entry::{Document, Record};
use journals::{Direction, JournalDb, Lookup};
use keygen::{KeyFormat, KeyGenerator};
use parser::ParseError;
use report::{EntryReport, EntryStatus, Report};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Documents loaded from one .bib file
pub struct BibFile {
    pub path: PathBuf,
    pub documents: Vec<Document>,
}

impl BibFile {
    pub fn load(path: &Path) -> Result<Self, ParseError> {
        let documents = parser::parse_bib_file(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            documents,
        })
    }

    /// Rewrite the file with the current keys and journal names
    pub fn save(&self) -> Result<(), ParseError> {
        parser::write_bib_file(&self.path, &self.documents)
    }
}

/// What to do with a journal name that has no exact database match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Unmatched {
    /// Leave the field alone and report the suggestions
    #[default]
    Keep,
    /// Take the closest suggestion, if any
    AcceptBest,
}

/// Generate keys for every document of every file as one batch
pub fn assign_keys(files: &mut [BibFile], format: &KeyFormat) -> Report {
    let mut generator = KeyGenerator::new(format.clone());
    let mut report = Report::new(format!("Citation keys ({})", format));

    for file in files.iter_mut() {
        for document in file.documents.iter_mut() {
            let previous = document.key.clone();
            let status = match generator.assign(document) {
                Ok(key) => EntryStatus::Keyed(key),
                Err(e) => EntryStatus::Failed(e.to_string()),
            };
            report.add(EntryReport {
                key: previous,
                file: file.path.clone(),
                status,
            });
        }
    }

    report
}

/// Expand or abbreviate the journal of every document of every file
pub fn rename_journals(
    files: &mut [BibFile],
    db: &JournalDb,
    direction: Direction,
    unmatched: Unmatched,
) -> Report {
    let mut report = Report::new(format!("Journal names ({})", direction));

    for file in files.iter_mut() {
        for document in file.documents.iter_mut() {
            let status = rename_journal(document, db, direction, unmatched);
            report.add(EntryReport {
                key: document.key.clone(),
                file: file.path.clone(),
                status,
            });
        }
    }

    report
}

/// Convert the `journal` field of one record
pub fn rename_journal<R: Record>(
    record: &mut R,
    db: &JournalDb,
    direction: Direction,
    unmatched: Unmatched,
) -> EntryStatus {
    let current = record.field("journal").unwrap_or("").to_string();

    let replacement = match db.lookup(&current, direction) {
        Lookup::Empty | Lookup::AlreadyConverted => None,
        Lookup::Replace(name) => Some(name),
        Lookup::Suggestions(suggestions) => {
            let best = suggestions.first().cloned();
            match (unmatched, best) {
                (Unmatched::AcceptBest, Some(best)) => Some(best),
                _ => {
                    return EntryStatus::Unresolved {
                        value: current,
                        suggestions,
                    }
                }
            }
        }
    };

    match replacement {
        Some(name) if name != current => {
            debug!(key = record.key(), from = %current, to = %name, "changed journal");
            record.set_field("journal", name.clone());
            EntryStatus::Changed {
                from: current,
                to: name,
            }
        }
        _ => EntryStatus::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn file(docs: Vec<Document>) -> BibFile {
        BibFile {
            path: PathBuf::from("refs.bib"),
            documents: docs,
        }
    }

    fn doc(key: &str, author: &str, year: &str, journal: &str) -> Document {
        Document::new(key.to_string(), "article".to_string())
            .with_field("author", author)
            .with_field("year", year)
            .with_field("title", "Some Title")
            .with_field("journal", journal)
    }

    fn db() -> JournalDb {
        let mut db = JournalDb::new();
        db.add("Physical Review B", "Phys. Rev. B");
        db.add("Physical Review Letters", "Phys. Rev. Lett.");
        db
    }

    #[test]
    fn keys_are_unique_across_files() {
        let mut files = vec![
            file(vec![doc("a", "Smith, J.", "2008", "")]),
            file(vec![doc("b", "Smith, K.", "2008", ""), doc("c", "", "2008", "")]),
        ];

        let report = assign_keys(&mut files, &KeyFormat::default());

        assert_eq!(files[0].documents[0].key, "Smith08");
        assert_eq!(files[1].documents[0].key, "Smith08b");
        assert_eq!(files[1].documents[1].key, "c");
        assert_eq!(report.count_changed(), 2);
        assert_eq!(report.count_failed(), 1);
        assert_eq!(report.entries[1].key, "b");
    }

    #[test]
    fn journals_are_expanded_and_unknown_ones_reported() {
        let mut files = vec![file(vec![
            doc("a", "X", "2000", "Phys. Rev. B"),
            doc("b", "X", "2000", "Physical Review Letters"),
            doc("c", "X", "2000", "Phys. Rev. Let."),
            doc("d", "X", "2000", ""),
        ])];

        let report = rename_journals(&mut files, &db(), Direction::Expand, Unmatched::Keep);
        let docs = &files[0].documents;

        assert_eq!(docs[0].field("journal"), Some("Physical Review B"));
        assert_eq!(docs[1].field("journal"), Some("Physical Review Letters"));
        assert_eq!(docs[2].field("journal"), Some("Phys. Rev. Let."));
        assert_eq!(report.count_changed(), 1);
        assert_eq!(report.count_unchanged(), 2);
        assert_eq!(report.count_unresolved(), 1);
    }

    #[test]
    fn best_suggestion_can_be_accepted() {
        let mut document = doc("c", "X", "2000", "Phys. Rev. Let.");
        let status =
            rename_journal(&mut document, &db(), Direction::Expand, Unmatched::AcceptBest);

        assert_eq!(
            status,
            EntryStatus::Changed {
                from: "Phys. Rev. Let.".to_string(),
                to: "Physical Review Letters".to_string(),
            }
        );
        assert_eq!(document.field("journal"), Some("Physical Review Letters"));
    }

    #[test]
    fn shorten_uses_abbreviation() {
        let mut document = doc("a", "X", "2000", "physical review b");
        let status = rename_journal(&mut document, &db(), Direction::Shorten, Unmatched::Keep);

        assert!(matches!(status, EntryStatus::Changed { .. }));
        assert_eq!(document.field("journal"), Some("Phys. Rev. B"));
    }

    #[test]
    fn saving_keeps_entries_when_a_failed_key_clashes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("refs.bib");
        let content = "@article{Smith08,\n  author = {},\n  title = {Anonymous},\n  \
                       year = {2008}\n}\n\n\
                       @article{x,\n  author = {Smith, John},\n  title = {Known},\n  \
                       year = {2008}\n}\n";
        fs::write(&path, content).unwrap();

        let mut files = vec![BibFile::load(&path).unwrap()];
        let report = assign_keys(&mut files, &KeyFormat::default());
        assert_eq!(report.count_failed(), 1);
        assert_eq!(files[0].documents[1].key, "Smith08");

        let err = files[0].save().unwrap_err();
        assert!(matches!(err, ParseError::DuplicateKey(ref key) if key == "Smith08"));
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
        assert_eq!(parser::parse_bib_file(&path).unwrap().len(), 2);
    }

    #[test]
    fn saving_new_keys_keeps_the_rest_of_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("refs.bib");
        let content = "% reading list\n@string{jap = {Journal of Applied Physics}}\n\n\
                       @article{draft,\n  author = {Doe, Jane},\n  title = {Things},\n  \
                       journal = jap,\n  year = {1999}\n}\n";
        fs::write(&path, content).unwrap();

        let mut files = vec![BibFile::load(&path).unwrap()];
        assign_keys(&mut files, &KeyFormat::default());
        files[0].save().unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, content.replace("@article{draft,", "@article{Doe99,"));

        let reloaded = BibFile::load(&path).unwrap();
        assert_eq!(reloaded.documents[0].key, "Doe99");
        assert_eq!(reloaded.documents[0].field("journal"), Some("Journal of Applied Physics"));
    }
}
