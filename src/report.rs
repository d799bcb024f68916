use colored::Colorize;
use std::path::PathBuf;

/// Outcome of a batch operation over all documents
pub struct Report {
    pub title: String,
    pub entries: Vec<EntryReport>,
}

/// Outcome for a single document
pub struct EntryReport {
    /// Key the document had before the operation
    pub key: String,
    pub file: PathBuf,
    pub status: EntryStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    /// Citation key assigned
    Keyed(String),
    /// Field value replaced
    Changed { from: String, to: String },
    /// Nothing to do
    Unchanged,
    /// No exact match; candidates shown to the user
    Unresolved { value: String, suggestions: Vec<String> },
    /// Operation failed for this document
    Failed(String),
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, report: EntryReport) {
        self.entries.push(report);
    }

    pub fn count_changed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Keyed(_) | EntryStatus::Changed { .. }))
            .count()
    }

    pub fn count_unchanged(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Unchanged))
            .count()
    }

    pub fn count_unresolved(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Unresolved { .. }))
            .count()
    }

    pub fn count_failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Failed(_)))
            .count()
    }

    /// Print the report to stdout with colors
    pub fn print(&self) {
        println!();
        println!("{}", self.title.bold());
        println!("{}", "=".repeat(50));
        println!();

        println!("Processed: {} entries", self.entries.len());
        println!(
            "  {} changed, {} unchanged, {} unresolved, {} failed",
            self.count_changed().to_string().green(),
            self.count_unchanged().to_string().dimmed(),
            self.count_unresolved().to_string().yellow(),
            self.count_failed().to_string().red()
        );
        println!();

        let failed: Vec<_> = self
            .entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Failed(_)))
            .collect();
        if !failed.is_empty() {
            println!("{}", format!("FAILED ({})", failed.len()).red().bold());
            for entry in failed {
                print_entry(entry);
            }
            println!();
        }

        let unresolved: Vec<_> = self
            .entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Unresolved { .. }))
            .collect();
        if !unresolved.is_empty() {
            println!(
                "{}",
                format!("NO EXACT MATCH ({})", unresolved.len()).yellow().bold()
            );
            for entry in unresolved {
                print_entry(entry);
            }
            println!();
        }

        let changed: Vec<_> = self
            .entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Keyed(_) | EntryStatus::Changed { .. }))
            .collect();
        if !changed.is_empty() {
            println!("{}", format!("CHANGED ({})", changed.len()).green().bold());
            for entry in changed {
                print_entry(entry);
            }
        }

        println!();
    }
}

fn print_entry(entry: &EntryReport) {
    let key = format!("[{}]", entry.key).dimmed();
    let file = entry.file.display().to_string().dimmed();

    match &entry.status {
        EntryStatus::Keyed(new_key) => {
            println!("  {} -> {} ({})", key, new_key.green(), file);
        }
        EntryStatus::Changed { from, to } => {
            println!("  {} {} -> {}", key, truncate(from, 40), truncate(to, 40).green());
        }
        EntryStatus::Unchanged => {}
        EntryStatus::Unresolved { value, suggestions } => {
            println!("  {} '{}' ({})", key, value, file);
            if suggestions.is_empty() {
                println!("       {}", "no close matches in the database".dimmed());
            }
            for suggestion in suggestions {
                println!("       ? {}", suggestion);
            }
        }
        EntryStatus::Failed(message) => {
            println!("  {} {} {} ({})", key, "ERROR".red(), message, file);
        }
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: EntryStatus) -> EntryReport {
        EntryReport {
            key: "k".to_string(),
            file: PathBuf::from("refs.bib"),
            status,
        }
    }

    #[test]
    fn counts_by_status() {
        let mut report = Report::new("test");
        report.add(entry(EntryStatus::Keyed("Doe99".to_string())));
        report.add(entry(EntryStatus::Changed {
            from: "a".to_string(),
            to: "b".to_string(),
        }));
        report.add(entry(EntryStatus::Unchanged));
        report.add(entry(EntryStatus::Unresolved {
            value: "x".to_string(),
            suggestions: vec![],
        }));
        report.add(entry(EntryStatus::Failed("Missing required field: author".to_string())));

        assert_eq!(report.count_changed(), 2);
        assert_eq!(report.count_unchanged(), 1);
        assert_eq!(report.count_unresolved(), 1);
        assert_eq!(report.count_failed(), 1);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Physical Review Letters", 10), "Physica...");
    }
}
