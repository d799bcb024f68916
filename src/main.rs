use bibkeys::download::{DbDownloader, DEFAULT_DB_URL};
use bibkeys::journals::{Direction, JournalDb, BASE_DB_FILE, USER_DB_FILE};
use bibkeys::keygen::KeyFormat;
use bibkeys::prefs::{self, Preferences, GENKEY_FORMAT, JOURNAL_DB_URL};
use bibkeys::report::Report;
use bibkeys::{assign_keys, rename_journals, BibFile, Unmatched};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "bibkeys")]
#[command(version = "0.1.0")]
#[command(about = "Generate citation keys and expand or abbreviate journal names in .bib files", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Preferences file (defaults to the user config directory)
    #[arg(long, global = true)]
    prefs: Option<PathBuf>,

    /// Verbose output
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate keys like Bob08, Alice99, Alice99b from document metadata
    #[command(after_help = "Markers:\n  %y  two-digit year\n  %Y  four-digit year\n  %a  first author's surname\n  %t  title without spaces\n  %T  title with capitalized words\n  %w  first meaningful word of title")]
    Genkey {
        /// Input .bib file(s); all files form one batch
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Key format (defaults to the last format used, then %a%y)
        #[arg(long, short)]
        format: Option<String>,

        /// Write the new keys back into the files
        #[arg(long)]
        in_place: bool,
    },
    /// Expand abbreviated journal names to their full form
    Expand(JournalArgs),
    /// Abbreviate full journal names
    Shorten(JournalArgs),
    /// Manage the journal name database
    #[command(subcommand)]
    JournalDb(DbCommand),
}

#[derive(clap::Args, Debug)]
struct JournalArgs {
    /// Input .bib file(s)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Journal database file(s) to use instead of the installed ones
    #[arg(long)]
    db: Vec<PathBuf>,

    /// Use the closest database entry when there is no exact match
    #[arg(long)]
    accept_best: bool,

    /// Write the changes back into the files
    #[arg(long)]
    in_place: bool,
}

#[derive(Subcommand, Debug)]
enum DbCommand {
    /// Add an entry to the user database
    Add {
        /// Full journal name
        full: String,
        /// Abbreviated journal name
        abbreviation: String,
    },
    /// Replace the base database with a downloaded list
    Download {
        /// URL of a JabRef-style abbreviation list
        url: Option<String>,
    },
    /// Show where the databases live
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("bibkeys=debug")
            .init();
    }

    let prefs_path = args.prefs.clone().unwrap_or_else(Preferences::default_path);
    let mut preferences = match Preferences::load(&prefs_path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!(
                "{} Failed to load preferences from {}: {}",
                "Error:".red().bold(),
                prefs_path.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    };

    match args.command {
        Command::Genkey {
            files,
            format,
            in_place,
        } => run_genkey(&files, format, in_place, &mut preferences),
        Command::Expand(journal_args) => run_journals(&journal_args, Direction::Expand),
        Command::Shorten(journal_args) => run_journals(&journal_args, Direction::Shorten),
        Command::JournalDb(command) => run_db(command, &preferences).await,
    }
}

fn run_genkey(
    files: &[PathBuf],
    format: Option<String>,
    in_place: bool,
    preferences: &mut Preferences,
) -> ExitCode {
    let format = KeyFormat::new(
        format.unwrap_or_else(|| preferences.get(GENKEY_FORMAT).unwrap_or("").to_string()),
    );

    let Some(mut bib_files) = load_files(files) else {
        return ExitCode::FAILURE;
    };

    let report = assign_keys(&mut bib_files, &format);
    report.print();

    preferences.set(GENKEY_FORMAT, format.as_str());
    if let Err(e) = preferences.save() {
        eprintln!("{} Failed to save preferences: {}", "Warning:".yellow().bold(), e);
    }

    finish(&bib_files, &report, in_place)
}

fn run_journals(args: &JournalArgs, direction: Direction) -> ExitCode {
    let db = if args.db.is_empty() {
        JournalDb::load_dir(&prefs::data_dir())
    } else {
        JournalDb::load(&args.db)
    };
    let db = match db {
        Ok(db) => db,
        Err(e) => {
            eprintln!("{} Failed to load journal database: {}", "Error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    if !db.has_sources() {
        println!(
            "{}",
            "No journal name database found: \
             run `bibkeys journal-db download` to fetch a prepared list."
                .yellow()
        );
    }

    let Some(mut bib_files) = load_files(&args.files) else {
        return ExitCode::FAILURE;
    };

    let unmatched = if args.accept_best {
        Unmatched::AcceptBest
    } else {
        Unmatched::Keep
    };
    let report = rename_journals(&mut bib_files, &db, direction, unmatched);
    report.print();

    finish(&bib_files, &report, args.in_place)
}

async fn run_db(command: DbCommand, preferences: &Preferences) -> ExitCode {
    let dir = prefs::data_dir();

    match command {
        DbCommand::Add { full, abbreviation } => {
            let path = dir.join(USER_DB_FILE);
            let mut db = JournalDb::new();
            db.add(&full, &abbreviation);
            match db.append_last_to_file(&path) {
                Ok(()) => {
                    println!("Added '{}' = '{}' to {}", full, abbreviation, path.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                    ExitCode::FAILURE
                }
            }
        }
        DbCommand::Download { url } => {
            let url = url
                .or_else(|| preferences.get(JOURNAL_DB_URL).map(str::to_string))
                .unwrap_or_else(|| DEFAULT_DB_URL.to_string());
            let dest = dir.join(BASE_DB_FILE);

            let result = match DbDownloader::new() {
                Ok(downloader) => downloader.download(&url, &dest).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(count) => {
                    println!("Wrote {} entries to {}", count, dest.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("{} Download from {} failed: {}", "Error:".red().bold(), url, e);
                    ExitCode::FAILURE
                }
            }
        }
        DbCommand::Path => {
            println!("{}", dir.join(USER_DB_FILE).display());
            println!("{}", dir.join(BASE_DB_FILE).display());
            ExitCode::SUCCESS
        }
    }
}

/// Parse all input files, printing the first failure
fn load_files(paths: &[PathBuf]) -> Option<Vec<BibFile>> {
    let mut bib_files = Vec::new();

    for path in paths {
        if !path.exists() {
            eprintln!("{} File not found: {}", "Error:".red().bold(), path.display());
            return None;
        }

        match BibFile::load(path) {
            Ok(file) => {
                println!(
                    "Parsed {}: {} entries",
                    path.display().to_string().cyan(),
                    file.documents.len()
                );
                bib_files.push(file);
            }
            Err(e) => {
                eprintln!(
                    "{} Failed to parse {}: {}",
                    "Error:".red().bold(),
                    path.display(),
                    e
                );
                return None;
            }
        }
    }

    Some(bib_files)
}

/// Optionally write files back, then pick the exit code
fn finish(bib_files: &[BibFile], report: &Report, in_place: bool) -> ExitCode {
    if in_place {
        for file in bib_files {
            if let Err(e) = file.save() {
                eprintln!(
                    "{} Failed to write {}: {}",
                    "Error:".red().bold(),
                    display(&file.path),
                    e
                );
                return ExitCode::FAILURE;
            }
            println!("Wrote {}", display(&file.path).cyan());
        }
    }

    if report.count_failed() > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
