use crate::journals::{valid_lines, JournalError};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// JabRef's general abbreviation list
pub const DEFAULT_DB_URL: &str = "https://raw.githubusercontent.com/JabRef/reference-abbreviations/master/journals/journal_abbreviations_general.txt";
const USER_AGENT: &str = "bibkeys/0.1.0";

/// Fetches journal name lists over HTTP
pub struct DbDownloader {
    client: Client,
}

impl DbDownloader {
    pub fn new() -> Result<Self, JournalError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    /// Fetch a list, rejecting anything that is not plain text
    pub async fn fetch(&self, url: &str) -> Result<String, JournalError> {
        debug!(url, "downloading journal database");
        let response = self.client.get(url).send().await?.error_for_status()?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !is_plain_text(&content_type) {
            return Err(JournalError::ContentType(content_type));
        }

        Ok(response.text().await?)
    }

    /// Download a list and replace the database at `dest` with its valid lines.
    /// Returns the number of entries written.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<usize, JournalError> {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Downloading {}", url));
        pb.enable_steady_tick(Duration::from_millis(100));

        let body = self.fetch(url).await;
        pb.finish_and_clear();

        store_download(&body?, dest)
    }
}

/// Write the valid entry lines of `body` to `dest`, replacing it
pub fn store_download(body: &str, dest: &Path) -> Result<usize, JournalError> {
    let lines = valid_lines(body);
    if lines.is_empty() {
        return Err(JournalError::EmptyDownload);
    }

    let io_err = |source| JournalError::Io {
        path: dest.to_path_buf(),
        source,
    };
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(dest, content).map_err(io_err)?;

    info!(entries = lines.len(), path = %dest.display(), "wrote journal database");
    Ok(lines.len())
}

/// Media type check that ignores parameters such as `charset`
fn is_plain_text(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|mime| mime.trim().eq_ignore_ascii_case("text/plain"))
        .unwrap_or(false)
}
