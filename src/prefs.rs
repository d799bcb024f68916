use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Key format used by the last `genkey` run
pub const GENKEY_FORMAT: &str = "genkey_format";
/// Where `journal-db download` fetches from
pub const JOURNAL_DB_URL: &str = "journal_db_url";

const APP_DIR: &str = "bibkeys";
const PREFS_FILE: &str = "prefs.json";

#[derive(Error, Debug)]
pub enum PrefsError {
    #[error("Failed to create config directory: {0}")]
    CreateDir(std::io::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// String preferences persisted as a JSON object
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(skip)]
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl Preferences {
    /// Default location: `<config dir>/bibkeys/prefs.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(APP_DIR)
            .join(PREFS_FILE)
    }

    /// Load preferences from `path`; a missing file gives empty preferences
    pub fn load(path: &Path) -> Result<Self, PrefsError> {
        let mut prefs = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str::<Preferences>(&content)?
        } else {
            Preferences::default()
        };
        prefs.path = path.to_path_buf();
        Ok(prefs)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value of a preference; empty values count as unset
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, name: &str, value: &str) {
        self.values.insert(name.to_string(), value.to_string());
    }

    /// Write preferences back to their file
    pub fn save(&self) -> Result<(), PrefsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(PrefsError::CreateDir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Directory holding the journal name databases
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join(APP_DIR)
}
