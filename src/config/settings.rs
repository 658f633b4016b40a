//! Pipeline settings from a TOML file.
//!
//! Every field has a default, so an absent file is the same as an empty one.
//!
//! ```toml
//! source_dir = "images"
//! output_dir = "results"
//! database = "queue.db"
//! extensions = ["jpg", "jpeg", "png"]
//! features = ["DOCUMENT_TEXT_DETECTION"]
//! request_timeout_secs = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory scanned (non-recursively) for input images.
    pub source_dir: PathBuf,
    /// Directory receiving one `<name>.json` per analyzed image.
    pub output_dir: PathBuf,
    /// SQLite file holding the work queue.
    pub database: PathBuf,
    /// Eligible file extensions, matched case-insensitively.
    pub extensions: Vec<String>,
    /// Vision feature types requested per image.
    pub features: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("images"),
            output_dir: PathBuf::from("results"),
            database: PathBuf::from("visionq.db"),
            extensions: vec!["jpg".to_string(), "jpeg".to_string()],
            features: vec!["DOCUMENT_TEXT_DETECTION".to_string()],
            request_timeout_secs: 60,
        }
    }
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("bad settings: {e}")))
    }

    /// Load settings from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read settings {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reject settings that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.extensions.is_empty() {
            return Err(Error::Config("no file extensions configured".to_string()));
        }
        if self.features.is_empty() {
            return Err(Error::Config("no vision features configured".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
