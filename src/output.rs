//! JSON output files, one per successfully analyzed image.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{Error, Result};

/// `photo1.jpg` → `photo1.json`. `None` if the path has no file stem.
pub fn output_file_name(source: &Path) -> Option<OsString> {
    let mut name = source.file_stem()?.to_os_string();
    name.push(".json");
    Some(name)
}

/// Pretty-print an analysis result.
///
/// Returns `None` when there is nothing worth writing: a failed
/// serialization, or a document that is empty (`null`, `{}`, `[]`, `""`).
pub fn serialize_result(result: &Value) -> Option<String> {
    let empty = match result {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    };
    if empty {
        return None;
    }

    serde_json::to_string_pretty(result)
        .ok()
        .filter(|json| !json.trim().is_empty())
}

/// Writes JSON documents into the output directory.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the output directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            Error::Config(format!(
                "cannot create output dir {}: {e}",
                self.dir.display()
            ))
        })
    }

    /// Write `json` to `<dir>/<file_name>` in one step.
    ///
    /// Content goes to a temp file in the same directory, is fsynced, then
    /// renamed over the target. A crash leaves either the old file or the
    /// complete new one, never a truncated document.
    pub fn write(&self, file_name: &OsString, json: &str) -> Result<PathBuf> {
        let target = self.dir.join(file_name);

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| Error::Io(e.error))?;

        Ok(target)
    }
}
