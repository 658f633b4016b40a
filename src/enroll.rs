//! Enrollment: populate the queue from the source directory.
//!
//! Runs only when the queue holds no Pending items. It never merges new
//! files into a queue that is still draining, and never deletes or touches
//! rows that already exist.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};
use crate::event::{Observer, RunEvent};
use crate::storage::Storage;

/// What an enrollment call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrollReport {
    /// Eligible files found in the directory. Zero when the gate was closed.
    pub discovered: usize,
    /// Rows added to the queue.
    pub enrolled: usize,
    /// True when Pending items blocked enrollment.
    pub skipped_gate: bool,
}

/// List eligible files directly inside `dir`, sorted by file name.
///
/// `extensions` match case-insensitively, with or without a leading dot.
/// Subdirectories are not descended into.
pub fn discover(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let wanted: Vec<String> = extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let entries = std::fs::read_dir(dir)
        .map_err(|e| Error::Config(format!("cannot read source dir {}: {e}", dir.display())))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        // Follows symlinks, so a link to an image counts as a file.
        if !path.is_file() {
            continue;
        }

        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| wanted.iter().any(|w| w.eq_ignore_ascii_case(ext)));
        if !matches {
            continue;
        }

        if path.to_str().is_none() {
            warn!(path = %path.display(), "skipping file with non UTF-8 path");
            continue;
        }

        files.push(path);
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Enqueue every eligible file in `dir`, unless Pending items remain.
///
/// The rows go in as one batch, so a failed enrollment leaves the queue
/// as it was and the next attempt sees an open gate.
pub async fn enroll(
    dir: &Path,
    extensions: &[String],
    storage: &Storage,
    observer: &impl Observer,
) -> Result<EnrollReport> {
    let pending = storage.count_pending().await?;
    if pending > 0 {
        return Ok(gate_closed(pending, observer));
    }

    let files = discover(dir, extensions)?;
    let Some(ids) = storage.enqueue_all(&files).await? else {
        let pending = storage.count_pending().await?;
        return Ok(gate_closed(pending, observer));
    };

    observer.on_event(&RunEvent::Enrolled {
        discovered: files.len(),
        enrolled: ids.len(),
    });

    Ok(EnrollReport {
        discovered: files.len(),
        enrolled: ids.len(),
        skipped_gate: false,
    })
}

fn gate_closed(pending: u64, observer: &impl Observer) -> EnrollReport {
    observer.on_event(&RunEvent::EnrollmentSkipped { pending });
    EnrollReport {
        skipped_gate: true,
        ..Default::default()
    }
}
