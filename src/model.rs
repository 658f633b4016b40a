//! Core data model.
//!
//! A work item is one input image waiting to be analyzed. It has a stable
//! integer identity, the path it was enrolled from, and a three-valued status.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// One row of the work queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Assigned by the store on enqueue, never reused.
    pub id: ItemId,

    /// The input file this item was enrolled from.
    pub source_path: PathBuf,

    /// Current lifecycle status.
    pub status: Status,

    /// Diagnostic set on failure paths.
    pub comment: Option<String>,
}

/// Newtype for work item IDs (the SQLite rowid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub i64);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not yet processed. The only status eligible for processing.
    Pending,
    /// Analyzed and its JSON output written. Terminal.
    Succeeded,
    /// Permanently failed, or skipped by the operator. Terminal.
    Failed,
}

impl Status {
    /// Integer encoding used in the `status` column.
    pub fn code(self) -> i64 {
        match self {
            Status::Pending => 0,
            Status::Succeeded => 1,
            Status::Failed => -1,
        }
    }

    pub fn from_code(code: i64) -> Option<Status> {
        match code {
            0 => Some(Status::Pending),
            1 => Some(Status::Succeeded),
            -1 => Some(Status::Failed),
            _ => None,
        }
    }

    /// Can transition from self to `to`?
    ///
    /// Nothing ever leaves a terminal status; re-processing requires an
    /// administrative reset outside this crate.
    pub fn can_transition_to(self, to: Status) -> bool {
        use Status::*;
        matches!((self, to), (Pending, Succeeded) | (Pending, Failed))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Succeeded | Status::Failed)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Succeeded => "succeeded",
            Status::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Status {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Status::Pending),
            "succeeded" => Ok(Status::Succeeded),
            "failed" => Ok(Status::Failed),
            _ => Err(crate::error::Error::Other(format!("unknown status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Counts
// ---------------------------------------------------------------------------

/// Number of work items in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.succeeded + self.failed
    }
}
