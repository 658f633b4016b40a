//! SQLite storage layer.
//!
//! Single source of truth for work item status. One table, one row per
//! enrolled image. Status writes are single-statement and guarded on the
//! current status, so each one is atomic and a terminal row is never touched.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::error::{Error, Result};
use crate::model::*;

const INSERT_PENDING: &str = "INSERT INTO work_items (source_path, status) VALUES (?1, ?2)";
const COUNT_BY_STATUS: &str = "SELECT COUNT(*) FROM work_items WHERE status = ?1";

/// Storage backend. Owns the SQLite pool.
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open or create a database at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect(path.as_ref(), true).await
    }

    /// Open a database that must already exist.
    ///
    /// For read-only inspection, where a mistyped path should be an error
    /// rather than a fresh empty queue.
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::NotFound(format!("database {}", path.display())));
        }
        Self::connect(path, false).await
    }

    async fn connect(path: &Path, create: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal);
        // One logical owner; a single connection keeps writes serialized.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let storage = Self { pool };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    /// Create an in-memory database (for testing).
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // The database lives only as long as its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let storage = Self { pool };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    /// Create the work item table if absent. Safe on every startup.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS work_items (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                source_path TEXT NOT NULL,
                status      INTEGER NOT NULL DEFAULT 0,
                comment     TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_status ON work_items(status)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    /// Number of items still waiting to be processed.
    pub async fn count_pending(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(COUNT_BY_STATUS)
            .bind(Status::Pending.code())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Append one Pending row for `source_path`.
    pub async fn enqueue(&self, source_path: &Path) -> Result<ItemId> {
        let id = sqlx::query(INSERT_PENDING)
            .bind(path_text(source_path)?)
            .bind(Status::Pending.code())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(ItemId(id))
    }

    /// Append one Pending row per path, all or nothing, if the queue is drained.
    ///
    /// Returns `None` without inserting when Pending rows exist. Any error
    /// rolls the whole batch back, so the queue never holds part of a
    /// directory.
    pub async fn enqueue_all(&self, source_paths: &[PathBuf]) -> Result<Option<Vec<ItemId>>> {
        let mut tx = self.pool.begin().await?;

        let (pending,): (i64,) = sqlx::query_as(COUNT_BY_STATUS)
            .bind(Status::Pending.code())
            .fetch_one(&mut *tx)
            .await?;
        if pending > 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let mut ids = Vec::with_capacity(source_paths.len());
        for source_path in source_paths {
            let id = sqlx::query(INSERT_PENDING)
                .bind(path_text(source_path)?)
                .bind(Status::Pending.code())
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();
            ids.push(ItemId(id));
        }

        tx.commit().await?;
        Ok(Some(ids))
    }

    /// Snapshot of all Pending items in insertion order.
    ///
    /// The returned vector is detached from the table; later status updates
    /// do not change it.
    pub async fn fetch_pending(&self) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(
            "SELECT id, source_path, status, comment FROM work_items
             WHERE status = ?1 ORDER BY id ASC",
        )
        .bind(Status::Pending.code())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkItemRow::try_into_work_item).collect()
    }

    /// Pending → Succeeded.
    pub async fn mark_succeeded(&self, id: ItemId) -> Result<()> {
        self.finish(id, Status::Succeeded, None).await
    }

    /// Pending → Failed with a diagnostic comment.
    pub async fn mark_failed(&self, id: ItemId, comment: &str) -> Result<()> {
        self.finish(id, Status::Failed, Some(comment)).await
    }

    async fn finish(&self, id: ItemId, to: Status, comment: Option<&str>) -> Result<()> {
        if !Status::Pending.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: Status::Pending,
                to,
            });
        }

        let rows_affected =
            sqlx::query("UPDATE work_items SET status = ?1, comment = ?2 WHERE id = ?3 AND status = ?4")
                .bind(to.code())
                .bind(comment)
                .bind(id.0)
                .bind(Status::Pending.code())
                .execute(&self.pool)
                .await?
                .rows_affected();

        if rows_affected == 0 {
            // Either the row is gone or it already left Pending.
            let current = self.get(id).await?;
            return Err(Error::InvalidTransition {
                from: current.status,
                to,
            });
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Get a work item by ID.
    pub async fn get(&self, id: ItemId) -> Result<WorkItem> {
        let row: Option<WorkItemRow> =
            sqlx::query_as("SELECT id, source_path, status, comment FROM work_items WHERE id = ?1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.ok_or_else(|| Error::NotFound(format!("work item {id}")))?
            .try_into_work_item()
    }

    /// List work items, optionally filtered by status, oldest first.
    pub async fn list_by_status(&self, status: Option<Status>, limit: i64) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(
            "SELECT id, source_path, status, comment FROM work_items
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY id ASC
             LIMIT ?2",
        )
        .bind(status.map(Status::code))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(WorkItemRow::try_into_work_item).collect()
    }

    /// Count items per status.
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let rows: Vec<(i64, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM work_items GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = StatusCounts::default();
        for (code, count) in rows {
            match Status::from_code(code) {
                Some(Status::Pending) => counts.pending = count as u64,
                Some(Status::Succeeded) => counts.succeeded = count as u64,
                Some(Status::Failed) => counts.failed = count as u64,
                None => return Err(Error::Other(format!("unknown status code: {code}"))),
            }
        }
        Ok(counts)
    }

    /// Close the pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    #[cfg(test)]
    pub(crate) async fn execute_raw(&self, sql: &str) -> Result<()> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }
}

/// The stored form of a source path. The column is TEXT.
fn path_text(source_path: &Path) -> Result<&str> {
    source_path.to_str().ok_or_else(|| {
        Error::Other(format!(
            "source path is not valid UTF-8: {}",
            source_path.display()
        ))
    })
}

// ---------------------------------------------------------------------------
// Row parsing
// ---------------------------------------------------------------------------

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct WorkItemRow {
    id: i64,
    source_path: String,
    status: i64,
    comment: Option<String>,
}

impl WorkItemRow {
    fn try_into_work_item(self) -> Result<WorkItem> {
        let status = Status::from_code(self.status)
            .ok_or_else(|| Error::Other(format!("unknown status code: {}", self.status)))?;

        Ok(WorkItem {
            id: ItemId(self.id),
            source_path: PathBuf::from(self.source_path),
            status,
            comment: self.comment,
        })
    }
}
