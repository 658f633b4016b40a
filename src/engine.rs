//! Queue driver. Drains the Pending snapshot one item at a time.
//!
//! Each item goes analyze → write → record before the next one starts. The
//! status write always comes last, so an interruption anywhere before it
//! leaves the item Pending and safe to redo on the next run.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;

use crate::analysis::{AnalysisOutcome, Analyzer};
use crate::decision::{Decision, DecisionProvider};
use crate::error::Result;
use crate::event::{Observer, RunEvent};
use crate::model::{Status, WorkItem};
use crate::output::{OutputWriter, output_file_name, serialize_result};
use crate::storage::Storage;
use crate::telemetry::metrics;
use crate::telemetry::work::{record_status, start_item_span};

/// Totals for one driver run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Items that reached a terminal status during this run.
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// The operator stopped the run before the snapshot was exhausted.
    pub halted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// How a single item ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Succeeded,
    Failed,
    Halted,
}

/// The queue driver. Owns its collaborators for the duration of a run.
pub struct Driver<'a, A, D, O> {
    storage: &'a Storage,
    analyzer: A,
    decisions: D,
    observer: O,
    output: OutputWriter,
}

impl<'a, A, D, O> Driver<'a, A, D, O>
where
    A: Analyzer,
    D: DecisionProvider,
    O: Observer,
{
    pub fn new(
        storage: &'a Storage,
        analyzer: A,
        decisions: D,
        observer: O,
        output: OutputWriter,
    ) -> Self {
        Self {
            storage,
            analyzer,
            decisions,
            observer,
            output,
        }
    }

    /// Process every item that is Pending right now.
    ///
    /// Per-item failures are recorded and never returned. An `Err` means the
    /// store (or the operator prompt) failed and the run cannot go on.
    pub async fn run(&mut self) -> Result<RunReport> {
        let started_at = Utc::now();
        let snapshot = self.storage.fetch_pending().await?;
        let total = snapshot.len();
        let mut claimed = self.claimed_outputs().await?;

        let mut report = RunReport {
            processed: 0,
            succeeded: 0,
            failed: 0,
            halted: false,
            started_at,
            finished_at: started_at,
        };

        for (index, item) in snapshot.iter().enumerate() {
            let span = start_item_span(item.id, &item.source_path);
            let step = self
                .process(item, &mut claimed)
                .instrument(span.clone())
                .await?;

            match step {
                Step::Succeeded => {
                    record_status(&span, "succeeded");
                    report.processed += 1;
                    report.succeeded += 1;
                }
                Step::Failed => {
                    record_status(&span, "failed");
                    report.processed += 1;
                    report.failed += 1;
                }
                Step::Halted => {
                    record_status(&span, "pending");
                    self.observer.on_event(&RunEvent::RunHalted {
                        id: item.id,
                        remaining: total - index,
                    });
                    report.halted = true;
                    break;
                }
            }
        }

        report.finished_at = Utc::now();
        self.observer.on_event(&RunEvent::RunFinished {
            report: report.clone(),
        });
        Ok(report)
    }

    /// Output names already owned by a Succeeded item, mapped to its source.
    async fn claimed_outputs(&self) -> Result<HashMap<OsString, PathBuf>> {
        let succeeded = self
            .storage
            .list_by_status(Some(Status::Succeeded), i64::MAX)
            .await?;
        Ok(succeeded
            .into_iter()
            .filter_map(|item| Some((output_file_name(&item.source_path)?, item.source_path)))
            .collect())
    }

    async fn process(
        &mut self,
        item: &WorkItem,
        claimed: &mut HashMap<OsString, PathBuf>,
    ) -> Result<Step> {
        self.observer.on_event(&RunEvent::ItemStarted {
            id: item.id,
            source: item.source_path.clone(),
        });

        let started = Instant::now();
        let outcome = self.analyzer.analyze(&item.source_path).await;
        metrics::analysis_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &[]);

        match outcome {
            AnalysisOutcome::Success(result) => self.record_success(item, &result, claimed).await,
            AnalysisOutcome::EmptyResult => self.record_failure(item, "empty result").await,
            AnalysisOutcome::FatalServiceFailure(reason) => {
                self.record_failure(item, &format!("analysis failed: {reason}"))
                    .await
            }
            AnalysisOutcome::TransientServiceFailure(status_code) => {
                self.observer.on_event(&RunEvent::TransientFailure {
                    id: item.id,
                    source: item.source_path.clone(),
                    status_code,
                });

                let decision = self.decisions.decide(item, status_code)?;
                self.observer.on_event(&RunEvent::OperatorDecision {
                    id: item.id,
                    decision,
                });

                match decision {
                    Decision::Skip => {
                        self.record_failure(
                            item,
                            &format!("skipped by operator after HTTP {status_code}"),
                        )
                        .await
                    }
                    Decision::Halt => Ok(Step::Halted),
                }
            }
        }
    }

    async fn record_success(
        &self,
        item: &WorkItem,
        result: &Value,
        claimed: &mut HashMap<OsString, PathBuf>,
    ) -> Result<Step> {
        let Some(json) = serialize_result(result) else {
            return self.record_failure(item, "empty serialization").await;
        };
        let Some(file_name) = output_file_name(&item.source_path) else {
            return self.record_failure(item, "source path has no file name").await;
        };
        // `photo.jpg` and `photo.jpeg` share `photo.json`; the first one keeps it.
        if let Some(owner) = claimed.get(&file_name)
            && owner != &item.source_path
        {
            let reason = format!("output name collides with {}", owner.display());
            return self.record_failure(item, &reason).await;
        }

        let output: PathBuf = match self.output.write(&file_name, &json) {
            Ok(path) => path,
            Err(e) => {
                return self
                    .record_failure(item, &format!("failed to write output: {e}"))
                    .await;
            }
        };

        self.storage.mark_succeeded(item.id).await?;
        claimed.insert(file_name, item.source_path.clone());
        self.observer
            .on_event(&RunEvent::ItemSucceeded { id: item.id, output });
        Ok(Step::Succeeded)
    }

    async fn record_failure(&self, item: &WorkItem, reason: &str) -> Result<Step> {
        self.storage.mark_failed(item.id, reason).await?;
        self.observer.on_event(&RunEvent::ItemFailed {
            id: item.id,
            source: item.source_path.clone(),
            reason: reason.to_string(),
        });
        Ok(Step::Failed)
    }
}
