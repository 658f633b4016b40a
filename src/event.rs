//! Structured events emitted at every decision point of a run.
//!
//! Enrollment and the queue driver never log directly; they report to an
//! [`Observer`]. The binary installs [`TracingObserver`], tests install a
//! recorder.

use std::path::PathBuf;

use opentelemetry::KeyValue;
use tracing::{error, info, warn};

use crate::decision::Decision;
use crate::engine::RunReport;
use crate::model::ItemId;
use crate::telemetry::metrics;

/// Something that happened during enrollment or processing.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Enrollment gate closed: the queue still holds Pending items.
    EnrollmentSkipped { pending: u64 },
    Enrolled { discovered: usize, enrolled: usize },
    ItemStarted { id: ItemId, source: PathBuf },
    ItemSucceeded { id: ItemId, output: PathBuf },
    ItemFailed { id: ItemId, source: PathBuf, reason: String },
    /// The service reported an operator-actionable condition.
    TransientFailure { id: ItemId, source: PathBuf, status_code: u16 },
    OperatorDecision { id: ItemId, decision: Decision },
    /// Operator halted the run; this item and the rest stay Pending.
    RunHalted { id: ItemId, remaining: usize },
    RunFinished { report: RunReport },
}

/// Receives run events.
pub trait Observer {
    fn on_event(&self, event: &RunEvent);
}

impl<T: Observer + ?Sized> Observer for &T {
    fn on_event(&self, event: &RunEvent) {
        (**self).on_event(event)
    }
}

/// Discards every event.
pub struct NullObserver;

impl Observer for NullObserver {
    fn on_event(&self, _event: &RunEvent) {}
}

/// Logs events through `tracing` and updates the OTel counters.
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_event(&self, event: &RunEvent) {
        match event {
            RunEvent::EnrollmentSkipped { pending } => {
                info!(pending, "queue not drained, skipping enrollment");
            }
            RunEvent::Enrolled {
                discovered,
                enrolled,
            } => {
                info!(discovered, enrolled, "enrollment finished");
                metrics::items_enrolled().add(*enrolled as u64, &[]);
            }
            RunEvent::ItemStarted { id, source } => {
                info!(id = id.0, source = %source.display(), "analyzing");
            }
            RunEvent::ItemSucceeded { id, output } => {
                info!(id = id.0, output = %output.display(), "item succeeded");
                metrics::items_processed().add(1, &[KeyValue::new("outcome", "succeeded")]);
            }
            RunEvent::ItemFailed { id, source, reason } => {
                warn!(id = id.0, source = %source.display(), %reason, "item failed");
                metrics::items_processed().add(1, &[KeyValue::new("outcome", "failed")]);
            }
            RunEvent::TransientFailure {
                id,
                source,
                status_code,
            } => {
                error!(
                    id = id.0,
                    source = %source.display(),
                    status_code,
                    "vision service refused the request, waiting for operator"
                );
                metrics::transient_failures().add(
                    1,
                    &[KeyValue::new("status_code", i64::from(*status_code))],
                );
            }
            RunEvent::OperatorDecision { id, decision } => {
                info!(id = id.0, ?decision, "operator decision");
            }
            RunEvent::RunHalted { id, remaining } => {
                warn!(id = id.0, remaining, "run halted by operator");
            }
            RunEvent::RunFinished { report } => {
                info!(
                    processed = report.processed,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    halted = report.halted,
                    "run finished"
                );
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct RecordingObserver {
    events: std::sync::Mutex<Vec<RunEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far.
    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl Observer for RecordingObserver {
    fn on_event(&self, event: &RunEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
