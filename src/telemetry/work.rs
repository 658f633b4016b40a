//! Work item span helpers.

use std::path::Path;

use tracing::Span;

use crate::model::ItemId;

/// Start a span covering one item's analyze → write → record cycle.
///
/// The `work.status` field is declared empty and filled by
/// [`record_status`] once the item's fate is known.
pub fn start_item_span(id: ItemId, source: &Path) -> Span {
    tracing::info_span!(
        "work.execute",
        "work.id" = id.0,
        "work.source" = %source.display(),
        "work.status" = tracing::field::Empty,
    )
}

/// Record the final status of the item on its span.
pub fn record_status(span: &Span, status: &str) {
    span.record("work.status", status);
}
