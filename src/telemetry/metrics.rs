//! Metric instrument factories for visionq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"visionq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for visionq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("visionq")
}

/// Counter: work items added by enrollment.
pub fn items_enrolled() -> Counter<u64> {
    meter()
        .u64_counter("visionq.items.enrolled")
        .with_description("Number of work items enrolled from the source directory")
        .build()
}

/// Counter: work items that reached a terminal status.
/// Labels: `outcome` ("succeeded" | "failed").
pub fn items_processed() -> Counter<u64> {
    meter()
        .u64_counter("visionq.items.processed")
        .with_description("Number of work items processed")
        .build()
}

/// Counter: operator-actionable service failures.
/// Labels: `status_code`.
pub fn transient_failures() -> Counter<u64> {
    meter()
        .u64_counter("visionq.analysis.transient_failures")
        .with_description("Number of transient analysis failures surfaced to the operator")
        .build()
}

/// Histogram: analysis call duration in milliseconds.
pub fn analysis_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("visionq.analysis.duration_ms")
        .with_description("Vision analysis call duration in milliseconds")
        .with_unit("ms")
        .build()
}
