//! Analysis adapter: image in, normalized outcome out.
//!
//! Implementations never retry. Every retry, skip or halt decision is made
//! by the queue driver from the [`AnalysisOutcome`] alone.

pub mod vision;

use std::future::Future;
use std::path::Path;

use serde_json::Value;

/// Normalized result of analyzing one image.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// The service returned usable content.
    Success(Value),
    /// The call worked but found nothing to report. Permanent.
    EmptyResult,
    /// The service refused the call for a reason the operator can fix
    /// (credentials, quota, billing). Carries the HTTP status.
    TransientServiceFailure(u16),
    /// Anything else. Permanent for this item.
    FatalServiceFailure(String),
}

/// A remote (or fake) image analysis capability.
pub trait Analyzer {
    fn analyze(&self, path: &Path) -> impl Future<Output = AnalysisOutcome> + Send;
}

impl<T: Analyzer + Sync> Analyzer for &T {
    fn analyze(&self, path: &Path) -> impl Future<Output = AnalysisOutcome> + Send {
        (**self).analyze(path)
    }
}
