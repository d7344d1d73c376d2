//! Analyzer seam: decides whether a rollout may keep progressing.

use std::future::Future;
use std::pin::Pin;

use crate::error::AnalysisError;

/// Boxed future returned by [`Analyzer::move_forward`].
pub type AnalysisFuture<'a> =
    Pin<Box<dyn Future<Output = Result<bool, AnalysisError>> + Send + 'a>>;

/// Judges, from live signals, whether traffic may keep moving to `cluster`.
///
/// `Ok(true)` means continue. `Ok(false)` and any error both stop the
/// rollout and revert all traffic to the old cluster.
pub trait Analyzer: Send + Sync {
    fn move_forward<'a>(&'a self, cluster: &'a str) -> AnalysisFuture<'a>;
}
