//! Score updater: pushes one cluster's score and records the outcome.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::MAX_SCORE;
use crate::action::RolloutAction;
use crate::error::ActionError;
use crate::metrics::RolloutMetrics;

/// Wraps the action sink with metric bookkeeping.
#[derive(Clone)]
pub struct ScoreUpdater {
    action: Arc<dyn RolloutAction>,
    metrics: Arc<RolloutMetrics>,
}

impl ScoreUpdater {
    pub fn new(action: Arc<dyn RolloutAction>, metrics: Arc<RolloutMetrics>) -> Self {
        Self { action, metrics }
    }

    /// Push `score` to `cluster`.
    ///
    /// On success `score_updates_total{cluster}` is incremented and
    /// `cluster_score{cluster}` set. On failure
    /// `score_update_failures_total{cluster, cause}` is incremented and the
    /// error returned; nothing is retried here.
    pub async fn update_score(&self, cluster: &str, score: u32) -> Result<(), ActionError> {
        let result = if score > MAX_SCORE {
            Err(ActionError::InvalidScore(score))
        } else {
            self.action.update_score(cluster, score).await
        };

        match result {
            Ok(()) => {
                self.metrics.record_success(cluster, score).await;
                debug!(%cluster, score, "cluster score applied");
                Ok(())
            }
            Err(e) => {
                self.metrics.record_failure(cluster, e.cause()).await;
                warn!(%cluster, score, error = %e, "cluster score update failed");
                Err(e)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn metrics(&self) -> &Arc<RolloutMetrics> {
        &self.metrics
    }
}
