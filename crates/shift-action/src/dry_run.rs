//! Dry-run sink: records scores in memory and logs them.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::info;

use shift_rollout::{ActionError, ActionFuture, RolloutAction};

#[derive(Debug, Default)]
pub struct DryRunAction {
    applied: Mutex<BTreeMap<String, u32>>,
}

impl DryRunAction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last score "applied" to `cluster`.
    pub fn applied(&self, cluster: &str) -> Option<u32> {
        self.applied
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(cluster)
            .copied()
    }
}

impl RolloutAction for DryRunAction {
    fn update_score<'a>(&'a self, cluster: &'a str, score: u32) -> ActionFuture<'a> {
        Box::pin(async move {
            info!(%cluster, score, "dry run: would update cluster score");
            self.applied
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(cluster.to_string(), score);
            Ok::<(), ActionError>(())
        })
    }
}
