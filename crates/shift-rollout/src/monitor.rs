//! Analysis monitor: background task that polls the analyzer and raises
//! the abort signal when the new cluster must not receive more traffic.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::analyzer::Analyzer;
use crate::error::AnalysisError;
use crate::signal::{AbortReason, AbortSender};

/// Periodically asks the analyzer whether the rollout may continue.
pub struct AnalysisMonitor {
    cluster: String,
    analyzer: Arc<dyn Analyzer>,
    interval: Duration,
    timeout: Option<Duration>,
    abort: AbortSender,
}

impl AnalysisMonitor {
    pub fn new(
        cluster: &str,
        analyzer: Arc<dyn Analyzer>,
        interval: Duration,
        timeout: Option<Duration>,
        abort: AbortSender,
    ) -> Self {
        Self {
            cluster: cluster.to_string(),
            analyzer,
            interval,
            timeout,
            abort,
        }
    }

    /// Run the monitor on its own task until `shutdown` flips to `true`.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// The poll loop. Both the sleep and the analyzer call are raced
    /// against `shutdown`, so a stopped rollout never leaves this running.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(cluster = %self.cluster, interval = ?self.interval, "analysis monitor starting");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => break,
            }

            // An abort the driver has not taken yet is enough.
            if self.abort.is_pending() {
                debug!(cluster = %self.cluster, "abort already pending, skipping analysis");
                continue;
            }

            let verdict = tokio::select! {
                verdict = self.poll() => verdict,
                _ = shutdown.changed() => break,
            };

            match verdict {
                Ok(true) => {
                    debug!(cluster = %self.cluster, "analysis passed");
                }
                Ok(false) => {
                    info!(cluster = %self.cluster, "analysis rejected the new cluster, requesting revert");
                    self.raise(AbortReason::Rejected);
                }
                Err(e) => {
                    error!(cluster = %self.cluster, error = %e, cause = e.cause(), "analysis failed, requesting revert");
                    self.raise(AbortReason::AnalysisFailed(e.to_string()));
                }
            }
        }

        debug!(cluster = %self.cluster, "analysis monitor stopped");
    }

    async fn poll(&self) -> Result<bool, AnalysisError> {
        let call = self.analyzer.move_forward(&self.cluster);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| AnalysisError::Timeout(limit))?,
            None => call.await,
        }
    }

    fn raise(&self, reason: AbortReason) {
        if !self.abort.raise(reason) {
            debug!(cluster = %self.cluster, "abort already pending, dropped");
        }
    }
}
