//! Rollout controller: drives traffic from the old cluster to the new one.
//!
//! The driver owns the current score and phase. It wakes up on three
//! sources: an external stop request, an abort raised by the analysis
//! monitor, and the periodic rollout tick. Each wakeup is handled to
//! completion before the next one is looked at.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::MAX_SCORE;
use crate::action::RolloutAction;
use crate::analyzer::Analyzer;
use crate::config::RolloutSettings;
use crate::error::RolloutResult;
use crate::metrics::RolloutMetrics;
use crate::monitor::AnalysisMonitor;
use crate::signal::{AbortReason, abort_signal};
use crate::updater::ScoreUpdater;

/// Current phase of a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutPhase {
    /// Moving traffic to the new cluster on every tick.
    Progressing,
    /// Pushing the terminal revert scores.
    Reverting,
    /// Finished. No further score updates are issued.
    Stopped,
}

/// How a rollout ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutOutcome {
    /// The new cluster reached a score of 100.
    Completed,
    /// Analysis rejected the new cluster; all traffic went back to the old one.
    Reverted,
    /// Stopped on request, scores left where they were.
    Stopped,
}

/// Read-only snapshot of a rollout, published after every transition.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RolloutStatus {
    pub old_cluster: String,
    pub new_cluster: String,
    /// Score of the new cluster; the old cluster targets `100 - score`.
    pub score: u32,
    pub phase: RolloutPhase,
}

/// Driver-local mutable state. Never shared.
struct RolloutState {
    score: u32,
    phase: RolloutPhase,
}

impl RolloutState {
    fn advance(&mut self, step: u32) -> u32 {
        self.score = next_score(self.score, step);
        self.score
    }
}

/// Next score for the new cluster, clamped to 100.
fn next_score(current: u32, step: u32) -> u32 {
    current.saturating_add(step).min(MAX_SCORE)
}

/// A single progressive rollout from `old_cluster` to `new_cluster`.
///
/// Construct it, grab a [`RolloutHandle`] if something else needs to stop
/// or observe it, then `start()` it. `start` consumes the controller: a
/// rollout runs once.
pub struct RolloutController {
    settings: RolloutSettings,
    analyzer: Arc<dyn Analyzer>,
    action: Arc<dyn RolloutAction>,
    metrics: Arc<RolloutMetrics>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    status_tx: Arc<watch::Sender<RolloutStatus>>,
}

impl RolloutController {
    /// Create a rollout. Invalid parameters are rejected here, never
    /// inside the running loop.
    pub fn new(
        old_cluster: &str,
        new_cluster: &str,
        rollout_interval: Duration,
        analysis_interval: Duration,
        step: u32,
        analyzer: Arc<dyn Analyzer>,
        action: Arc<dyn RolloutAction>,
    ) -> RolloutResult<Self> {
        let settings = RolloutSettings::new(
            old_cluster,
            new_cluster,
            rollout_interval,
            analysis_interval,
            step,
        )?;
        Ok(Self::from_settings(settings, analyzer, action))
    }

    pub fn from_settings(
        settings: RolloutSettings,
        analyzer: Arc<dyn Analyzer>,
        action: Arc<dyn RolloutAction>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (status_tx, _) = watch::channel(RolloutStatus {
            old_cluster: settings.old_cluster().to_string(),
            new_cluster: settings.new_cluster().to_string(),
            score: 0,
            phase: RolloutPhase::Progressing,
        });

        Self {
            settings,
            analyzer,
            action,
            metrics: Arc::new(RolloutMetrics::new()),
            shutdown_tx: Arc::new(shutdown_tx),
            status_tx: Arc::new(status_tx),
        }
    }

    /// Record into a shared metrics registry instead of a private one.
    pub fn with_metrics(mut self, metrics: Arc<RolloutMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<RolloutMetrics> {
        self.metrics.clone()
    }

    pub fn settings(&self) -> &RolloutSettings {
        &self.settings
    }

    /// A cloneable handle to stop or observe the rollout from elsewhere.
    pub fn handle(&self) -> RolloutHandle {
        RolloutHandle {
            shutdown_tx: self.shutdown_tx.clone(),
            status_rx: self.status_tx.subscribe(),
        }
    }

    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        request_stop(&self.shutdown_tx);
    }

    /// Run the rollout to completion.
    ///
    /// Spawns the analysis monitor, then drives the score until the
    /// rollout completes, reverts, or is stopped. The monitor is shut down
    /// and awaited before this returns.
    pub async fn start(self) -> RolloutOutcome {
        let old = self.settings.old_cluster().to_string();
        let new = self.settings.new_cluster().to_string();
        let step = self.settings.step();

        let (abort_tx, mut abort_rx) = abort_signal();
        let mut shutdown = self.shutdown_tx.subscribe();

        let monitor = AnalysisMonitor::new(
            &new,
            self.analyzer.clone(),
            self.settings.analysis_interval(),
            self.settings.analysis_timeout(),
            abort_tx,
        )
        .spawn(self.shutdown_tx.subscribe());

        let updater = ScoreUpdater::new(self.action.clone(), self.metrics.clone());
        let mut state = RolloutState {
            score: 0,
            phase: RolloutPhase::Progressing,
        };

        info!(
            old_cluster = %old,
            new_cluster = %new,
            step,
            interval = ?self.settings.rollout_interval(),
            "rollout started"
        );
        self.publish(&state);

        let period = self.settings.rollout_interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            if *shutdown.borrow_and_update() {
                info!(new_cluster = %new, score = state.score, "rollout stopped on request");
                break RolloutOutcome::Stopped;
            }

            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    info!(new_cluster = %new, score = state.score, "rollout stopped on request");
                    break RolloutOutcome::Stopped;
                }

                reason = abort_rx.recv() => {
                    // A closed channel means the monitor is gone; without
                    // it nothing gates progress, so treat it as a failure.
                    let reason = reason.unwrap_or_else(|| {
                        AbortReason::AnalysisFailed("analysis monitor exited".to_string())
                    });
                    self.revert(&updater, &mut state, &reason).await;
                    break RolloutOutcome::Reverted;
                }

                _ = ticker.tick() => {
                    if state.score == MAX_SCORE {
                        info!(old_cluster = %old, new_cluster = %new, "rollout completed");
                        break RolloutOutcome::Completed;
                    }

                    let score = state.advance(step);
                    // Two independent pushes: a failure between them leaves
                    // the pair out of balance until the next tick.
                    self.push(&updater, &new, score).await;
                    self.push(&updater, &old, MAX_SCORE - score).await;
                    info!(
                        old_cluster = %old,
                        old_score = MAX_SCORE - score,
                        new_cluster = %new,
                        new_score = score,
                        "cluster scores updated"
                    );
                    self.publish(&state);
                }
            }
        };

        drop(ticker);
        state.phase = RolloutPhase::Stopped;
        self.publish(&state);

        request_stop(&self.shutdown_tx);
        if let Err(e) = monitor.await {
            error!(error = %e, "analysis monitor task failed");
        }

        info!(?outcome, new_cluster = %new, score = state.score, "rollout finished");
        outcome
    }

    /// Send every bit of traffic back to the old cluster.
    async fn revert(&self, updater: &ScoreUpdater, state: &mut RolloutState, reason: &AbortReason) {
        let old = self.settings.old_cluster();
        let new = self.settings.new_cluster();

        warn!(
            old_cluster = %old,
            new_cluster = %new,
            score = state.score,
            %reason,
            "reverting rollout"
        );
        state.phase = RolloutPhase::Reverting;
        self.publish(state);

        self.push(updater, old, MAX_SCORE).await;
        self.push(updater, new, 0).await;
        state.score = 0;

        info!(
            old_cluster = %old,
            old_score = MAX_SCORE,
            new_cluster = %new,
            new_score = 0,
            "cluster scores reverted"
        );
    }

    /// Push one score. Failures are already counted by the updater and are
    /// not retried; the next tick pushes the then-current target.
    async fn push(&self, updater: &ScoreUpdater, cluster: &str, score: u32) {
        if let Err(e) = updater.update_score(cluster, score).await {
            error!(%cluster, score, error = %e, "failed to update cluster score");
        }
    }

    fn publish(&self, state: &RolloutState) {
        self.status_tx.send_replace(RolloutStatus {
            old_cluster: self.settings.old_cluster().to_string(),
            new_cluster: self.settings.new_cluster().to_string(),
            score: state.score,
            phase: state.phase,
        });
    }
}

fn request_stop(shutdown_tx: &watch::Sender<bool>) {
    if !shutdown_tx.send_replace(true) {
        info!("rollout stop requested");
    }
}

/// Cloneable handle to a running (or finished) rollout.
#[derive(Clone)]
pub struct RolloutHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
    status_rx: watch::Receiver<RolloutStatus>,
}

impl RolloutHandle {
    /// Request a stop. Safe to call any number of times.
    pub fn stop(&self) {
        request_stop(&self.shutdown_tx);
    }

    /// Latest published status.
    pub fn status(&self) -> RolloutStatus {
        self.status_rx.borrow().clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.status_rx.borrow().phase == RolloutPhase::Stopped
    }

    /// Wait until the rollout reaches `Stopped`.
    pub async fn wait_stopped(&self) {
        let mut rx = self.status_rx.clone();
        // Err only if the controller was dropped without ever running.
        let _ = rx.wait_for(|s| s.phase == RolloutPhase::Stopped).await;
    }
}
