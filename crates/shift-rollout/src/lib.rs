//! shift-rollout: progressive traffic shifting between two clusters.
//!
//! A rollout moves traffic weight from an old cluster to a new one in
//! fixed steps, while an independent monitor keeps asking an analyzer
//! whether the new cluster is behaving. A negative verdict (or a failed
//! analysis) reverts all traffic to the old cluster immediately.
//!
//! # Architecture
//!
//! ```text
//! RolloutController::start()
//!   ├── AnalysisMonitor task ── Analyzer::move_forward() ──┐
//!   │                                                      │ abort signal
//!   ├── driver loop  ◄─────────────────────────────────────┘
//!   │     ├── tick   → ScoreUpdater (new, old)
//!   │     ├── abort  → ScoreUpdater (old=100, new=0) → Stopped
//!   │     └── stop   → Stopped
//!   └── RolloutMetrics ← every update attempt
//! ```
//!
//! The actual enforcement of weights and the health analysis are
//! delegated to [`RolloutAction`] and [`Analyzer`] implementations.

pub mod action;
pub mod analyzer;
pub mod config;
pub mod controller;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod signal;
pub mod updater;

pub use action::{ActionFuture, RolloutAction};
pub use analyzer::{AnalysisFuture, Analyzer};
pub use config::{MAX_INTERVAL, RolloutConfig, RolloutSettings, parse_duration};
pub use controller::{RolloutController, RolloutHandle, RolloutOutcome, RolloutPhase, RolloutStatus};
pub use error::{ActionError, AnalysisError, ConfigError, RolloutError, RolloutResult};
pub use metrics::RolloutMetrics;
pub use monitor::AnalysisMonitor;
pub use signal::{AbortReason, AbortReceiver, AbortSender, abort_signal};
pub use updater::ScoreUpdater;

/// Upper bound of a cluster score (percentage of traffic).
pub const MAX_SCORE: u32 = 100;
