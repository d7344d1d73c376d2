//! shift-analysis: analyzers that gate a rollout.
//!
//! Both implement [`shift_rollout::Analyzer`]:
//!
//! - **`probe`**: HTTP health probes against the new cluster, with a
//!   consecutive-failure threshold before the cluster is rejected.
//! - **`prometheus`**: an instant query (e.g. an error rate) compared
//!   against a threshold.
//!
//! ```text
//! AnalysisMonitor ── move_forward(cluster)
//!   ├── ProbeAnalyzer      → http_probe() → HealthTracker → verdict
//!   └── PrometheusAnalyzer → GET /api/v1/query → evaluate() → verdict
//! ```

pub mod probe;
pub mod prometheus;

pub use probe::{HealthTracker, ProbeAnalyzer, ProbeConfig, ProbeHealth, ProbeResult};
pub use prometheus::{PrometheusAnalyzer, PrometheusConfig};
