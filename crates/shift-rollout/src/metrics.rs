//! Rollout metrics: per-cluster score update counters and score gauge.
//!
//! Counters are atomics behind a shared map, like the rest of the
//! collectors in this workspace. Rendering produces the Prometheus text
//! exposition format for a `/metrics` endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Counters for a single cluster.
struct ClusterMetrics {
    /// Successful `update_score` calls.
    updates_total: AtomicU64,
    /// Failed calls, keyed by failure cause.
    failures: Mutex<BTreeMap<String, u64>>,
    /// Last successfully applied score.
    score: AtomicU32,
    /// Whether `score` has ever been set.
    score_set: AtomicBool,
}

impl ClusterMetrics {
    fn new() -> Self {
        Self {
            updates_total: AtomicU64::new(0),
            failures: Mutex::new(BTreeMap::new()),
            score: AtomicU32::new(0),
            score_set: AtomicBool::new(false),
        }
    }
}

/// Registry of `score_updates_total`, `score_update_failures_total` and
/// `cluster_score`.
#[derive(Default)]
pub struct RolloutMetrics {
    clusters: RwLock<BTreeMap<String, Arc<ClusterMetrics>>>,
}

impl RolloutMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    async fn cluster(&self, cluster: &str) -> Arc<ClusterMetrics> {
        if let Some(m) = self.clusters.read().await.get(cluster) {
            return m.clone();
        }
        let mut clusters = self.clusters.write().await;
        clusters
            .entry(cluster.to_string())
            .or_insert_with(|| Arc::new(ClusterMetrics::new()))
            .clone()
    }

    /// Count a successful update and set the gauge to `score`.
    pub async fn record_success(&self, cluster: &str, score: u32) {
        let m = self.cluster(cluster).await;
        m.updates_total.fetch_add(1, Ordering::Relaxed);
        m.score.store(score, Ordering::Relaxed);
        m.score_set.store(true, Ordering::Release);
    }

    /// Count a failed update. The gauge is left untouched.
    pub async fn record_failure(&self, cluster: &str, cause: &str) {
        let m = self.cluster(cluster).await;
        *m.failures.lock().await.entry(cause.to_string()).or_insert(0) += 1;
        debug!(%cluster, %cause, "score update failure recorded");
    }

    pub async fn updates_total(&self, cluster: &str) -> u64 {
        match self.clusters.read().await.get(cluster) {
            Some(m) => m.updates_total.load(Ordering::Relaxed),
            None => 0,
        }
    }

    pub async fn failures_total(&self, cluster: &str, cause: &str) -> u64 {
        let m = match self.clusters.read().await.get(cluster) {
            Some(m) => m.clone(),
            None => return 0,
        };
        let failures = m.failures.lock().await;
        failures.get(cause).copied().unwrap_or(0)
    }

    /// Last score applied to `cluster`, if any update ever succeeded.
    pub async fn cluster_score(&self, cluster: &str) -> Option<u32> {
        let clusters = self.clusters.read().await;
        let m = clusters.get(cluster)?;
        if m.score_set.load(Ordering::Acquire) {
            Some(m.score.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    /// Render all families in the Prometheus text exposition format.
    pub async fn render_prometheus(&self) -> String {
        let clusters = self.clusters.read().await;
        let mut out = String::new();

        out.push_str("# HELP score_updates_total Successful cluster score updates.\n");
        out.push_str("# TYPE score_updates_total counter\n");
        for (cluster, m) in clusters.iter() {
            out.push_str(&format!(
                "score_updates_total{{cluster=\"{}\"}} {}\n",
                escape_label(cluster),
                m.updates_total.load(Ordering::Relaxed)
            ));
        }

        out.push_str("# HELP score_update_failures_total Failed cluster score updates by cause.\n");
        out.push_str("# TYPE score_update_failures_total counter\n");
        for (cluster, m) in clusters.iter() {
            let failures = m.failures.lock().await;
            for (cause, count) in failures.iter() {
                out.push_str(&format!(
                    "score_update_failures_total{{cluster=\"{}\",cause=\"{}\"}} {}\n",
                    escape_label(cluster),
                    escape_label(cause),
                    count
                ));
            }
        }

        out.push_str("# HELP cluster_score Last score applied to a cluster (0-100).\n");
        out.push_str("# TYPE cluster_score gauge\n");
        for (cluster, m) in clusters.iter() {
            if m.score_set.load(Ordering::Acquire) {
                out.push_str(&format!(
                    "cluster_score{{cluster=\"{}\"}} {}\n",
                    escape_label(cluster),
                    m.score.load(Ordering::Relaxed)
                ));
            }
        }

        out
    }
}

/// Escape a label value: backslash, double quote and newline.
fn escape_label(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn success_increments_counter_and_sets_gauge() {
        let metrics = RolloutMetrics::new();
        metrics.record_success("green", 30).await;
        metrics.record_success("green", 60).await;

        assert_eq!(metrics.updates_total("green").await, 2);
        assert_eq!(metrics.cluster_score("green").await, Some(60));
    }

    #[tokio::test]
    async fn failure_leaves_gauge_unchanged() {
        let metrics = RolloutMetrics::new();
        metrics.record_success("blue", 70).await;
        metrics.record_failure("blue", "transport").await;
        metrics.record_failure("blue", "transport").await;
        metrics.record_failure("blue", "rejected").await;

        assert_eq!(metrics.updates_total("blue").await, 1);
        assert_eq!(metrics.cluster_score("blue").await, Some(70));
        assert_eq!(metrics.failures_total("blue", "transport").await, 2);
        assert_eq!(metrics.failures_total("blue", "rejected").await, 1);
        assert_eq!(metrics.failures_total("blue", "timeout").await, 0);
    }

    #[tokio::test]
    async fn unknown_cluster_reads_as_zero() {
        let metrics = RolloutMetrics::new();
        assert_eq!(metrics.updates_total("nope").await, 0);
        assert_eq!(metrics.failures_total("nope", "transport").await, 0);
        assert_eq!(metrics.cluster_score("nope").await, None);
    }

    #[tokio::test]
    async fn failure_only_cluster_has_no_gauge() {
        let metrics = RolloutMetrics::new();
        metrics.record_failure("blue", "timeout").await;
        assert_eq!(metrics.cluster_score("blue").await, None);

        let output = metrics.render_prometheus().await;
        assert!(output.contains("score_update_failures_total{cluster=\"blue\",cause=\"timeout\"} 1"));
        assert!(output.contains("score_updates_total{cluster=\"blue\"} 0"));
        assert!(!output.contains("cluster_score{cluster=\"blue\"}"));
    }

    #[tokio::test]
    async fn render_contains_all_families() {
        let metrics = RolloutMetrics::new();
        metrics.record_success("blue", 50).await;
        metrics.record_success("green", 50).await;

        let output = metrics.render_prometheus().await;
        assert!(output.contains("# TYPE score_updates_total counter"));
        assert!(output.contains("# TYPE score_update_failures_total counter"));
        assert!(output.contains("# TYPE cluster_score gauge"));
        assert!(output.contains("score_updates_total{cluster=\"blue\"} 1"));
        assert!(output.contains("cluster_score{cluster=\"green\"} 50"));

        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            assert!(
                line.contains('{') && line.contains('}'),
                "line should have labels: {line}"
            );
        }
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(escape_label(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_label("x\ny"), "x\\ny");
    }
}
