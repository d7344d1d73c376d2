//! Health-probe analyzer.
//!
//! Each analysis performs one HTTP GET against the cluster's health
//! endpoint. A cluster is rejected once consecutive failed probes reach
//! `unhealthy_threshold`; a single failure below the threshold does not
//! stop the rollout.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use shift_rollout::{AnalysisError, AnalysisFuture, Analyzer, ConfigError, parse_duration};


/// `[analyzer]` table for `kind = "probe"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Cluster id → probe address (`host:port`).
    pub targets: HashMap<String, String>,
    /// HTTP path to probe.
    #[serde(default = "default_path")]
    pub path: String,
    /// Timeout per probe.
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Consecutive failures before the cluster is rejected.
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
}

fn default_path() -> String {
    "/healthz".to_string()
}

fn default_timeout() -> String {
    "2s".to_string()
}

fn default_unhealthy_threshold() -> u32 {
    3
}

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The health endpoint returned 2xx.
    Healthy,
    /// The health endpoint returned non-2xx.
    Unhealthy,
    /// The probe could not be executed (connection error or timeout).
    Failed,
}

/// Aggregated health of a probed cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeHealth {
    /// Not enough probes yet.
    Unknown,
    Healthy,
    Unhealthy,
}

/// Tracks consecutive probe results for one cluster.
#[derive(Debug)]
pub struct HealthTracker {
    status: ProbeHealth,
    consecutive_failures: u32,
    consecutive_successes: u32,
    /// Failures before marking unhealthy.
    unhealthy_threshold: u32,
    /// Successes needed to recover from unhealthy.
    healthy_threshold: u32,
}

impl HealthTracker {
    pub fn new(unhealthy_threshold: u32) -> Self {
        Self::with_thresholds(unhealthy_threshold, 1)
    }

    pub fn with_thresholds(unhealthy_threshold: u32, healthy_threshold: u32) -> Self {
        Self {
            status: ProbeHealth::Unknown,
            consecutive_failures: 0,
            consecutive_successes: 0,
            unhealthy_threshold: unhealthy_threshold.max(1),
            healthy_threshold: healthy_threshold.max(1),
        }
    }

    /// Record a probe result and return the new status.
    pub fn record(&mut self, result: ProbeResult) -> ProbeHealth {
        match result {
            ProbeResult::Healthy => {
                self.consecutive_failures = 0;
                self.consecutive_successes += 1;

                if self.consecutive_successes >= self.healthy_threshold {
                    if self.status != ProbeHealth::Healthy {
                        debug!(successes = self.consecutive_successes, "cluster probes healthy");
                    }
                    self.status = ProbeHealth::Healthy;
                }
            }
            ProbeResult::Unhealthy | ProbeResult::Failed => {
                self.consecutive_successes = 0;
                self.consecutive_failures += 1;

                if self.consecutive_failures >= self.unhealthy_threshold {
                    if self.status != ProbeHealth::Unhealthy {
                        warn!(
                            failures = self.consecutive_failures,
                            threshold = self.unhealthy_threshold,
                            "cluster marked unhealthy"
                        );
                    }
                    self.status = ProbeHealth::Unhealthy;
                }
            }
        }

        self.status
    }

    pub fn status(&self) -> ProbeHealth {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Unknown and healthy clusters may keep receiving traffic.
    pub fn allows_progress(&self) -> bool {
        self.status != ProbeHealth::Unhealthy
    }
}

/// Probe `http://{address}{path}` once.
///
/// `Healthy` for 2xx, `Unhealthy` for any other status, `Failed` when the
/// request could not complete in time.
pub async fn http_probe(address: &str, path: &str, timeout: Duration) -> ProbeResult {
    match shift_http::get(address, path, timeout).await {
        Ok((status, _)) if status.is_success() => ProbeResult::Healthy,
        Ok((status, _)) => {
            debug!(%status, %address, %path, "health probe non-2xx");
            ProbeResult::Unhealthy
        }
        Err(e) => {
            debug!(error = %e, %address, %path, "health probe failed");
            ProbeResult::Failed
        }
    }
}

/// Analyzer backed by HTTP health probes.
pub struct ProbeAnalyzer {
    targets: HashMap<String, String>,
    path: String,
    timeout: Duration,
    unhealthy_threshold: u32,
    trackers: Mutex<HashMap<String, HealthTracker>>,
}

impl ProbeAnalyzer {
    pub fn new(
        targets: HashMap<String, String>,
        path: &str,
        timeout: Duration,
        unhealthy_threshold: u32,
    ) -> Self {
        Self {
            targets,
            path: path.to_string(),
            timeout,
            unhealthy_threshold,
            trackers: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Result<Self, ConfigError> {
        if config.targets.is_empty() {
            return Err(ConfigError::Invalid {
                field: "analyzer.targets".to_string(),
                reason: "at least one probe target is required".to_string(),
            });
        }
        if !config.path.starts_with('/') {
            return Err(ConfigError::Invalid {
                field: "analyzer.path".to_string(),
                reason: format!("{:?} must start with '/'", config.path),
            });
        }
        if config.unhealthy_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "analyzer.unhealthy_threshold".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let timeout = parse_duration(&config.timeout)
            .filter(|d| !d.is_zero())
            .ok_or_else(|| ConfigError::InvalidDuration {
                field: "analyzer.timeout".to_string(),
                value: config.timeout.clone(),
            })?;

        Ok(Self::new(
            config.targets.clone(),
            &config.path,
            timeout,
            config.unhealthy_threshold,
        ))
    }

    /// Current tracked status for `cluster`, if it was ever probed.
    pub async fn status(&self, cluster: &str) -> Option<ProbeHealth> {
        self.trackers.lock().await.get(cluster).map(|t| t.status())
    }
}

impl Analyzer for ProbeAnalyzer {
    fn move_forward<'a>(&'a self, cluster: &'a str) -> AnalysisFuture<'a> {
        Box::pin(async move {
            let address = self
                .targets
                .get(cluster)
                .ok_or_else(|| AnalysisError::UnknownCluster(cluster.to_string()))?;

            let result = http_probe(address, &self.path, self.timeout).await;

            let mut trackers = self.trackers.lock().await;
            let tracker = trackers
                .entry(cluster.to_string())
                .or_insert_with(|| HealthTracker::new(self.unhealthy_threshold));
            let status = tracker.record(result);

            debug!(%cluster, ?result, ?status, "probe analysis");
            Ok::<bool, AnalysisError>(tracker.allows_progress())
        })
    }
}
