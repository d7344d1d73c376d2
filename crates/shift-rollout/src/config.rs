//! Rollout configuration: the `[rollout]` table and its validated form.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::MAX_SCORE;
use crate::error::{ConfigError, RolloutError, RolloutResult};

/// Longest accepted interval or timeout.
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 3600);

/// Rollout parameters as written in a config file.
///
/// Durations are human strings (`"30s"`, `"500ms"`, `"2m"`, `"1h"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutConfig {
    pub old_cluster: String,
    pub new_cluster: String,
    /// Score added to the new cluster on every tick.
    #[serde(default = "default_step")]
    pub step: u32,
    /// Time between progress ticks.
    #[serde(default = "default_rollout_interval")]
    pub rollout_interval: String,
    /// Time between analyzer polls.
    #[serde(default = "default_analysis_interval")]
    pub analysis_interval: String,
    /// Upper bound for a single analyzer call. Unbounded when absent.
    #[serde(default)]
    pub analysis_timeout: Option<String>,
}

fn default_step() -> u32 {
    10
}

fn default_rollout_interval() -> String {
    "60s".to_string()
}

fn default_analysis_interval() -> String {
    "15s".to_string()
}

impl RolloutConfig {
    /// Parse durations and check every invariant.
    pub fn validate(&self) -> RolloutResult<RolloutSettings> {
        let rollout_interval = duration_field("rollout_interval", &self.rollout_interval)?;
        let analysis_interval = duration_field("analysis_interval", &self.analysis_interval)?;

        let mut settings = RolloutSettings::new(
            &self.old_cluster,
            &self.new_cluster,
            rollout_interval,
            analysis_interval,
            self.step,
        )?;

        if let Some(raw) = &self.analysis_timeout {
            settings = settings.with_analysis_timeout(duration_field("analysis_timeout", raw)?)?;
        }

        Ok(settings)
    }
}

fn duration_field(field: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Validated, immutable rollout parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutSettings {
    old_cluster: String,
    new_cluster: String,
    step: u32,
    rollout_interval: Duration,
    analysis_interval: Duration,
    analysis_timeout: Option<Duration>,
}

impl RolloutSettings {
    pub fn new(
        old_cluster: &str,
        new_cluster: &str,
        rollout_interval: Duration,
        analysis_interval: Duration,
        step: u32,
    ) -> RolloutResult<Self> {
        let old_cluster = old_cluster.trim();
        let new_cluster = new_cluster.trim();

        if old_cluster.is_empty() {
            return Err(RolloutError::EmptyClusterId("old"));
        }
        if new_cluster.is_empty() {
            return Err(RolloutError::EmptyClusterId("new"));
        }
        if old_cluster == new_cluster {
            return Err(RolloutError::SameCluster(old_cluster.to_string()));
        }
        if step == 0 || step > MAX_SCORE {
            return Err(RolloutError::InvalidStep(step));
        }
        if rollout_interval.is_zero() {
            return Err(RolloutError::ZeroInterval("rollout_interval"));
        }
        if analysis_interval.is_zero() {
            return Err(RolloutError::ZeroInterval("analysis_interval"));
        }
        if rollout_interval > MAX_INTERVAL {
            return Err(RolloutError::IntervalTooLong("rollout_interval"));
        }
        if analysis_interval > MAX_INTERVAL {
            return Err(RolloutError::IntervalTooLong("analysis_interval"));
        }

        Ok(Self {
            old_cluster: old_cluster.to_string(),
            new_cluster: new_cluster.to_string(),
            step,
            rollout_interval,
            analysis_interval,
            analysis_timeout: None,
        })
    }

    /// Bound each analyzer call. A call exceeding it counts as a failed
    /// analysis.
    pub fn with_analysis_timeout(mut self, timeout: Duration) -> RolloutResult<Self> {
        if timeout.is_zero() {
            return Err(RolloutError::ZeroInterval("analysis_timeout"));
        }
        if timeout > MAX_INTERVAL {
            return Err(RolloutError::IntervalTooLong("analysis_timeout"));
        }
        self.analysis_timeout = Some(timeout);
        Ok(self)
    }

    pub fn old_cluster(&self) -> &str {
        &self.old_cluster
    }

    pub fn new_cluster(&self) -> &str {
        &self.new_cluster
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn rollout_interval(&self) -> Duration {
        self.rollout_interval
    }

    pub fn analysis_interval(&self) -> Duration {
        self.analysis_interval
    }

    pub fn analysis_timeout(&self) -> Option<Duration> {
        self.analysis_timeout
    }
}

/// Parse a duration string like "5s", "500ms", "2m", "1h".
///
/// A plain number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.trim().parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.trim().parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .trim()
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(step: u32) -> RolloutResult<RolloutSettings> {
        RolloutSettings::new(
            "blue",
            "green",
            Duration::from_secs(30),
            Duration::from_secs(10),
            step,
        )
    }

    #[test]
    fn accepts_valid_parameters() {
        let s = settings(25).unwrap();
        assert_eq!(s.old_cluster(), "blue");
        assert_eq!(s.new_cluster(), "green");
        assert_eq!(s.step(), 25);
        assert_eq!(s.analysis_timeout(), None);
    }

    #[test]
    fn rejects_zero_step() {
        assert!(matches!(settings(0), Err(RolloutError::InvalidStep(0))));
    }

    #[test]
    fn rejects_step_above_hundred() {
        assert!(matches!(settings(101), Err(RolloutError::InvalidStep(101))));
        assert!(settings(100).is_ok());
    }

    #[test]
    fn rejects_empty_and_identical_clusters() {
        let err = RolloutSettings::new("", "green", Duration::from_secs(1), Duration::from_secs(1), 10);
        assert!(matches!(err, Err(RolloutError::EmptyClusterId("old"))));

        let err = RolloutSettings::new("blue", "  ", Duration::from_secs(1), Duration::from_secs(1), 10);
        assert!(matches!(err, Err(RolloutError::EmptyClusterId("new"))));

        let err = RolloutSettings::new("blue", "blue", Duration::from_secs(1), Duration::from_secs(1), 10);
        assert!(matches!(err, Err(RolloutError::SameCluster(c)) if c == "blue"));
    }

    #[test]
    fn rejects_zero_intervals() {
        let err = RolloutSettings::new("blue", "green", Duration::ZERO, Duration::from_secs(1), 10);
        assert!(matches!(err, Err(RolloutError::ZeroInterval("rollout_interval"))));

        let err = RolloutSettings::new("blue", "green", Duration::from_secs(1), Duration::ZERO, 10);
        assert!(matches!(err, Err(RolloutError::ZeroInterval("analysis_interval"))));

        let err = settings(10).unwrap().with_analysis_timeout(Duration::ZERO);
        assert!(matches!(err, Err(RolloutError::ZeroInterval("analysis_timeout"))));
    }

    #[test]
    fn config_from_toml_applies_defaults() {
        let cfg: RolloutConfig = toml::from_str(
            r#"
old_cluster = "blue"
new_cluster = "green"
"#,
        )
        .unwrap();
        let s = cfg.validate().unwrap();
        assert_eq!(s.step(), 10);
        assert_eq!(s.rollout_interval(), Duration::from_secs(60));
        assert_eq!(s.analysis_interval(), Duration::from_secs(15));
    }

    #[test]
    fn config_parses_timeout() {
        let cfg: RolloutConfig = toml::from_str(
            r#"
old_cluster = "blue"
new_cluster = "green"
step = 20
rollout_interval = "2m"
analysis_interval = "500ms"
analysis_timeout = "5s"
"#,
        )
        .unwrap();
        let s = cfg.validate().unwrap();
        assert_eq!(s.step(), 20);
        assert_eq!(s.rollout_interval(), Duration::from_secs(120));
        assert_eq!(s.analysis_interval(), Duration::from_millis(500));
        assert_eq!(s.analysis_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn config_rejects_malformed_duration() {
        let cfg = RolloutConfig {
            old_cluster: "blue".into(),
            new_cluster: "green".into(),
            step: 10,
            rollout_interval: "soon".into(),
            analysis_interval: "10s".into(),
            analysis_timeout: None,
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(
            err,
            RolloutError::Config(ConfigError::InvalidDuration { ref field, .. }) if field == "rollout_interval"
        ));
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("fast"), None);
        assert_eq!(parse_duration("-5s"), None);
        assert_eq!(parse_duration("307445734561825861m"), None);
        assert_eq!(parse_duration("5124095576030432h"), None);
    }

    #[test]
    fn rejects_intervals_beyond_a_year() {
        let huge = Duration::from_secs(u64::MAX);
        let err = RolloutSettings::new("blue", "green", huge, Duration::from_secs(1), 10);
        assert!(matches!(err, Err(RolloutError::IntervalTooLong("rollout_interval"))));

        let err = RolloutSettings::new("blue", "green", Duration::from_secs(1), huge, 10);
        assert!(matches!(err, Err(RolloutError::IntervalTooLong("analysis_interval"))));

        let err = settings(10).unwrap().with_analysis_timeout(huge);
        assert!(matches!(err, Err(RolloutError::IntervalTooLong("analysis_timeout"))));

        assert!(RolloutSettings::new("blue", "green", MAX_INTERVAL, MAX_INTERVAL, 10).is_ok());
    }

    #[test]
    fn config_rejects_oversized_interval() {
        let cfg = RolloutConfig {
            old_cluster: "blue".into(),
            new_cluster: "green".into(),
            step: 10,
            rollout_interval: "18446744073709551615s".into(),
            analysis_interval: "10s".into(),
            analysis_timeout: None,
        };
        assert!(matches!(
            cfg.validate(),
            Err(RolloutError::IntervalTooLong("rollout_interval"))
        ));
    }
}
