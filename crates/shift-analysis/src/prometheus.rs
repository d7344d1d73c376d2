//! Prometheus analyzer: compares an instant query against a threshold.
//!
//! The query template may reference the cluster as `{cluster}`, e.g.
//!
//! ```text
//! sum(rate(http_requests_total{cluster="{cluster}",code=~"5.."}[5m]))
//!   / sum(rate(http_requests_total{cluster="{cluster}"}[5m]))
//! ```
//!
//! The rollout may continue while every returned sample is at or below
//! the threshold. An empty result means nothing bad was observed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use shift_http::Endpoint;
use shift_rollout::{AnalysisError, AnalysisFuture, Analyzer, ConfigError, parse_duration};

/// `[analyzer]` table for `kind = "prometheus"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Base URL of the Prometheus server, e.g. `http://prometheus:9090`.
    pub url: String,
    /// PromQL instant query; `{cluster}` is replaced by the cluster id.
    pub query: String,
    /// Highest acceptable sample value.
    pub threshold: f64,
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

fn default_timeout() -> String {
    "5s".to_string()
}

/// Analyzer backed by a Prometheus instant query.
pub struct PrometheusAnalyzer {
    base: Endpoint,
    query: String,
    threshold: f64,
    timeout: Duration,
}

impl PrometheusAnalyzer {
    pub fn from_config(config: &PrometheusConfig) -> Result<Self, ConfigError> {
        let base = Endpoint::parse("analyzer.url", &config.url)?;
        if config.query.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "analyzer.query".to_string(),
                reason: "query must not be empty".to_string(),
            });
        }
        if !config.threshold.is_finite() {
            return Err(ConfigError::Invalid {
                field: "analyzer.threshold".to_string(),
                reason: "threshold must be a finite number".to_string(),
            });
        }
        let timeout = parse_duration(&config.timeout)
            .filter(|d| !d.is_zero())
            .ok_or_else(|| ConfigError::InvalidDuration {
                field: "analyzer.timeout".to_string(),
                value: config.timeout.clone(),
            })?;

        Ok(Self {
            base,
            query: config.query.clone(),
            threshold: config.threshold,
            timeout,
        })
    }

    /// Origin-form request target for `cluster`.
    fn query_path(&self, cluster: &str) -> String {
        let query = self.query.replace("{cluster}", cluster);
        format!(
            "{}/api/v1/query?query={}",
            self.base.prefix(),
            urlencoding::encode(&query)
        )
    }
}

impl Analyzer for PrometheusAnalyzer {
    fn move_forward<'a>(&'a self, cluster: &'a str) -> AnalysisFuture<'a> {
        Box::pin(async move {
            let path = self.query_path(cluster);
            let (status, body) = shift_http::get(&self.base.authority, &path, self.timeout).await?;
            if !status.is_success() {
                return Err(AnalysisError::Status(status.as_u16()));
            }
            let verdict = evaluate(&body, self.threshold)?;
            debug!(%cluster, verdict, threshold = self.threshold, "prometheus analysis");
            Ok::<bool, AnalysisError>(verdict)
        })
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    result_type: String,
    result: serde_json::Value,
}

#[derive(Deserialize)]
struct VectorSample {
    value: (f64, String),
}

/// Decide from a `/api/v1/query` response body whether to continue.
///
/// Vector and scalar results are supported. `NaN` samples (e.g. a ratio
/// with no traffic) are ignored.
pub fn evaluate(body: &[u8], threshold: f64) -> Result<bool, AnalysisError> {
    let resp: QueryResponse =
        serde_json::from_slice(body).map_err(|e| AnalysisError::Malformed(e.to_string()))?;

    if resp.status != "success" {
        return Err(AnalysisError::Malformed(
            resp.error.unwrap_or_else(|| format!("query status {:?}", resp.status)),
        ));
    }
    let data = resp
        .data
        .ok_or_else(|| AnalysisError::Malformed("missing data".to_string()))?;

    let raw_values: Vec<String> = match data.result_type.as_str() {
        "vector" => serde_json::from_value::<Vec<VectorSample>>(data.result)
            .map_err(|e| AnalysisError::Malformed(e.to_string()))?
            .into_iter()
            .map(|s| s.value.1)
            .collect(),
        "scalar" => {
            let (_, v): (f64, String) = serde_json::from_value(data.result)
                .map_err(|e| AnalysisError::Malformed(e.to_string()))?;
            vec![v]
        }
        other => {
            return Err(AnalysisError::Malformed(format!(
                "unsupported result type {other:?}"
            )));
        }
    };

    let mut worst: Option<f64> = None;
    for raw in raw_values {
        let value: f64 = raw
            .parse()
            .map_err(|_| AnalysisError::Malformed(format!("sample value {raw:?}")))?;
        if value.is_nan() {
            continue;
        }
        worst = Some(worst.map_or(value, |w: f64| w.max(value)));
    }

    Ok(match worst {
        Some(value) => value <= threshold,
        None => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shift_http::testing::one_shot_server;

    fn vector(values: &[&str]) -> String {
        let samples: Vec<String> = values
            .iter()
            .map(|v| format!(r#"{{"metric":{{}},"value":[1700000000.123,"{v}"]}}"#))
            .collect();
        format!(
            r#"{{"status":"success","data":{{"resultType":"vector","result":[{}]}}}}"#,
            samples.join(",")
        )
    }

    fn config(url: &str) -> PrometheusConfig {
        PrometheusConfig {
            url: url.to_string(),
            query: r#"sum(rate(errors_total{cluster="{cluster}"}[5m]))"#.to_string(),
            threshold: 0.05,
            timeout: "2s".to_string(),
        }
    }

    #[test]
    fn below_threshold_continues() {
        assert!(evaluate(vector(&["0.01"]).as_bytes(), 0.05).unwrap());
        assert!(evaluate(vector(&["0.05"]).as_bytes(), 0.05).unwrap());
    }

    #[test]
    fn any_sample_above_threshold_stops() {
        assert!(!evaluate(vector(&["0.01", "0.2"]).as_bytes(), 0.05).unwrap());
    }

    #[test]
    fn empty_result_continues() {
        assert!(evaluate(vector(&[]).as_bytes(), 0.05).unwrap());
        assert!(evaluate(vector(&["NaN"]).as_bytes(), 0.05).unwrap());
    }

    #[test]
    fn scalar_result() {
        let body = r#"{"status":"success","data":{"resultType":"scalar","result":[1700000000,"3"]}}"#;
        assert!(!evaluate(body.as_bytes(), 1.0).unwrap());
    }

    #[test]
    fn error_responses_are_malformed() {
        let body = r#"{"status":"error","errorType":"bad_data","error":"parse error at char 4"}"#;
        let err = evaluate(body.as_bytes(), 1.0).unwrap_err();
        assert_eq!(err, AnalysisError::Malformed("parse error at char 4".into()));

        assert!(evaluate(b"<html>", 1.0).is_err());

        let matrix = r#"{"status":"success","data":{"resultType":"matrix","result":[]}}"#;
        assert!(evaluate(matrix.as_bytes(), 1.0).is_err());
    }

    #[test]
    fn query_is_templated_and_encoded() {
        let analyzer = PrometheusAnalyzer::from_config(&config("http://prom:9090/prefix/")).unwrap();
        let path = analyzer.query_path("green");
        assert_eq!(
            path,
            "/prefix/api/v1/query?query=sum%28rate%28errors_total%7Bcluster%3D%22green%22%7D%5B5m%5D%29%29"
        );

        let mut cfg = config("http://prom:9090");
        cfg.query = "up{job=\"{cluster}\"} > 0.5 & ü".to_string();
        let analyzer = PrometheusAnalyzer::from_config(&cfg).unwrap();
        assert_eq!(
            analyzer.query_path("a b"),
            "/api/v1/query?query=up%7Bjob%3D%22a%20b%22%7D%20%3E%200.5%20%26%20%C3%BC"
        );
    }

    #[test]
    fn config_rejects_bad_values() {
        let mut cfg = config("ftp://prom");
        assert!(matches!(
            PrometheusAnalyzer::from_config(&cfg),
            Err(ConfigError::InvalidUrl { .. })
        ));

        cfg.url = "http://prom:9090".into();
        cfg.threshold = f64::NAN;
        assert!(PrometheusAnalyzer::from_config(&cfg).is_err());

        cfg.threshold = 0.1;
        cfg.query = "  ".into();
        assert!(PrometheusAnalyzer::from_config(&cfg).is_err());
    }

    #[tokio::test]
    async fn queries_server_and_judges_result() {
        let (addr, request) = one_shot_server("200 OK", vector(&["0.5"])).await;
        let analyzer = PrometheusAnalyzer::from_config(&config(&format!("http://{addr}"))).unwrap();

        assert!(!analyzer.move_forward("green").await.unwrap());
        let raw = request.await.unwrap();
        assert!(raw.starts_with("GET /api/v1/query?query=sum%28rate"));
        assert!(raw.contains("%22green%22"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (addr, _request) = one_shot_server("503 Service Unavailable", String::new()).await;
        let analyzer = PrometheusAnalyzer::from_config(&config(&format!("http://{addr}"))).unwrap();

        let err = analyzer.move_forward("green").await.unwrap_err();
        assert_eq!(err, AnalysisError::Status(503));
    }
}
