//! HTTP action sink.
//!
//! Each score update is one `POST` with a JSON body:
//!
//! ```text
//! POST /scores HTTP/1.1
//! content-type: application/json
//!
//! {"cluster":"green","score":40}
//! ```
//!
//! Any 2xx response means the score was applied. Pushing the same score
//! twice must be harmless at the receiving end.

use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use shift_http::Endpoint;
use shift_rollout::{ActionError, ActionFuture, ConfigError, RolloutAction, parse_duration};

/// Longest error body kept in [`ActionError::Rejected`].
const MAX_ERROR_BODY: usize = 256;

/// `[action]` table for `kind = "http"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpActionConfig {
    /// Full URL to POST updates to, e.g. `http://lb-control:8080/scores`.
    pub endpoint: String,
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

fn default_timeout() -> String {
    "5s".to_string()
}

/// Request body of a score update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub cluster: String,
    pub score: u32,
}

/// Pushes scores to an HTTP control plane.
#[derive(Debug, Clone)]
pub struct HttpAction {
    endpoint: Endpoint,
    timeout: Duration,
}

impl HttpAction {
    pub fn from_config(config: &HttpActionConfig) -> Result<Self, ConfigError> {
        let endpoint = Endpoint::parse("action.endpoint", &config.endpoint)?;
        let timeout = parse_duration(&config.timeout)
            .filter(|d| !d.is_zero())
            .ok_or_else(|| ConfigError::InvalidDuration {
                field: "action.timeout".to_string(),
                value: config.timeout.clone(),
            })?;

        Ok(Self { endpoint, timeout })
    }
}

/// Error body as a short single message.
fn error_message(body: &[u8]) -> String {
    let mut message = String::from_utf8_lossy(body).trim().to_string();
    if message.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    message
}

impl RolloutAction for HttpAction {
    fn update_score<'a>(&'a self, cluster: &'a str, score: u32) -> ActionFuture<'a> {
        Box::pin(async move {
            let update = ScoreUpdate {
                cluster: cluster.to_string(),
                score,
            };
            let body = serde_json::to_vec(&update)
                .map_err(|e| ActionError::Other(format!("encode update: {e}")))?;

            let target = self.endpoint.target();
            let (status, body) = shift_http::post_json(
                &self.endpoint.authority,
                &target,
                Bytes::from(body),
                self.timeout,
            )
            .await?;

            if !status.is_success() {
                return Err(ActionError::Rejected {
                    status: status.as_u16(),
                    message: error_message(&body),
                });
            }
            debug!(%cluster, score, endpoint = %target, "score pushed");
            Ok::<(), ActionError>(())
        })
    }
}
