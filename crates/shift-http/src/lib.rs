//! shift-http: minimal HTTP/1 client shared by analyzers and action sinks.
//!
//! One connection per request, plain HTTP only. The timeout covers
//! connect, request and the whole response body.

use std::time::Duration;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tracing::debug;

use shift_rollout::{ActionError, AnalysisError, ConfigError};

#[cfg(any(test, feature = "testing"))]
pub mod testing;

const USER_AGENT: &str = concat!("shiftgrid/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error("{0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<ClientError> for AnalysisError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Transport(msg) => AnalysisError::Transport(msg),
            ClientError::Timeout(limit) => AnalysisError::Timeout(limit),
        }
    }
}

impl From<ClientError> for ActionError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Transport(msg) => ActionError::Transport(msg),
            ClientError::Timeout(limit) => ActionError::Timeout(limit),
        }
    }
}

/// A configured `http://host[:port][/path][?query]` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `host:port`, used both to connect and as the Host header.
    pub authority: String,
    pub path: String,
    pub query: Option<String>,
}

impl Endpoint {
    /// Parse `url`, reporting failures against config key `field`.
    pub fn parse(field: &str, url: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidUrl {
            field: field.to_string(),
            value: url.to_string(),
        };

        let uri: http::Uri = url.trim().parse().map_err(|_| invalid())?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid());
        }
        let authority = uri.authority().ok_or_else(invalid)?;
        let path = match uri.path() {
            "" => "/",
            p => p,
        };

        Ok(Self {
            authority: format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80)),
            path: path.to_string(),
            query: uri.query().map(str::to_string),
        })
    }

    /// Path without a trailing slash, for appending API routes.
    pub fn prefix(&self) -> &str {
        self.path.trim_end_matches('/')
    }

    /// Origin-form request target.
    pub fn target(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        }
    }
}

/// GET `target` and collect the body.
pub async fn get(
    authority: &str,
    target: &str,
    timeout: Duration,
) -> Result<(StatusCode, Bytes), ClientError> {
    send(Method::GET, authority, target, None, timeout).await
}

/// POST a JSON body to `target` and collect the response body.
pub async fn post_json(
    authority: &str,
    target: &str,
    body: Bytes,
    timeout: Duration,
) -> Result<(StatusCode, Bytes), ClientError> {
    send(Method::POST, authority, target, Some(body), timeout).await
}

async fn send(
    method: Method,
    authority: &str,
    target: &str,
    body: Option<Bytes>,
    timeout: Duration,
) -> Result<(StatusCode, Bytes), ClientError> {
    let exchange = async {
        let stream = tokio::net::TcpStream::connect(authority)
            .await
            .map_err(|e| ClientError::Transport(format!("connect {authority}: {e}")))?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ClientError::Transport(format!("handshake {authority}: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut req = http::Request::builder()
            .method(method)
            .uri(target)
            .header("host", authority)
            .header("user-agent", USER_AGENT);
        if body.is_some() {
            req = req.header("content-type", "application/json");
        }
        let req = req
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| ClientError::Transport(format!("build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ClientError::Transport(format!("request {authority}{target}: {e}")))?;

        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ClientError::Transport(format!("read body: {e}")))?
            .to_bytes();

        Ok::<_, ClientError>((status, body))
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result,
        Err(_) => {
            debug!(%authority, %target, "request timed out");
            Err(ClientError::Timeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::one_shot_server;

    #[test]
    fn endpoint_defaults_port_and_keeps_query() {
        let ep = Endpoint::parse("url", "http://prometheus/").unwrap();
        assert_eq!(ep.authority, "prometheus:80");
        assert_eq!(ep.prefix(), "");

        let ep = Endpoint::parse("url", "http://10.0.0.5:9090/prom/").unwrap();
        assert_eq!(ep.authority, "10.0.0.5:9090");
        assert_eq!(ep.prefix(), "/prom");

        let ep = Endpoint::parse("url", "http://lb:8080/v1/scores?dc=eu").unwrap();
        assert_eq!(ep.target(), "/v1/scores?dc=eu");

        let ep = Endpoint::parse("url", "http://lb:8080").unwrap();
        assert_eq!(ep.target(), "/");
    }

    #[test]
    fn endpoint_rejects_https_and_garbage() {
        for url in ["https://prometheus:9090", "not a url", "/just/a/path", "lb:8080", ""] {
            assert!(
                matches!(Endpoint::parse("url", url), Err(ConfigError::InvalidUrl { .. })),
                "{url:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn get_reads_status_and_body() {
        let (addr, request) = one_shot_server("200 OK", "{\"ok\":true}".to_string()).await;

        let (status, body) = get(&addr, "/check?x=1", Duration::from_secs(2)).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"{\"ok\":true}");

        let raw = request.await.unwrap();
        assert!(raw.starts_with("GET /check?x=1 HTTP/1.1"));
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let (addr, request) = one_shot_server("409 Conflict", "locked".to_string()).await;

        let (status, body) = post_json(
            &addr,
            "/scores",
            Bytes::from_static(br#"{"score":1}"#),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(&body[..], b"locked");

        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /scores HTTP/1.1"));
        assert!(raw.to_ascii_lowercase().contains("content-type: application/json"));
        assert!(raw.ends_with(r#"{"score":1}"#));
    }

    #[tokio::test]
    async fn closed_port_is_transport_error() {
        let err = get("127.0.0.1:1", "/", Duration::from_millis(500)).await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_) | ClientError::Timeout(_)));
    }

    #[test]
    fn errors_convert_to_collaborator_errors() {
        let limit = Duration::from_secs(1);
        assert_eq!(
            AnalysisError::from(ClientError::Timeout(limit)),
            AnalysisError::Timeout(limit)
        );
        assert_eq!(
            ActionError::from(ClientError::Transport("refused".into())),
            ActionError::Transport("refused".into())
        );
    }
}
