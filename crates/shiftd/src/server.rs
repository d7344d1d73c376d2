//! Operator HTTP surface: metrics scrape, rollout status and stop.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};

use shift_rollout::{RolloutHandle, RolloutMetrics, RolloutStatus};

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<RolloutMetrics>,
    pub rollout: RolloutHandle,
}

/// Response wrapper for the JSON endpoints.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    data: T,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .route("/stop", post(stop))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// GET /metrics
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.render_prometheus().await;
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// GET /status
async fn status(State(state): State<AppState>) -> Json<ApiResponse<RolloutStatus>> {
    ApiResponse::ok(state.rollout.status())
}

/// POST /stop
///
/// Accepted rather than OK: the driver finishes its current step first.
async fn stop(State(state): State<AppState>) -> impl IntoResponse {
    state.rollout.stop();
    (StatusCode::ACCEPTED, ApiResponse::ok(state.rollout.status()))
}

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}
