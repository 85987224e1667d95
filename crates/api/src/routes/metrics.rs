use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::{routing::get, Router};

use crate::state::AppState;

/// GET /metrics -- Prometheus text exposition of all collected metrics.
async fn export_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.export_prometheus(),
    )
}

/// Mount the metrics exposition route.
pub fn router() -> Router<AppState> {
    Router::new().route("/metrics", get(export_metrics))
}
