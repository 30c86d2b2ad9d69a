use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::app::AppState;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// GET /metrics: Prometheus text exposition.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.gather() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "can't encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
