//! Metrics exposition endpoint.

use crate::metrics::MetricsError;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};

/// Creates the metrics route.
pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics_handler).post(metrics_handler))
}

/// Handler for the /metrics endpoint.
///
/// Returns all collected metrics in Prometheus text format. POST is answered
/// the same way for scrapers configured to use it.
async fn metrics_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, MetricsError> {
    let metrics_text = state.monitor.render()?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        metrics_text,
    ))
}
