//! Error types of the metrics subsystem.

use http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::utils::http_helpers::HTTPError;

/// Errors raised while setting up or exporting metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// `init` was called on a `MonitorMetrics` that already went through it.
    #[error(
        "the metrics instance has already been initialized; init must be executed only once"
    )]
    AlreadyInitialized,
    /// Histogram buckets must be finite and strictly increasing.
    #[error("invalid histogram buckets {0:?}")]
    InvalidBuckets(Vec<f64>),
    /// An instrument could not be registered against the prometheus registry.
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),
    /// The text exposition could not be produced.
    #[error("failed to encode metrics: {0}")]
    Encoding(String),
    /// The dependency checker executor could not start its threads.
    #[error("failed to start dependency checker executor: {0}")]
    Executor(#[from] std::io::Error),
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        HTTPError::new(StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
