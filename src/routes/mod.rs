//! HTTP route definitions and handlers.
//!
//! Every route is wrapped by the request metrics layer; the exposition and
//! health endpoints are usually listed under `monitor.exclusions`.

mod health_routes;
mod metrics;

use crate::filter::MetricsLayer;
use crate::state::AppState;
use axum::Router;

/// Creates the application router with all configured routes.
pub fn create_router(state: AppState) -> Router {
    let layer = MetricsLayer::new(
        state.monitor.clone(),
        state.config.monitor.filter_settings(),
    );
    Router::new()
        .merge(metrics::routes())
        .merge(health_routes::routes())
        .layer(layer)
        .with_state(state)
}
