//! Shared application state.

use crate::config::ConfigV1;
use crate::metrics::MonitorMetrics;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded at startup.
    pub config: Arc<ConfigV1>,
    /// The process-wide instrument set and dependency checker schedule.
    pub monitor: MonitorMetrics,
}
