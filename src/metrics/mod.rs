//! Metrics collection and exposition for Prometheus.
//!
//! This module owns the instrument set and the one-shot gate in front of it.

mod error;
mod observation;
mod recorder;

pub use error::MetricsError;
pub use observation::{DependencyEvent, DependencyLabels, RequestObservation};
pub use recorder::{MetricsInit, MonitorMetrics, DEFAULT_BUCKETS};
