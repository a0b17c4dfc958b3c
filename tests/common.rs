#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::routing::get;
use axum::{Extension, Router};
use http_body_util::BodyExt;
use monitor_metrics::config::{ConfigV1, LoggingConfig, MonitorConfig};
use monitor_metrics::dependency::{create_executor, ExecutorKind};
use monitor_metrics::filter::{FilterSettings, MetricsLayer, RequestAttributes};
use monitor_metrics::metrics::{MetricsInit, MonitorMetrics};

/// 37 bytes.
pub const USER_BODY: &str = "{\"id\":42,\"name\":\"Ada Lovelace\",\"x\":1}";

/// Attribute the failing handler stores its message under.
pub const ERROR_ATTRIBUTE: &str = "error-info";

pub fn monitor(start_delay: Duration) -> MonitorMetrics {
    let executor = create_executor(ExecutorKind::Timer, 1, start_delay).unwrap();
    MonitorMetrics::new(executor)
}

pub fn initialized_monitor() -> MonitorMetrics {
    let monitor = monitor(Duration::from_secs(10));
    monitor
        .init(MetricsInit {
            collect_runtime_metrics: false,
            application_version: "1.2.3".to_string(),
            ..MetricsInit::default()
        })
        .unwrap();
    monitor
}

async fn get_user() -> &'static str {
    USER_BODY
}

async fn failing(
    Extension(attributes): Extension<RequestAttributes>,
) -> (StatusCode, &'static str) {
    attributes.set(ERROR_ATTRIBUTE, "Upstream <timeout> after 30s!");
    (StatusCode::BAD_GATEWAY, "bad gateway")
}

async fn health() -> &'static str {
    "OK"
}

/// A small application instrumented with `MetricsLayer`.
pub fn demo_app(monitor: MonitorMetrics, settings: FilterSettings) -> Router {
    Router::new()
        .route("/api/users/:id", get(get_user).post(get_user))
        .route("/api/fail", get(failing))
        .route("/health", get(health))
        .layer(MetricsLayer::new(monitor, settings))
}

pub fn config(monitor: MonitorConfig) -> Arc<ConfigV1> {
    Arc::new(ConfigV1 {
        bind_address: "127.0.0.1:0".to_string(),
        logging: LoggingConfig::default(),
        monitor,
    })
}

pub fn request(method: Method, path: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .expect("failed to build request")
}

/// Reads the whole body; the observation is reported once the body ends.
pub async fn body_string<B>(response: Response<B>) -> String
where
    B: http_body::Body,
    B::Error: std::fmt::Debug,
{
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Value of the sample line starting with `series`.
pub fn sample(rendered: &str, series: &str) -> Option<f64> {
    rendered.lines().find_map(|line| {
        let value = line.strip_prefix(series)?.strip_prefix(' ')?;
        value.trim().parse().ok()
    })
}
