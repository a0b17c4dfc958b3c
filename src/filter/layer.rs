//! Request instrumentation middleware.
//!
//! `MetricsLayer` wraps any `tower` service that answers `http` requests.
//! For each request that is not excluded it measures the elapsed time, the
//! final status and the exact number of body bytes sent, then reports them
//! to `request_seconds` and `response_size_bytes`.

use http::{Request, Response};
use http_body::Body;
use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

use super::attributes::RequestAttributes;
use super::body::CountingBody;
use super::path::{is_excluded, truncate};
use super::pending::PendingObservation;
use crate::metrics::MonitorMetrics;

/// Protocol label used when the request URI carries no scheme.
pub const DEFAULT_PROTOCOL: &str = "http";

/// Per-deployment settings of the request layer. Immutable once built.
#[derive(Clone, Debug, Default)]
pub struct FilterSettings {
    /// Segments kept in the `addr` label; 0 keeps the full path.
    pub path_depth: i64,
    /// Path prefixes, relative to `context_path`, that are not instrumented.
    pub exclusions: Vec<String>,
    pub context_path: String,
    /// Name of the request attribute holding a raw error message.
    pub error_message_attribute: Option<String>,
}

/// [`tower::Layer`] installing request instrumentation.
///
/// ```ignore
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(MetricsLayer::new(monitor.clone(), settings));
/// ```
#[derive(Clone)]
pub struct MetricsLayer {
    monitor: MonitorMetrics,
    settings: Arc<FilterSettings>,
}

impl MetricsLayer {
    pub fn new(monitor: MonitorMetrics, settings: FilterSettings) -> Self {
        MetricsLayer {
            monitor,
            settings: Arc::new(settings),
        }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            monitor: self.monitor.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// Service produced by [`MetricsLayer`].
#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    monitor: MonitorMetrics,
    settings: Arc<FilterSettings>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for MetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: Body,
{
    type Response = Response<CountingBody<ResBody>>;
    type Error = S::Error;
    type Future = MetricsFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let start = Instant::now();
        let settings = &self.settings;
        let raw_path = req.uri().path();

        if is_excluded(raw_path, &settings.context_path, &settings.exclusions) {
            return MetricsFuture {
                inner: self.inner.call(req),
                observation: None,
            };
        }

        let path = truncate(raw_path, settings.path_depth);
        let protocol = req
            .uri()
            .scheme_str()
            .unwrap_or(DEFAULT_PROTOCOL)
            .to_string();
        let method = req.method().as_str().to_string();
        let attributes = RequestAttributes::new();
        req.extensions_mut().insert(attributes.clone());

        let observation = PendingObservation {
            monitor: self.monitor.clone(),
            settings: self.settings.clone(),
            attributes,
            start,
            protocol,
            method,
            path,
            status: 500,
            bytes: 0,
        };
        MetricsFuture {
            inner: self.inner.call(req),
            observation: Some(observation),
        }
    }
}

/// Response future of [`MetricsService`].
#[pin_project]
pub struct MetricsFuture<F> {
    #[pin]
    inner: F,
    observation: Option<PendingObservation>,
}

impl<F, B, E> Future for MetricsFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
    B: Body,
{
    type Output = Result<Response<CountingBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));
        let mut observation = this.observation.take();
        match result {
            Ok(response) => {
                if let Some(observation) = observation.as_mut() {
                    observation.set_status(response.status().as_u16());
                }
                Poll::Ready(Ok(
                    response.map(|body| CountingBody::observed(body, observation))
                ))
            }
            Err(err) => {
                // Reported right away with the fallback status.
                drop(observation);
                Poll::Ready(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{create_executor, ExecutorKind};
    use crate::metrics::MetricsInit;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::{service_fn, ServiceExt};

    fn monitor() -> MonitorMetrics {
        let executor = create_executor(ExecutorKind::Timer, 1, Duration::from_secs(10)).unwrap();
        let monitor = MonitorMetrics::new(executor);
        monitor
            .init(MetricsInit {
                collect_runtime_metrics: false,
                ..MetricsInit::default()
            })
            .unwrap();
        monitor
    }

    fn echo_path(
        request: Request<String>,
    ) -> impl Future<Output = Result<Response<String>, std::convert::Infallible>> {
        std::future::ready(Ok(Response::new(request.uri().path().to_string())))
    }

    #[tokio::test]
    async fn instruments_plain_http_services() {
        let monitor = monitor();
        let settings = FilterSettings {
            path_depth: 1,
            exclusions: vec!["/internal".to_string()],
            ..FilterSettings::default()
        };
        let layer = MetricsLayer::new(monitor.clone(), settings);

        let request = Request::get("/orders/17").body(String::new()).unwrap();
        let response = layer
            .layer(service_fn(echo_path))
            .oneshot(request)
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"/orders/17");

        let request = Request::get("/internal/state").body(String::new()).unwrap();
        let response = layer
            .layer(service_fn(echo_path))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.body().byte_count(), 0);
        drop(response);

        let scrape = monitor.render().unwrap();
        assert!(scrape.contains(
            r#"response_size_bytes{addr="/orders",errorMessage="",isError="false",method="GET",status="200",type="http"} 10"#
        ));
        assert!(!scrape.contains("/internal"));
    }
}
