use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::attributes::RequestAttributes;
use super::classify::is_error;
use super::layer::FilterSettings;
use crate::metrics::{MonitorMetrics, RequestObservation};

/// Measurements of a request still in flight.
///
/// Reported exactly once, when dropped: after the body has been streamed,
/// when the inner service fails, or when the request is abandoned midway
/// (a panicking handler or a client disconnect).
pub(crate) struct PendingObservation {
    pub(crate) monitor: MonitorMetrics,
    pub(crate) settings: Arc<FilterSettings>,
    pub(crate) attributes: RequestAttributes,
    pub(crate) start: Instant,
    pub(crate) protocol: String,
    pub(crate) method: String,
    pub(crate) path: String,
    // Stays 500 unless the inner service produces a response.
    pub(crate) status: u16,
    pub(crate) bytes: u64,
}

impl PendingObservation {
    pub(crate) fn add_bytes(&mut self, len: u64) {
        self.bytes += len;
    }

    pub(crate) fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    fn finish(&mut self) -> RequestObservation {
        let raw_message = self
            .settings
            .error_message_attribute
            .as_deref()
            .and_then(|name| self.attributes.remove(name));
        RequestObservation {
            protocol: std::mem::take(&mut self.protocol),
            status: self.status,
            method: std::mem::take(&mut self.method),
            path: std::mem::take(&mut self.path),
            is_error: is_error(self.status),
            error_message: self.monitor.sanitize_error_message(raw_message.as_deref()),
            elapsed_seconds: self.start.elapsed().as_secs_f64(),
            byte_count: self.bytes,
        }
    }
}

impl Drop for PendingObservation {
    fn drop(&mut self) {
        let observation = self.finish();
        debug!(
            protocol = %observation.protocol,
            status = observation.status,
            method = %observation.method,
            path = %observation.path,
            elapsed_seconds = observation.elapsed_seconds,
            bytes = observation.byte_count,
            "request observed"
        );
        self.monitor.collect_time(&observation);
        self.monitor.collect_size(&observation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{create_executor, ExecutorKind};
    use crate::metrics::MetricsInit;
    use std::time::Duration;

    #[test]
    fn report_consumes_the_error_message_attribute() {
        let executor = create_executor(ExecutorKind::Timer, 1, Duration::from_secs(10)).unwrap();
        let monitor = MonitorMetrics::new(executor);
        monitor
            .init(MetricsInit {
                collect_runtime_metrics: false,
                ..MetricsInit::default()
            })
            .unwrap();
        let attributes = RequestAttributes::new();
        attributes.set("error-info", "quota exceeded");

        let mut pending = PendingObservation {
            monitor: monitor.clone(),
            settings: Arc::new(FilterSettings {
                error_message_attribute: Some("error-info".to_string()),
                ..FilterSettings::default()
            }),
            attributes: attributes.clone(),
            start: Instant::now(),
            protocol: "https".to_string(),
            method: "PUT".to_string(),
            path: "/quota".to_string(),
            status: 500,
            bytes: 0,
        };
        pending.set_status(429);
        pending.add_bytes(5);
        drop(pending);

        assert_eq!(attributes.get("error-info"), None);
        let scrape = monitor.render().unwrap();
        assert!(scrape.contains(
            r#"response_size_bytes{addr="/quota",errorMessage="quota exceeded",isError="true",method="PUT",status="429",type="https"} 5"#
        ));
    }
}
