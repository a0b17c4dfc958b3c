//! Metric instruments and their one-shot initialization.

use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::error::MetricsError;
use super::observation::{DependencyEvent, DependencyLabels, RequestObservation};
use crate::dependency::{CheckerExecutor, DependencyChecker, Task};
use crate::filter::classify::{Sanitizer, DEFAULT_ERROR_INFO_MAX_SIZE, DEFAULT_ERROR_INFO_REGEX};
use crate::utils::log_throttle::should_emit;

const REQUEST_SECONDS_METRIC_NAME: &str = "request_seconds";
const RESPONSE_SIZE_METRIC_NAME: &str = "response_size_bytes";
const DEPENDENCY_REQUEST_SECONDS_METRIC_NAME: &str = "dependency_request_seconds";
const DEPENDENCY_UP_METRIC_NAME: &str = "dependency_up";
const APPLICATION_INFO_METRIC_NAME: &str = "application_info";

const REQUEST_SECONDS_HELP: &str =
    "records in a histogram the number of http requests and their duration in seconds";
const RESPONSE_SIZE_HELP: &str = "counts the size of each http response";
const DEPENDENCY_REQUEST_SECONDS_HELP: &str =
    "records in a histogram the number of requests of a dependency and their duration in seconds";
const DEPENDENCY_UP_HELP: &str = "records if a dependency is up or down. 1 for up, 0 for down";
const APPLICATION_INFO_HELP: &str =
    "records static application info such as it's semantic version number";

const REQUEST_LABELS: &[&str] = &["type", "status", "method", "addr", "isError", "errorMessage"];
const DEPENDENCY_LABELS: &[&str] = &[
    "name",
    "type",
    "status",
    "method",
    "addr",
    "isError",
    "errorMessage",
];

/// Histogram buckets, in seconds, used when none are configured.
pub const DEFAULT_BUCKETS: [f64; 4] = [0.1, 0.3, 1.5, 10.5];

/// Parameters of `MonitorMetrics::init`.
#[derive(Clone, Debug)]
pub struct MetricsInit {
    /// Registers process level metrics (cpu, memory, file descriptors).
    pub collect_runtime_metrics: bool,
    pub application_version: String,
    /// Pattern of the characters stripped from error messages.
    /// `None` uses `DEFAULT_ERROR_INFO_REGEX`.
    pub error_info_regex: Option<String>,
    pub error_info_max_size: usize,
    /// Empty means `DEFAULT_BUCKETS`.
    pub buckets: Vec<f64>,
}

impl Default for MetricsInit {
    fn default() -> Self {
        MetricsInit {
            collect_runtime_metrics: true,
            application_version: "unknown".to_string(),
            error_info_regex: None,
            error_info_max_size: DEFAULT_ERROR_INFO_MAX_SIZE,
            buckets: Vec::new(),
        }
    }
}

/// The registered instrument set. Never changes once built.
struct Instruments {
    request_seconds: HistogramVec,
    response_size: IntCounterVec,
    dependency_request_seconds: HistogramVec,
    dependency_up: IntGaugeVec,
    sanitizer: Sanitizer,
}

struct Gate {
    registry: Registry,
    claimed: AtomicBool,
    instruments: OnceLock<Instruments>,
}

impl Gate {
    fn instruments(&self) -> Option<&Instruments> {
        self.instruments.get()
    }
}

/// Process-wide metrics handle shared by the request layer, the metrics
/// endpoint and the dependency scheduler.
///
/// Cloning is cheap; all clones share the same registry and instruments.
/// Nothing is recorded until `init` has succeeded once.
#[derive(Clone)]
pub struct MonitorMetrics {
    gate: Arc<Gate>,
    executor: Arc<dyn CheckerExecutor>,
}

impl MonitorMetrics {
    /// Creates an uninitialized handle that schedules dependency checks on `executor`.
    pub fn new(executor: Arc<dyn CheckerExecutor>) -> Self {
        MonitorMetrics {
            gate: Arc::new(Gate {
                registry: Registry::new(),
                claimed: AtomicBool::new(false),
                instruments: OnceLock::new(),
            }),
            executor,
        }
    }

    /// Registers every instrument. Succeeds at most once per handle.
    ///
    /// # Errors
    ///
    /// `MetricsError::InvalidBuckets` if the buckets are not finite and strictly
    /// increasing, `MetricsError::AlreadyInitialized` on any call after the
    /// first successful one, `MetricsError::Registration` if the registry
    /// rejects an instrument. A rejected registration leaves the registry as
    /// it was and the handle uninitialized, so `init` may be called again.
    pub fn init(&self, options: MetricsInit) -> Result<(), MetricsError> {
        validate_buckets(&options.buckets)?;
        let buckets = if options.buckets.is_empty() {
            DEFAULT_BUCKETS.to_vec()
        } else {
            options.buckets
        };

        let request_seconds = HistogramVec::new(
            HistogramOpts::new(REQUEST_SECONDS_METRIC_NAME, REQUEST_SECONDS_HELP)
                .buckets(buckets.clone()),
            REQUEST_LABELS,
        )?;
        let response_size = IntCounterVec::new(
            Opts::new(RESPONSE_SIZE_METRIC_NAME, RESPONSE_SIZE_HELP),
            REQUEST_LABELS,
        )?;
        let dependency_request_seconds = HistogramVec::new(
            HistogramOpts::new(
                DEPENDENCY_REQUEST_SECONDS_METRIC_NAME,
                DEPENDENCY_REQUEST_SECONDS_HELP,
            )
            .buckets(buckets.clone()),
            DEPENDENCY_LABELS,
        )?;
        let dependency_up = IntGaugeVec::new(
            Opts::new(DEPENDENCY_UP_METRIC_NAME, DEPENDENCY_UP_HELP),
            &["name"],
        )?;
        let application_info = IntGaugeVec::new(
            Opts::new(APPLICATION_INFO_METRIC_NAME, APPLICATION_INFO_HELP),
            &["version"],
        )?;

        if self
            .gate
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(MetricsError::AlreadyInitialized);
        }

        let collectors = || {
            let mut collectors: Vec<Box<dyn Collector>> = vec![
                Box::new(request_seconds.clone()),
                Box::new(response_size.clone()),
                Box::new(dependency_request_seconds.clone()),
                Box::new(dependency_up.clone()),
                Box::new(application_info.clone()),
            ];
            if options.collect_runtime_metrics {
                collectors.extend(process_collector());
            }
            collectors
        };
        // On failure nothing stays registered and the gate reopens.
        if let Err(err) = register_all(&self.gate.registry, collectors(), collectors()) {
            self.gate.claimed.store(false, Ordering::Release);
            return Err(err);
        }
        application_info
            .with_label_values(&[options.application_version.as_str()])
            .set(1);

        let sanitizer = Sanitizer::new(
            options
                .error_info_regex
                .as_deref()
                .unwrap_or(DEFAULT_ERROR_INFO_REGEX),
            options.error_info_max_size,
        );

        let instruments = Instruments {
            request_seconds,
            response_size,
            dependency_request_seconds,
            dependency_up,
            sanitizer,
        };
        self.gate
            .instruments
            .set(instruments)
            .map_err(|_| MetricsError::AlreadyInitialized)?;

        info!(
            "Metrics initialized (version '{}', buckets {:?})",
            options.application_version, buckets
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.gate.instruments().is_some()
    }

    /// Sanitizes a raw error message with the configured pattern and size.
    /// Always empty before `init`.
    pub fn sanitize_error_message(&self, raw: Option<&str>) -> String {
        match self.gate.instruments() {
            Some(instruments) => instruments.sanitizer.sanitize(raw),
            None => String::new(),
        }
    }

    /// The registry backing the scrape endpoint. Applications may register
    /// their own collectors on it.
    pub fn registry(&self) -> &Registry {
        &self.gate.registry
    }

    /// Observes the request duration. No-op before `init`.
    pub fn collect_time(&self, observation: &RequestObservation) {
        let Some(instruments) = self.gate.instruments() else {
            return;
        };
        let values = observation.label_values();
        instruments
            .request_seconds
            .with_label_values(&label_refs(&values))
            .observe(observation.elapsed_seconds);
    }

    /// Adds the response size. No-op before `init`.
    pub fn collect_size(&self, observation: &RequestObservation) {
        let Some(instruments) = self.gate.instruments() else {
            return;
        };
        let values = observation.label_values();
        instruments
            .response_size
            .with_label_values(&label_refs(&values))
            .inc_by(observation.byte_count);
    }

    /// Observes the duration of a dependency call. No-op before `init`.
    pub fn collect_dependency_time(&self, labels: &DependencyLabels, elapsed_seconds: f64) {
        let Some(instruments) = self.gate.instruments() else {
            return;
        };
        let values = labels.label_values();
        instruments
            .dependency_request_seconds
            .with_label_values(&label_refs(&values))
            .observe(elapsed_seconds);
    }

    /// Records a dependency call, classifying its status and sanitizing its
    /// error message. Non-positive durations are dropped.
    pub fn add_dependency_event(&self, event: &DependencyEvent, elapsed_seconds: f64) {
        if elapsed_seconds <= 0.0 || elapsed_seconds.is_nan() {
            debug!(
                "Dropping dependency event for '{}' with elapsed time {}",
                event.name, elapsed_seconds
            );
            return;
        }
        let Some(instruments) = self.gate.instruments() else {
            return;
        };
        let labels = DependencyLabels {
            name: event.name.clone(),
            protocol: event.protocol.clone(),
            status: event.status.to_string(),
            method: event.method.clone(),
            path: event.path.clone(),
            is_error: event.is_error(),
            error_message: instruments
                .sanitizer
                .sanitize(event.error_message.as_deref()),
        };
        self.collect_dependency_time(&labels, elapsed_seconds);
    }

    /// Schedules `checker` every `period`, publishing its state to `dependency_up`.
    pub fn add_dependency_checker(&self, checker: Arc<dyn DependencyChecker>, period: Duration) {
        debug!(
            "Scheduling dependency checker '{}' every {:?}",
            checker.dependency_name(),
            period
        );
        let gate = Arc::clone(&self.gate);
        let task: Task = Arc::new(move || run_checker(&gate, checker.as_ref()));
        self.executor.schedule(task, period);
    }

    /// Stops every scheduled dependency checker.
    ///
    /// Blocks like `CheckerExecutor::cancel_tasks`.
    pub fn cancel_all_dependency_checkers(&self) {
        info!("Cancelling dependency checkers");
        self.executor.cancel_tasks();
    }

    /// Renders all metrics in Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Encoding` if the encoder fails.
    pub fn render(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.gate.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

impl std::fmt::Debug for MonitorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorMetrics")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

fn label_refs<const N: usize>(values: &[String; N]) -> [&str; N] {
    std::array::from_fn(|i| values[i].as_str())
}

fn validate_buckets(buckets: &[f64]) -> Result<(), MetricsError> {
    let finite = buckets.iter().all(|b| b.is_finite());
    let increasing = buckets.windows(2).all(|pair| pair[0] < pair[1]);
    if finite && increasing {
        Ok(())
    } else {
        Err(MetricsError::InvalidBuckets(buckets.to_vec()))
    }
}

fn run_checker(gate: &Gate, checker: &dyn DependencyChecker) {
    let name = checker.dependency_name();
    match catch_unwind(AssertUnwindSafe(|| checker.run())) {
        Ok(state) => {
            let Some(instruments) = gate.instruments() else {
                // skipping, metrics have not been initialized yet
                return;
            };
            debug!("Dependency '{}' is {:?}", name, state);
            instruments
                .dependency_up
                .with_label_values(&[name])
                .set(state.value());
        }
        Err(_) => {
            let key = format!("dependency.checker.{}", name);
            if let Some(suppressed) = should_emit(&key, Duration::from_secs(60)) {
                error!(
                    suppressed,
                    "Dependency checker '{}' panicked, keeping its schedule", name
                );
            }
        }
    }
}

/// Registers `collectors` in order. On the first failure the ones already
/// registered are removed again, using the matching entries of `rollback`.
fn register_all(
    registry: &Registry,
    collectors: Vec<Box<dyn Collector>>,
    rollback: Vec<Box<dyn Collector>>,
) -> Result<(), MetricsError> {
    for (index, collector) in collectors.into_iter().enumerate() {
        if let Err(err) = registry.register(collector) {
            for registered in rollback.into_iter().take(index) {
                if let Err(e) = registry.unregister(registered) {
                    warn!("Failed to roll back metric registration: {}", e);
                }
            }
            return Err(err.into());
        }
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn process_collector() -> Option<Box<dyn Collector>> {
    use prometheus::process_collector::ProcessCollector;
    Some(Box::new(ProcessCollector::for_self()))
}

#[cfg(not(target_os = "linux"))]
fn process_collector() -> Option<Box<dyn Collector>> {
    debug!("Process metrics are only available on Linux");
    None
}
