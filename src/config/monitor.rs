//! Options of the metrics layer, named after the filter parameters they replace.

use figment::providers::{Format, Yaml};
use figment::Figment;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::ConfigError;
use crate::dependency::{ExecutorKind, DEFAULT_POOL_SIZE};
use crate::filter::classify::DEFAULT_ERROR_INFO_MAX_SIZE;
use crate::filter::FilterSettings;
use crate::metrics::MetricsInit;

/// File consulted for `application.version` when no version is configured.
pub const APPLICATION_PROPERTIES_FILE: &str = "./application.yaml";

/// A scalar as written in YAML or in an environment variable.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone, PartialEq)]
#[serde(untagged)]
pub enum ScalarValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    fn as_text(&self) -> String {
        match self {
            ScalarValue::Int(i) => i.to_string(),
            ScalarValue::Float(f) => f.to_string(),
            ScalarValue::Text(s) => s.clone(),
        }
    }
}

/// A list written either as a YAML sequence or as a comma-separated string.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone, PartialEq)]
#[serde(untagged)]
pub enum ListValue {
    List(Vec<ScalarValue>),
    Text(String),
}

impl ListValue {
    fn items(&self) -> Vec<String> {
        let raw: Vec<String> = match self {
            ListValue::List(values) => values.iter().map(ScalarValue::as_text).collect(),
            ListValue::Text(text) => text.split(',').map(str::to_string).collect(),
        };
        raw.into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    }
}

#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
#[serde(rename_all = "kebab-case", default)]
pub struct MonitorConfig {
    /// Histogram buckets in seconds.
    pub buckets: Option<ListValue>,
    /// Path segments kept in the `addr` label; 0 keeps full paths.
    pub path_depth: Option<ScalarValue>,
    /// Path prefixes that bypass instrumentation.
    pub exclusions: Option<ListValue>,
    /// Prefix stripped from request paths before matching exclusions.
    pub context_path: String,
    #[serde(alias = "export-jvm-metrics")]
    pub export_runtime_metrics: bool,
    pub application_version: Option<String>,
    /// Request attribute holding a raw error message.
    pub error_message: Option<String>,
    /// Pattern of characters stripped from error messages.
    pub error_info_regex: Option<String>,
    pub error_info_max_size: Option<usize>,
    pub debug: bool,
    pub executor: ExecutorKind,
    pub pool_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            buckets: None,
            path_depth: None,
            exclusions: None,
            context_path: String::new(),
            export_runtime_metrics: true,
            application_version: None,
            error_message: None,
            error_info_regex: None,
            error_info_max_size: None,
            debug: false,
            executor: ExecutorKind::default(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl MonitorConfig {
    /// Parses the configured buckets.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidBucket` on the first entry that is not a number.
    pub fn bucket_values(&self) -> Result<Vec<f64>, ConfigError> {
        let Some(buckets) = &self.buckets else {
            return Ok(Vec::new());
        };
        buckets
            .items()
            .into_iter()
            .map(|item| {
                item.parse::<f64>()
                    .map_err(|_| ConfigError::InvalidBucket(item.clone()))
            })
            .collect()
    }

    /// The configured path depth, or 0 when missing or malformed.
    pub fn path_depth(&self) -> i64 {
        match &self.path_depth {
            None => 0,
            Some(ScalarValue::Int(depth)) => *depth,
            Some(other) => {
                let text = other.as_text();
                match text.trim().parse::<i64>() {
                    Ok(depth) => depth,
                    Err(_) => {
                        warn!("Invalid path-depth '{}', using full paths", text);
                        0
                    }
                }
            }
        }
    }

    pub fn exclusion_list(&self) -> Vec<String> {
        self.exclusions
            .as_ref()
            .map(ListValue::items)
            .unwrap_or_default()
    }

    /// The configured version, else `application.version` from
    /// `APPLICATION_PROPERTIES_FILE`, else `"unknown"`.
    pub fn application_version(&self) -> String {
        if let Some(version) = &self.application_version {
            return version.clone();
        }
        read_application_version(&Figment::new().merge(Yaml::file(APPLICATION_PROPERTIES_FILE)))
    }

    pub fn filter_settings(&self) -> FilterSettings {
        FilterSettings {
            path_depth: self.path_depth(),
            exclusions: self.exclusion_list(),
            context_path: self.context_path.clone(),
            error_message_attribute: self.error_message.clone(),
        }
    }

    /// Parameters for `MonitorMetrics::init`.
    ///
    /// # Errors
    ///
    /// Fails when a bucket is not a number.
    pub fn metrics_init(&self) -> Result<MetricsInit, ConfigError> {
        Ok(MetricsInit {
            collect_runtime_metrics: self.export_runtime_metrics,
            application_version: self.application_version(),
            error_info_regex: self.error_info_regex.clone(),
            error_info_max_size: self
                .error_info_max_size
                .unwrap_or(DEFAULT_ERROR_INFO_MAX_SIZE),
            buckets: self.bucket_values()?,
        })
    }
}

fn read_application_version(figment: &Figment) -> String {
    match figment.extract_inner::<String>("application.version") {
        Ok(version) => version,
        Err(e) => {
            debug!("No application version found: {}", e);
            "unknown".to_string()
        }
    }
}
