use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::logging::LoggingConfig;
use super::monitor::MonitorConfig;

/// Errors raised while loading or interpreting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error loading configuration: {0}")]
    Figment(#[from] figment::Error),
    #[error("invalid bucket value '{0}', buckets must be numbers")]
    InvalidBucket(String),
}

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct ConfigV1 {
    pub bind_address: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Builds the figment used by `load_config`: `./config.yaml`, then
/// `MONITOR_` prefixed environment variables (`MONITOR_MONITOR__PATH_DEPTH=2`).
pub fn figment() -> Figment {
    Figment::new()
        .merge(Yaml::file("./config.yaml"))
        .merge(Env::prefixed("MONITOR_").split("__").map(|key| {
            // The monitor section uses kebab-case option names.
            match key.as_str().strip_prefix("monitor.") {
                Some(option) => format!("monitor.{}", option.replace('_', "-")).into(),
                None => key.into(),
            }
        }))
}

/// Extracts a versioned configuration from `figment`.
pub fn extract_config(figment: &Figment) -> Result<ConfigV1, ConfigError> {
    match figment.extract::<Config>()? {
        Config::ConfigV1(c) => Ok(c),
    }
}

/// Load config from "config.yaml" in the current directory and the environment.
pub fn load_config() -> Result<ConfigV1, ConfigError> {
    extract_config(&figment())
}

/// Print the JSON schema for the configuration to stdout.
pub fn print_schema() -> Result<(), serde_json::Error> {
    let schema = schema_for!(Config);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
