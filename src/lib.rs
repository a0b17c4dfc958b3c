//! Library exports for monitor-metrics, shared between the binary and tests.

pub mod config;
pub mod dependency;
pub mod filter;
pub mod metrics;
pub mod routes;
pub mod startup;
pub mod state;
pub mod utils;
