//! Application startup and server initialization.
//!
//! Builds the dependency checker executor and the metrics instrument set,
//! initializes the instruments once, then serves the router until a shutdown
//! signal arrives.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ConfigV1;
use crate::dependency::{create_executor, DEFAULT_START_DELAY};
use crate::metrics::MonitorMetrics;
use crate::routes;
use crate::state::AppState;

/// Creates the shared state: executor, instruments and their one-shot init.
///
/// # Errors
///
/// Fails on invalid buckets, on a registration error or when the executor
/// threads cannot be started.
pub fn build_state(config: Arc<ConfigV1>) -> Result<AppState, Box<dyn std::error::Error>> {
    let monitor_config = &config.monitor;
    let executor = create_executor(
        monitor_config.executor,
        monitor_config.pool_size,
        DEFAULT_START_DELAY,
    )?;
    let monitor = MonitorMetrics::new(executor);
    monitor.init(monitor_config.metrics_init()?)?;

    Ok(AppState {
        config: config.clone(),
        monitor,
    })
}

/// Initializes and runs the application server.
///
/// Binds to the address specified in the configuration and serves requests
/// until ctrl-c or SIGTERM. Dependency checkers are cancelled on the way out.
///
/// # Errors
///
/// Returns an error if the state cannot be built, the server fails to bind to
/// the specified address or encounters a runtime error during execution.
pub async fn run(config: Arc<ConfigV1>) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(config.clone())?;
    let monitor = state.monitor.clone();

    info!("Starting server on {}", config.bind_address);

    let app = routes::create_router(state);
    let listener = TcpListener::bind(&config.bind_address).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Cancelling the pool executor blocks for up to its shutdown timeout.
    if let Err(e) =
        tokio::task::spawn_blocking(move || monitor.cancel_all_dependency_checkers()).await
    {
        warn!("Failed to cancel dependency checkers: {}", e);
    }

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
