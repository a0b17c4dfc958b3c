//! Execution strategies for periodic dependency checks.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::pool::PoolExecutor;
use super::timer::TimerExecutor;
use crate::metrics::MetricsError;

/// A unit of periodic work. Each scheduled task is invoked once per period.
pub type Task = Arc<dyn Fn() + Send + Sync>;

/// Delay between registration and the first execution of a task.
pub const DEFAULT_START_DELAY: Duration = Duration::from_secs(10);

/// Workers of the pool executor when no size is configured.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// How long the pool executor waits for in-flight checks on cancellation.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs tasks at a fixed rate until cancelled.
pub trait CheckerExecutor: Send + Sync {
    /// Schedules `task` for repeated fixed-rate execution every `period`,
    /// starting after the executor's start delay.
    fn schedule(&self, task: Task, period: Duration);

    /// Stops all future executions and releases the executor threads.
    /// Executions already in progress are not interrupted.
    ///
    /// May block the calling thread while in-flight executions finish (up to
    /// `SHUTDOWN_TIMEOUT` for the pool executor). From async code, call it
    /// through `tokio::task::spawn_blocking`.
    fn cancel_tasks(&self);
}

/// Which executor to build from configuration.
#[derive(Deserialize, Serialize, JsonSchema, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// One background thread; checks run one after another.
    #[default]
    Timer,
    /// A bounded pool of worker threads; checks run concurrently.
    Pool,
}

/// Builds the executor selected by `kind`.
pub fn create_executor(
    kind: ExecutorKind,
    pool_size: usize,
    start_delay: Duration,
) -> Result<Arc<dyn CheckerExecutor>, MetricsError> {
    let executor: Arc<dyn CheckerExecutor> = match kind {
        ExecutorKind::Timer => Arc::new(TimerExecutor::new(start_delay)?),
        ExecutorKind::Pool => Arc::new(PoolExecutor::new(pool_size, start_delay)?),
    };
    Ok(executor)
}

/// Fixed-rate loop shared by both executors.
///
/// Missed ticks are fired back to back so executions stay aligned with the
/// original schedule, and each execution is awaited before the next tick so a
/// task never overlaps itself.
pub(crate) async fn run_fixed_rate<F, Fut>(
    start: tokio::time::Instant,
    period: Duration,
    cancel: CancellationToken,
    mut execute: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => execute().await,
        }
    }
}

/// `interval_at` rejects a zero period.
pub(crate) fn accepts_period(period: Duration) -> bool {
    if period.is_zero() {
        warn!("Ignoring dependency check scheduled with a zero period");
        return false;
    }
    true
}
