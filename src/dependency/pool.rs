use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::executor::{accepts_period, run_fixed_rate, CheckerExecutor, Task, SHUTDOWN_TIMEOUT};
use crate::metrics::MetricsError;

const POOL_THREAD_NAME: &str = "monitor-metrics-dependency-pool";

/// Runs tasks concurrently on a bounded pool of worker threads.
///
/// Schedules tick on a small async scheduler; each execution is handed to a
/// blocking pool capped at `pool_size` threads and awaited before the next
/// tick of the same schedule.
pub struct PoolExecutor {
    runtime: Mutex<Option<Runtime>>,
    cancel: CancellationToken,
    start_delay: Duration,
    pool_size: usize,
}

impl PoolExecutor {
    pub fn new(pool_size: usize, start_delay: Duration) -> Result<Self, MetricsError> {
        let pool_size = pool_size.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(pool_size)
            .thread_name(POOL_THREAD_NAME)
            .enable_time()
            .build()?;
        Ok(PoolExecutor {
            runtime: Mutex::new(Some(runtime)),
            cancel: CancellationToken::new(),
            start_delay,
            pool_size,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl CheckerExecutor for PoolExecutor {
    fn schedule(&self, task: Task, period: Duration) {
        if !accepts_period(period) {
            return;
        }
        let guard = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(runtime) = guard.as_ref() else {
            debug!("Pool executor shut down, not scheduling dependency check");
            return;
        };
        let start = tokio::time::Instant::from_std(Instant::now() + self.start_delay);
        runtime.spawn(run_fixed_rate(
            start,
            period,
            self.cancel.clone(),
            move || {
                let task = task.clone();
                async move {
                    if let Err(err) = tokio::task::spawn_blocking(move || task()).await {
                        warn!("Dependency check did not complete: {}", err);
                    }
                }
            },
        ));
    }

    fn cancel_tasks(&self) {
        self.cancel.cancel();
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            // A runtime cannot be shut down from inside another async context,
            // so the bounded wait happens on a helper thread.
            let shutdown = thread::spawn(move || runtime.shutdown_timeout(SHUTDOWN_TIMEOUT));
            if shutdown.join().is_err() {
                warn!("Dependency checker pool did not shut down cleanly");
            }
        }
    }
}

impl Drop for PoolExecutor {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which panics inside an async context.
        let runtime = self
            .runtime
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            self.cancel.cancel();
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for PoolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolExecutor")
            .field("pool_size", &self.pool_size)
            .field("start_delay", &self.start_delay)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
