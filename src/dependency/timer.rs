use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::executor::{accepts_period, run_fixed_rate, CheckerExecutor, Task};
use crate::metrics::MetricsError;

const TIMER_THREAD_NAME: &str = "monitor-metrics-dependency-checker";

struct Scheduled {
    task: Task,
    start: Instant,
    period: Duration,
}

/// Runs every task on one dedicated background thread.
///
/// Tasks are multiplexed on a current-thread runtime, so one slow check delays
/// the others but two checks never run at the same time.
pub struct TimerExecutor {
    sender: mpsc::UnboundedSender<Scheduled>,
    cancel: CancellationToken,
    start_delay: Duration,
}

impl TimerExecutor {
    pub fn new(start_delay: Duration) -> Result<Self, MetricsError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let (sender, mut receiver) = mpsc::unbounded_channel::<Scheduled>();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        thread::Builder::new()
            .name(TIMER_THREAD_NAME.to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    loop {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            received = receiver.recv() => match received {
                                Some(scheduled) => {
                                    tokio::spawn(run_fixed_rate(
                                        tokio::time::Instant::from_std(scheduled.start),
                                        scheduled.period,
                                        token.clone(),
                                        move || {
                                            let task = scheduled.task.clone();
                                            async move { task() }
                                        },
                                    ));
                                }
                                None => break,
                            },
                        }
                    }
                });
                // Dropping the runtime here discards every pending schedule.
                debug!("Dependency checker timer stopped");
            })?;

        Ok(TimerExecutor {
            sender,
            cancel,
            start_delay,
        })
    }
}

impl CheckerExecutor for TimerExecutor {
    fn schedule(&self, task: Task, period: Duration) {
        if self.cancel.is_cancelled() {
            debug!("Timer executor cancelled, not scheduling dependency check");
            return;
        }
        if !accepts_period(period) {
            return;
        }
        let scheduled = Scheduled {
            task,
            start: Instant::now() + self.start_delay,
            period,
        };
        if self.sender.send(scheduled).is_err() {
            debug!("Timer thread is gone, dependency check dropped");
        }
    }

    fn cancel_tasks(&self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for TimerExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerExecutor")
            .field("start_delay", &self.start_delay)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
