//! Periodic health checks of external dependencies.
//!
//! Checkers are registered through `MonitorMetrics::add_dependency_checker`
//! and executed by a `CheckerExecutor` chosen at startup.

mod checker;
mod executor;
mod pool;
mod timer;

pub use checker::{DependencyChecker, DependencyState, FnChecker};
pub use executor::{
    create_executor, CheckerExecutor, ExecutorKind, Task, DEFAULT_POOL_SIZE, DEFAULT_START_DELAY,
    SHUTDOWN_TIMEOUT,
};
pub use pool::PoolExecutor;
pub use timer::TimerExecutor;
