use serde::Serialize;

/// State reported by a dependency health check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DependencyState {
    Down,
    Up,
}

impl DependencyState {
    /// Gauge value of the state: 1 for up, 0 for down.
    pub fn value(self) -> i64 {
        match self {
            DependencyState::Down => 0,
            DependencyState::Up => 1,
        }
    }
}

impl From<bool> for DependencyState {
    fn from(up: bool) -> Self {
        if up {
            DependencyState::Up
        } else {
            DependencyState::Down
        }
    }
}

/// A health check for one external dependency.
///
/// `run` may block (for instance on a socket connect); it executes on the
/// scheduler's own threads, never on request threads.
pub trait DependencyChecker: Send + Sync {
    fn dependency_name(&self) -> &str;
    fn run(&self) -> DependencyState;
}

/// Adapts a closure into a `DependencyChecker`.
pub struct FnChecker<F> {
    name: String,
    check: F,
}

impl<F> FnChecker<F>
where
    F: Fn() -> DependencyState + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        FnChecker {
            name: name.into(),
            check,
        }
    }
}

impl<F> DependencyChecker for FnChecker<F>
where
    F: Fn() -> DependencyState + Send + Sync,
{
    fn dependency_name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> DependencyState {
        (self.check)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_values() {
        assert_eq!(DependencyState::Up.value(), 1);
        assert_eq!(DependencyState::Down.value(), 0);
        assert_eq!(DependencyState::from(false), DependencyState::Down);
    }

    #[test]
    fn closure_checker_reports_its_name_and_state() {
        let checker = FnChecker::new("redis", || DependencyState::Up);
        assert_eq!(checker.dependency_name(), "redis");
        assert_eq!(checker.run(), DependencyState::Up);
    }
}
