use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A structured diagnostic reported by the lifecycle engine, e.g. a
/// misconfigured generated-source output location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub severity: Severity,
    pub message: String,
    pub path: Option<PathBuf>,
}

impl Problem {
    pub fn error(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            path,
        }
    }
}

/// Sink for diagnostics. Implemented by whatever surfaces problems to the
/// user (problem markers, logs, ...).
pub trait ProblemSink: Send + Sync {
    fn report(&self, problem: Problem);
}

/// A [`ProblemSink`] that collects problems in memory, for tests and
/// headless embedding.
#[derive(Debug, Default)]
pub struct CollectingSink {
    problems: Mutex<Vec<Problem>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Problem> {
        std::mem::take(&mut *self.lock_problems())
    }

    pub fn is_empty(&self) -> bool {
        self.lock_problems().is_empty()
    }

    #[track_caller]
    fn lock_problems(&self) -> MutexGuard<'_, Vec<Problem>> {
        match self.problems.lock() {
            Ok(guard) => guard,
            Err(err) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    target = "arbor.gen",
                    file = loc.file(),
                    line = loc.line(),
                    error = %err,
                    "mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }
}

impl ProblemSink for CollectingSink {
    fn report(&self, problem: Problem) {
        self.lock_problems().push(problem);
    }
}
