use crate::error::{OptimizerError, Result};

/// Receives `(percent, message)` milestones from a running job.
pub trait ProgressReporter {
    fn report(&mut self, percent: u8, message: &str);
}

impl<F: FnMut(u8, &str)> ProgressReporter for F {
    fn report(&mut self, percent: u8, message: &str) {
        self(percent, message);
    }
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&mut self, _percent: u8, _message: &str) {}
}

/// Forwards only milestones that do not go backwards, clamped to 100.
#[derive(Debug)]
pub struct Monotonic<R> {
    inner: R,
    last: Option<u8>,
}

impl<R: ProgressReporter> Monotonic<R> {
    pub const fn new(inner: R) -> Self {
        Self { inner, last: None }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: ProgressReporter> ProgressReporter for Monotonic<R> {
    fn report(&mut self, percent: u8, message: &str) {
        let percent = percent.min(100);
        if self.last.is_some_and(|last| percent < last) {
            return;
        }
        self.last = Some(percent);
        self.inner.report(percent, message);
    }
}

/// How a task ended, as the queue sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Success,
    Failure,
    Terminated,
}

impl TaskState {
    #[must_use]
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(OptimizerError::Cancelled) => Self::Terminated,
            Err(_) => Self::Failure,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Terminated => "TERMINATED",
        }
    }
}
