use core::fmt::{Debug, Display};
use std::path::PathBuf;

use project_matching_config::ConfigError;
use project_matching_database::DatabaseError;
use project_matching_optimizer::attempt::WorkflowError;
use project_matching_optimizer::progress::TaskState;
use project_matching_optimizer::OptimizerError;

/// Exit code asking the surrounding queue to retry later (`EX_TEMPFAIL`).
pub const EXIT_RETRY: u8 = 75;
pub const EXIT_FAILURE: u8 = 1;

#[derive(thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),
    #[error("request refused: {0}")]
    Workflow(#[from] WorkflowError),
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("cannot write output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("cannot write output: {0}")]
    Stdout(std::io::Error),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Debug for WorkerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        Display::fmt(self, f)
    }
}

impl WorkerError {
    /// Only infrastructure hiccups are worth another attempt; the optimizer is
    /// deterministic on the same data.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(error) => error.is_transient(),
            _ => false,
        }
    }

    /// Whether the attempt is closed as failed. A retryable failure leaves it open
    /// so the rerun passes the lifecycle check.
    #[must_use]
    pub fn closes_attempt(&self) -> bool {
        !self.is_retryable()
    }

    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.is_retryable() {
            EXIT_RETRY
        } else {
            EXIT_FAILURE
        }
    }

    #[must_use]
    pub fn task_state(&self) -> TaskState {
        match self {
            Self::Optimizer(OptimizerError::Cancelled) => TaskState::Terminated,
            _ => TaskState::Failure,
        }
    }
}
