use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised synchronously by the public scheduler API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Job {0} is already pending or running")]
    DuplicateJob(String),

    #[error("Invalid job options: {0}")]
    InvalidOptions(String),

    #[error("Job registry at capacity ({0} jobs)")]
    QueueFull(usize),

    #[error("Job not found: {0}")]
    JobNotFound(String),
}

impl SchedulerError {
    /// Validation errors are rejected at submission and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SchedulerError::DuplicateJob(_) | SchedulerError::InvalidOptions(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Failure of a single execution attempt. Recorded on the job, never raised
/// out of the pump.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum JobError {
    #[error("Job execution failed: {0}")]
    Execution(String),

    #[error("Job timed out after {0} ms")]
    Timeout(u64),
}

impl JobError {
    pub fn execution(message: impl std::fmt::Display) -> Self {
        JobError::Execution(message.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, JobError::Timeout(_))
    }
}
