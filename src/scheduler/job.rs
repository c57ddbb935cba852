use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{JobError, SchedulerError};
use crate::scheduler::cache::JobCache;

/// Dispatch priority. `Critical > High > Medium > Low`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl Priority {
    /// All levels, highest first. This is the order the pump scans queues in.
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    /// Position of this level's queue in [`Priority::ALL`].
    pub(crate) fn queue_index(self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Priority {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(SchedulerError::InvalidOptions(format!(
                "unknown priority '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-submission options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    pub priority: Priority,
    /// Total attempts allowed, including the first. Must be at least 1.
    pub max_attempts: u32,
    /// Per-attempt deadline. `None` means the attempt is unbounded.
    pub timeout_ms: Option<u64>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: Priority::default(),
            max_attempts: 1,
            timeout_ms: None,
        }
    }
}

impl JobOptions {
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.max_attempts == 0 {
            return Err(SchedulerError::InvalidOptions(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(SchedulerError::InvalidOptions(
                "timeout_ms must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Registry record for one submitted job.
///
/// The record outlives the job: once terminal it stays in the registry until
/// [`JobQueue::reset`](crate::scheduler::JobQueue::reset) or
/// [`JobQueue::cleanup_finished_jobs`](crate::scheduler::JobQueue::cleanup_finished_jobs).
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub priority: Priority,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub timeout_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<JobError>,
    pub cancel_requested: bool,
    #[serde(skip)]
    pub cache: JobCache,
    /// Run that owns this record while it is running. A runner left over
    /// from before a reset never touches a record it did not start.
    #[serde(skip)]
    pub(crate) run_id: Option<u64>,
}

impl Job {
    pub fn new(id: impl Into<String>, options: JobOptions, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            priority: options.priority,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: options.max_attempts,
            timeout_ms: options.timeout_ms,
            created_at,
            started_at: None,
            completed_at: None,
            last_error: None,
            cancel_requested: false,
            cache: JobCache::new(),
            run_id: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Time from submission to reaching a terminal state.
    pub fn latency(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.created_at)
    }
}
