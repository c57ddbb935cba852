use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{JobError, Result, SchedulerError};
use crate::scheduler::job::{Job, JobStatus, Priority};

pub const DEFAULT_MAX_JOBS: usize = 10_000;

/// Snapshot of registry contents by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub pending_by_priority: BTreeMap<Priority, usize>,
}

impl QueueStats {
    pub fn terminal(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.terminal()
    }
}

/// Four FIFO queues of pending job ids plus the registry of job records.
///
/// Every pending job id sits in exactly one queue, the one matching its
/// priority. Running and terminal jobs are in no queue.
#[derive(Debug)]
pub struct JobQueue {
    jobs: HashMap<String, Job>,
    queues: [VecDeque<String>; 4],
    max_jobs: usize,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    /// Create an empty queue with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_JOBS)
    }

    /// Create an empty queue holding at most `max_jobs` records
    pub fn with_capacity(max_jobs: usize) -> Self {
        Self {
            jobs: HashMap::new(),
            queues: Default::default(),
            max_jobs,
        }
    }

    /// Register a new pending job and append it to its priority queue.
    ///
    /// A terminal record with the same id is replaced; an active one is not.
    pub fn submit(&mut self, job: Job) -> Result<()> {
        let replaces_terminal = match self.jobs.get(&job.id) {
            Some(existing) if existing.is_active() => {
                return Err(SchedulerError::DuplicateJob(job.id));
            }
            Some(_) => true,
            None => false,
        };

        if !replaces_terminal && self.is_full() {
            return Err(SchedulerError::QueueFull(self.max_jobs));
        }

        self.queues[job.priority.queue_index()].push_back(job.id.clone());
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    /// Head of the highest-priority non-empty queue. Does not dequeue.
    pub fn peek_next(&self) -> Option<&str> {
        self.queues
            .iter()
            .find_map(|queue| queue.front())
            .map(String::as_str)
    }

    /// Dequeue `id` and mark it running. Returns false if `id` was not pending.
    pub fn commit_next(&mut self, id: &str) -> bool {
        if !self.remove_if_pending(id) {
            return false;
        }
        if let Some(job) = self.jobs.get_mut(id) {
            job.status = JobStatus::Running;
        }
        true
    }

    /// Dequeue `id` without starting it.
    pub fn remove_if_pending(&mut self, id: &str) -> bool {
        let Some(job) = self.jobs.get(id) else {
            return false;
        };
        if job.status != JobStatus::Pending {
            return false;
        }
        let queue = &mut self.queues[job.priority.queue_index()];
        match queue.iter().position(|queued| queued == id) {
            Some(pos) => {
                queue.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drop `id` from the queues if its record is missing or no longer
    /// pending. Returns true if a stale entry was removed.
    pub fn discard_stale(&mut self, id: &str) -> bool {
        if self
            .jobs
            .get(id)
            .is_some_and(|job| job.status == JobStatus::Pending)
        {
            return false;
        }
        let mut removed = false;
        for queue in &mut self.queues {
            let before = queue.len();
            queue.retain(|queued| queued != id);
            removed |= queue.len() != before;
        }
        removed
    }

    /// Move an active job to a terminal status. Terminal records are left as is.
    pub fn finish(
        &mut self,
        id: &str,
        status: JobStatus,
        error: Option<JobError>,
        now: DateTime<Utc>,
    ) -> bool {
        debug_assert!(status.is_terminal());
        let Some(job) = self.jobs.get_mut(id) else {
            return false;
        };
        if job.status.is_terminal() {
            return false;
        }
        job.status = status;
        if error.is_some() {
            job.last_error = error;
        }
        job.completed_at = Some(now);
        true
    }

    /// Get a job by ID
    pub fn get_job(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Get a mutable reference to a job by ID
    pub fn get_job_mut(&mut self, id: &str) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    /// All jobs sorted chronologically by creation time
    pub fn all_jobs(&self) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.jobs.values().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Jobs currently marked running
    pub fn running_jobs(&self) -> Vec<&Job> {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .collect()
    }

    /// Pending ids at `priority`, head first.
    pub fn pending_ids(&self, priority: Priority) -> impl Iterator<Item = &str> {
        self.queues[priority.queue_index()]
            .iter()
            .map(String::as_str)
    }

    /// Number of pending jobs at `priority`
    pub fn pending_len(&self, priority: Priority) -> usize {
        self.queues[priority.queue_index()].len()
    }

    /// Check whether any queue holds a pending job
    pub fn has_pending(&self) -> bool {
        self.queues.iter().any(|q| !q.is_empty())
    }

    /// Count jobs by status and pending jobs by priority
    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for job in self.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        for priority in Priority::ALL {
            stats
                .pending_by_priority
                .insert(priority, self.pending_len(priority));
        }
        stats
    }

    /// Remove completed, failed and cancelled jobs. Returns the number removed.
    pub fn cleanup_finished_jobs(&mut self) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| job.is_active());
        before - self.jobs.len()
    }

    /// Drop every record and queue entry.
    pub fn reset(&mut self) {
        self.jobs.clear();
        for queue in &mut self.queues {
            queue.clear();
        }
    }

    /// Number of registered jobs
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Check if the registry is at capacity
    pub fn is_full(&self) -> bool {
        self.jobs.len() >= self.max_jobs
    }
}
