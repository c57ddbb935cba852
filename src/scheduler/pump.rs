use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::error::{JobError, Result, SchedulerError};
use crate::scheduler::job::{Job, JobOptions, JobStatus};
use crate::scheduler::queue::{JobQueue, QueueStats};
use crate::worker::runner::{JobContext, JobFn, JobFuture, JobRunner};

/// The single execution slot. Present while a runner owns it.
#[derive(Debug)]
pub(crate) struct RunningSlot {
    pub job_id: String,
    pub run_id: u64,
    pub token: CancellationToken,
}

/// Everything the pump and runner mutate. Guarded by one lock so every
/// status transition is atomic with respect to `advance()`.
pub(crate) struct SchedulerState {
    pub queue: JobQueue,
    pub handlers: HashMap<String, JobFn>,
    pub slot: Option<RunningSlot>,
    pub shut_down: bool,
    pub next_run_id: u64,
}

impl std::fmt::Debug for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerState")
            .field("queue", &self.queue)
            .field("handler_count", &self.handlers.len())
            .field("slot", &self.slot)
            .field("shut_down", &self.shut_down)
            .field("next_run_id", &self.next_run_id)
            .finish()
    }
}

/// Result of [`Scheduler::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was still queued and is now Cancelled.
    Cancelled,
    /// The job is running; it becomes Cancelled when its current attempt ends.
    Requested,
    /// The job had already reached a terminal status.
    AlreadyFinished(JobStatus),
}

/// Priority-ordered, single-slot job scheduler.
///
/// Cheap to clone; clones share the same registry and slot. Jobs only start
/// when something calls [`Scheduler::advance`], either the caller directly or
/// a [`PumpDriver`](crate::worker::PumpDriver).
#[derive(Clone)]
pub struct Scheduler {
    config: SchedulerConfig,
    state: Arc<RwLock<SchedulerState>>,
    clock: Arc<dyn Clock>,
    wakeup: Arc<Notify>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        let state = SchedulerState {
            queue: JobQueue::with_capacity(config.max_jobs),
            handlers: HashMap::new(),
            slot: None,
            shut_down: false,
            next_run_id: 0,
        };
        Self {
            config,
            state: Arc::new(RwLock::new(state)),
            clock,
            wakeup: Arc::new(Notify::new()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Notified whenever there may be new work for the pump: a submission or a
    /// released slot.
    pub(crate) fn wakeup(&self) -> Arc<Notify> {
        self.wakeup.clone()
    }

    /// Queue a job under a caller-chosen id.
    ///
    /// `job_fn` is called once per attempt with a fresh [`JobContext`] that
    /// carries the job's persistent cache. Any `Err` it returns counts as a
    /// failed attempt.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::InvalidOptions`] for an empty id, `max_attempts == 0`
    ///   or `timeout_ms == Some(0)`.
    /// - [`SchedulerError::DuplicateJob`] if `id` is pending or running.
    /// - [`SchedulerError::QueueFull`] if the registry is at capacity.
    pub async fn submit<F, Fut, E>(
        &self,
        id: impl Into<String>,
        job_fn: F,
        options: JobOptions,
    ) -> Result<()>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SchedulerError::InvalidOptions(
                "job id must not be empty".to_string(),
            ));
        }
        options.validate()?;

        let job_fn: JobFn = Arc::new(move |ctx: JobContext| {
            let attempt = job_fn(ctx);
            Box::pin(async move { attempt.await.map_err(JobError::execution) }) as JobFuture
        });

        {
            let mut state = self.state.write().await;
            let job = Job::new(id.clone(), options, self.clock.now());
            if let Err(e) = state.queue.submit(job) {
                tracing::warn!(job_id = %id, error = %e, "Job rejected");
                return Err(e);
            }
            state.handlers.insert(id.clone(), job_fn);
            if state.shut_down {
                tracing::warn!(job_id = %id, "Job queued after shutdown, it will not be started");
            }
        }

        tracing::info!(
            job_id = %id,
            priority = %options.priority,
            max_attempts = options.max_attempts,
            timeout_ms = ?options.timeout_ms,
            "Job submitted"
        );
        self.wakeup.notify_one();
        Ok(())
    }

    /// Like [`Scheduler::submit`] with a generated UUID id, which is returned.
    pub async fn submit_unnamed<F, Fut, E>(&self, job_fn: F, options: JobOptions) -> Result<String>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let id = Uuid::new_v4().to_string();
        self.submit(id.clone(), job_fn, options).await?;
        Ok(id)
    }

    /// Start the next job if the slot is free.
    ///
    /// Picks the head of the highest-priority non-empty queue, marks it
    /// running and spawns its runner without waiting on it. Returns the id of
    /// the job started, or `None` when the slot is busy, nothing is pending or
    /// the scheduler is shut down. Never fails.
    pub async fn advance(&self) -> Option<String> {
        let (job_id, run_id, job_fn, token) = {
            let mut state = self.state.write().await;
            if state.shut_down {
                tracing::debug!("Pump is shut down, not starting jobs");
                return None;
            }
            if let Some(slot) = &state.slot {
                tracing::debug!(running = %slot.job_id, "Slot occupied");
                return None;
            }

            let job_id = loop {
                let head = state.queue.peek_next()?.to_string();
                if state.queue.commit_next(&head) {
                    break head;
                }
                // Queue entry without a pending record behind it
                tracing::error!(job_id = %head, "Dropping stale queue entry");
                if !state.queue.discard_stale(&head) {
                    return None;
                }
            };

            let Some(job_fn) = state.handlers.remove(&job_id) else {
                tracing::error!(job_id = %job_id, "No job function registered, failing job");
                state.queue.finish(
                    &job_id,
                    JobStatus::Failed,
                    Some(JobError::Execution(
                        "no job function registered".to_string(),
                    )),
                    self.clock.now(),
                );
                return None;
            };

            let run_id = state.next_run_id;
            state.next_run_id += 1;
            if let Some(job) = state.queue.get_job_mut(&job_id) {
                job.run_id = Some(run_id);
            }
            let token = CancellationToken::new();
            state.slot = Some(RunningSlot {
                job_id: job_id.clone(),
                run_id,
                token: token.clone(),
            });
            (job_id, run_id, job_fn, token)
        };

        tracing::info!(job_id = %job_id, run_id, "Job started");
        let runner = JobRunner::new(
            self.state.clone(),
            self.clock.clone(),
            self.wakeup.clone(),
            run_id,
        );
        tokio::spawn(runner.run(job_id.clone(), job_fn, token));
        Some(job_id)
    }

    /// Cancel a job.
    ///
    /// A pending job is removed from its queue and becomes Cancelled with zero
    /// attempts. A running job only gets a cancellation request: its token is
    /// signalled and the runner records Cancelled once the current attempt
    /// ends, with no further retries.
    pub async fn cancel(&self, id: &str) -> Result<CancelOutcome> {
        let mut state = self.state.write().await;
        let status = match state.queue.get_job(id) {
            Some(job) => job.status,
            None => return Err(SchedulerError::JobNotFound(id.to_string())),
        };

        match status {
            JobStatus::Pending => {
                state.queue.remove_if_pending(id);
                state.handlers.remove(id);
                state
                    .queue
                    .finish(id, JobStatus::Cancelled, None, self.clock.now());
                tracing::info!(job_id = %id, "Pending job cancelled");
                Ok(CancelOutcome::Cancelled)
            }
            JobStatus::Running => {
                let run_id = state.queue.get_job_mut(id).and_then(|job| {
                    job.cancel_requested = true;
                    job.run_id
                });
                if let Some(slot) = state
                    .slot
                    .as_ref()
                    .filter(|slot| Some(slot.run_id) == run_id)
                {
                    slot.token.cancel();
                }
                tracing::info!(job_id = %id, "Cancellation requested for running job");
                Ok(CancelOutcome::Requested)
            }
            terminal => Ok(CancelOutcome::AlreadyFinished(terminal)),
        }
    }

    /// Jobs currently holding the slot (zero or one).
    pub async fn running_jobs(&self) -> Vec<Job> {
        let state = self.state.read().await;
        state.queue.running_jobs().into_iter().cloned().collect()
    }

    pub async fn job(&self, id: &str) -> Option<Job> {
        self.state.read().await.queue.get_job(id).cloned()
    }

    /// Every registered job, oldest first.
    pub async fn jobs(&self) -> Vec<Job> {
        let state = self.state.read().await;
        state.queue.all_jobs().into_iter().cloned().collect()
    }

    pub async fn stats(&self) -> QueueStats {
        self.state.read().await.queue.stats()
    }

    /// True when nothing is running and nothing is queued.
    pub async fn is_idle(&self) -> bool {
        let state = self.state.read().await;
        state.slot.is_none() && !state.queue.has_pending()
    }

    /// Stop starting jobs. A job that is already running is left alone and
    /// its outcome is still recorded. Idempotent.
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        tracing::info!(
            running = ?state.slot.as_ref().map(|slot| slot.job_id.as_str()),
            pending = state.queue.stats().pending,
            "Scheduler shut down"
        );
        drop(state);
        self.wakeup.notify_waiters();
    }

    pub async fn is_shut_down(&self) -> bool {
        self.state.read().await.shut_down
    }

    /// Drop terminal records. Returns how many were removed.
    pub async fn cleanup_finished_jobs(&self) -> usize {
        let removed = self.state.write().await.queue.cleanup_finished_jobs();
        tracing::debug!(removed, "Finished jobs cleaned up");
        removed
    }

    /// Clear the registry and all queues.
    ///
    /// Maintenance only. A job that is running keeps the slot until its
    /// runner exits, but its token is signalled and its outcome is dropped.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.queue.reset();
        state.handlers.clear();
        if let Some(slot) = &state.slot {
            slot.token.cancel();
        }
        tracing::info!("Scheduler state reset");
    }
}
