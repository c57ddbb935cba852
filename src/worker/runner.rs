use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::JobError;
use crate::scheduler::cache::JobCache;
use crate::scheduler::job::{Job, JobStatus};
use crate::scheduler::pump::SchedulerState;

pub type JobFuture = Pin<Box<dyn Future<Output = Result<(), JobError>> + Send>>;

/// Type-erased job function, called once per attempt.
pub type JobFn = Arc<dyn Fn(JobContext) -> JobFuture + Send + Sync>;

/// What a job function receives on each attempt.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Scratch space shared by every attempt of this job.
    pub cache: JobCache,
    cancel: CancellationToken,
}

impl JobContext {
    /// True once the job was cancelled or this attempt hit its deadline.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the job is cancelled or this attempt hits its deadline.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Token to hand to work the job spawns on its own.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// What the runner needs to start one attempt.
struct AttemptPlan {
    number: u32,
    max_attempts: u32,
    timeout_ms: Option<u64>,
    cache: JobCache,
}

/// Drives one committed job through its attempts to a terminal status, then
/// frees the slot.
///
/// Only touches the record stamped with its `run_id`, so a runner that
/// outlives a reset leaves a resubmitted job with the same id alone.
#[derive(Clone)]
pub(crate) struct JobRunner {
    state: Arc<RwLock<SchedulerState>>,
    clock: Arc<dyn Clock>,
    wakeup: Arc<Notify>,
    run_id: u64,
}

impl JobRunner {
    pub(crate) fn new(
        state: Arc<RwLock<SchedulerState>>,
        clock: Arc<dyn Clock>,
        wakeup: Arc<Notify>,
        run_id: u64,
    ) -> Self {
        Self {
            state,
            clock,
            wakeup,
            run_id,
        }
    }

    /// Run the attempt loop in its own task and free the slot however that
    /// task ends.
    pub(crate) async fn run(self, job_id: String, job_fn: JobFn, token: CancellationToken) {
        let attempts = tokio::spawn(self.clone().run_attempts(job_id.clone(), job_fn, token));
        if let Err(e) = attempts.await {
            tracing::error!(job_id = %job_id, run_id = self.run_id, error = %e, "Job runner crashed");
            self.fail_run(&job_id, JobError::Execution(format!("job runner crashed: {}", e)))
                .await;
        }
        self.release_slot().await;
    }

    async fn run_attempts(self, job_id: String, job_fn: JobFn, token: CancellationToken) {
        while let Some(plan) = self.begin_attempt(&job_id).await {
            let outcome = self.execute_attempt(&job_id, &job_fn, plan, &token).await;
            if self.record_outcome(&job_id, outcome).await {
                break;
            }
        }
    }

    fn owns(&self, job: &Job) -> bool {
        job.run_id == Some(self.run_id) && job.status == JobStatus::Running
    }

    /// Returns `None` when the job must not run again: it was cancelled
    /// between attempts, or this run no longer owns its record.
    async fn begin_attempt(&self, job_id: &str) -> Option<AttemptPlan> {
        let mut state = self.state.write().await;
        let now = self.clock.now();
        let job = state.queue.get_job_mut(job_id)?;
        if !self.owns(job) {
            return None;
        }
        if job.cancel_requested {
            state.queue.finish(job_id, JobStatus::Cancelled, None, now);
            tracing::info!(job_id, "Job cancelled before attempt");
            return None;
        }

        job.started_at.get_or_insert(now);
        job.attempts += 1;
        Some(AttemptPlan {
            number: job.attempts,
            max_attempts: job.max_attempts,
            timeout_ms: job.timeout_ms,
            cache: job.cache.clone(),
        })
    }

    /// Run one attempt in its own task so a panic stays contained, racing it
    /// against the deadline. On timeout the attempt's token is cancelled and
    /// the task aborted.
    ///
    /// The job function is called inside that task, so a panic raised while
    /// it builds the attempt future is captured like any other.
    async fn execute_attempt(
        &self,
        job_id: &str,
        job_fn: &JobFn,
        plan: AttemptPlan,
        token: &CancellationToken,
    ) -> Result<(), JobError> {
        let attempt_token = token.child_token();
        let ctx = JobContext {
            job_id: job_id.to_string(),
            attempt: plan.number,
            max_attempts: plan.max_attempts,
            cache: plan.cache,
            cancel: attempt_token.clone(),
        };
        tracing::debug!(job_id, attempt = plan.number, "Attempt started");

        let job_fn = job_fn.clone();
        let mut handle = tokio::spawn(async move { (job_fn.as_ref())(ctx).await });
        let joined = match plan.timeout_ms {
            Some(timeout_ms) => {
                match tokio::time::timeout(Duration::from_millis(timeout_ms), &mut handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        attempt_token.cancel();
                        handle.abort();
                        tracing::warn!(
                            job_id,
                            attempt = plan.number,
                            timeout_ms,
                            "Attempt timed out"
                        );
                        return Err(JobError::Timeout(timeout_ms));
                    }
                }
            }
            None => handle.await,
        };

        joined.unwrap_or_else(|e| Err(Self::join_error(job_id, e)))
    }

    fn join_error(job_id: &str, error: JoinError) -> JobError {
        if error.is_panic() {
            let payload = error.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::error!(job_id, panic = %message, "Job panicked");
            JobError::Execution(format!("job panicked: {}", message))
        } else {
            JobError::Execution(format!("attempt task aborted: {}", error))
        }
    }

    /// Apply an attempt's outcome. Returns true once the job is terminal.
    async fn record_outcome(&self, job_id: &str, outcome: Result<(), JobError>) -> bool {
        let mut state = self.state.write().await;
        let now = self.clock.now();
        let Some(job) = state
            .queue
            .get_job_mut(job_id)
            .filter(|job| job.run_id == Some(self.run_id))
        else {
            tracing::debug!(job_id, run_id = self.run_id, "Job record replaced, dropping outcome");
            return true;
        };
        if job.status != JobStatus::Running {
            return true;
        }

        if job.cancel_requested {
            let error = outcome.err();
            state.queue.finish(job_id, JobStatus::Cancelled, error, now);
            tracing::info!(job_id, "Job cancelled");
            return true;
        }

        match outcome {
            Ok(()) => {
                let attempts = job.attempts;
                state.queue.finish(job_id, JobStatus::Completed, None, now);
                tracing::info!(job_id, attempts, "Job completed");
                true
            }
            Err(error) => {
                if job.has_attempts_left() {
                    tracing::warn!(
                        job_id,
                        attempt = job.attempts,
                        max_attempts = job.max_attempts,
                        error = %error,
                        "Attempt failed, retrying"
                    );
                    job.last_error = Some(error);
                    false
                } else {
                    let attempts = job.attempts;
                    tracing::warn!(job_id, attempts, error = %error, "Job failed");
                    state.queue.finish(job_id, JobStatus::Failed, Some(error), now);
                    true
                }
            }
        }
    }

    /// Record a failure for a run whose attempt loop died.
    async fn fail_run(&self, job_id: &str, error: JobError) {
        let mut state = self.state.write().await;
        let now = self.clock.now();
        if state.queue.get_job(job_id).is_some_and(|job| self.owns(job)) {
            state.queue.finish(job_id, JobStatus::Failed, Some(error), now);
        }
    }

    async fn release_slot(&self) {
        {
            let mut state = self.state.write().await;
            if state
                .slot
                .as_ref()
                .is_some_and(|slot| slot.run_id == self.run_id)
            {
                state.slot = None;
            }
        }
        self.wakeup.notify_one();
    }
}
