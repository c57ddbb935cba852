//! Synthetic load for the scheduler.
//!
//! Submits a batch of jobs spread evenly over the four priorities, each
//! sleeping for a random duration and failing at random, then drains the
//! scheduler with a [`PumpDriver`] and summarizes the outcome per priority.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::SimulationConfig;
use crate::error::{Result, SchedulerError};
use crate::scheduler::{Job, JobOptions, JobStatus, Priority, Scheduler};
use crate::worker::{JobContext, PumpDriver};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriorityReport {
    pub jobs: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Mean time from submission to terminal status, over terminal jobs.
    pub mean_latency_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationReport {
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Jobs that never reached a terminal status (the run was interrupted).
    pub unfinished: usize,
    pub total_attempts: u64,
    pub interrupted: bool,
    pub per_priority: BTreeMap<Priority, PriorityReport>,
}

impl SimulationReport {
    pub fn terminal(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    fn from_jobs(jobs: &[Job], interrupted: bool) -> Self {
        let mut report = SimulationReport {
            submitted: jobs.len(),
            interrupted,
            ..Default::default()
        };
        let mut latency_sums: BTreeMap<Priority, (f64, usize)> = BTreeMap::new();

        for job in jobs {
            report.total_attempts += u64::from(job.attempts);
            let entry = report.per_priority.entry(job.priority).or_default();
            entry.jobs += 1;
            match job.status {
                JobStatus::Completed => {
                    report.completed += 1;
                    entry.completed += 1;
                }
                JobStatus::Failed => {
                    report.failed += 1;
                    entry.failed += 1;
                }
                JobStatus::Cancelled => {
                    report.cancelled += 1;
                    entry.cancelled += 1;
                }
                JobStatus::Pending | JobStatus::Running => report.unfinished += 1,
            }
            if let Some(latency) = job.latency() {
                let sum = latency_sums.entry(job.priority).or_default();
                sum.0 += latency.num_microseconds().unwrap_or(i64::MAX) as f64 / 1_000.0;
                sum.1 += 1;
            }
        }

        for (priority, (total_ms, count)) in latency_sums {
            if let Some(entry) = report.per_priority.get_mut(&priority) {
                entry.mean_latency_ms = total_ms / count as f64;
            }
        }
        report
    }
}

/// Submit the configured load and drain it.
///
/// Returns early (with `interrupted` set) if `stop` fires before every job is
/// terminal. The scheduler is left running either way; shutting it down is up
/// to the caller.
pub async fn run_simulation(
    scheduler: &Scheduler,
    config: &SimulationConfig,
    stop: CancellationToken,
) -> Result<SimulationReport> {
    config.validate().map_err(SchedulerError::InvalidOptions)?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let failure_rng = Arc::new(Mutex::new(StdRng::seed_from_u64(rng.gen())));
    let failure_rate = config.failure_rate;

    let mut ids = Vec::with_capacity(config.jobs);
    for index in 0..config.jobs {
        let priority = Priority::ALL[index % Priority::ALL.len()];
        let duration =
            Duration::from_millis(rng.gen_range(config.min_duration_ms..=config.max_duration_ms));
        let failure_rng = failure_rng.clone();

        let mut options = JobOptions::new(priority).with_max_attempts(config.max_attempts);
        options.timeout_ms = config.timeout_ms;

        let id = format!("sim-{:04}-{}", index, priority);
        scheduler
            .submit(
                id.clone(),
                move |ctx: JobContext| {
                    let failure_rng = failure_rng.clone();
                    async move { simulated_body(ctx, duration, failure_rng, failure_rate).await }
                },
                options,
            )
            .await?;
        ids.push(id);
    }
    tracing::info!(jobs = ids.len(), seed = ?config.seed, "Simulation load submitted");

    let driver_cancel = stop.child_token();
    let driver = PumpDriver::new(scheduler.clone()).spawn(driver_cancel.clone());

    let poll = Duration::from_millis(config.poll_interval_ms.max(1));
    let interrupted = loop {
        let stats = scheduler.stats().await;
        if stats.pending == 0 && stats.running == 0 {
            break false;
        }
        tokio::select! {
            _ = stop.cancelled() => break true,
            _ = tokio::time::sleep(poll) => {}
        }
    };

    driver_cancel.cancel();
    if let Err(e) = driver.await {
        tracing::warn!(error = %e, "Pump driver task ended abnormally");
    }

    let mut jobs = Vec::with_capacity(ids.len());
    for id in &ids {
        if let Some(job) = scheduler.job(id).await {
            jobs.push(job);
        }
    }
    let report = SimulationReport::from_jobs(&jobs, interrupted);
    tracing::info!(
        completed = report.completed,
        failed = report.failed,
        cancelled = report.cancelled,
        unfinished = report.unfinished,
        interrupted,
        "Simulation finished"
    );
    Ok(report)
}

async fn simulated_body(
    ctx: JobContext,
    duration: Duration,
    failure_rng: Arc<Mutex<StdRng>>,
    failure_rate: f64,
) -> std::result::Result<(), String> {
    ctx.cache.set("attempts_seen", ctx.attempt.into());

    tokio::select! {
        _ = ctx.cancelled() => return Err("cancelled mid-attempt".to_string()),
        _ = tokio::time::sleep(duration) => {}
    }

    let fail = failure_rng
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .gen_bool(failure_rate);
    if fail {
        Err(format!("simulated failure on attempt {}", ctx.attempt))
    } else {
        Ok(())
    }
}
