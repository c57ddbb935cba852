//! End-to-end drain tests.
//!
//! These tests validate that under a mixed load of 100 jobs:
//! - every job reaches a terminal status and none is dropped
//! - queues and the slot are empty afterwards
//! - `attempts <= max_attempts` holds for every job
//! - Critical jobs finish, on average, well before Low jobs


use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;

use jobslot::config::SimulationConfig;
use jobslot::simulation::run_simulation;
use jobslot::{JobContext, JobOptions, JobStatus, Priority};
use test_harness::{drain, test_scheduler};

const JOBS: usize = 100;

#[tokio::test(start_paused = true)]
async fn test_mixed_load_drains_by_manual_advance() {
    let scheduler = test_scheduler();
    let mut rng = StdRng::seed_from_u64(7);
    let failure_rng = Arc::new(Mutex::new(StdRng::seed_from_u64(11)));

    for index in 0..JOBS {
        let priority = Priority::ALL[index % 4];
        let duration = Duration::from_millis(rng.gen_range(25..=100));
        let failure_rng = failure_rng.clone();
        scheduler
            .submit(
                format!("job-{:03}", index),
                move |_ctx: JobContext| {
                    let failure_rng = failure_rng.clone();
                    async move {
                        tokio::time::sleep(duration).await;
                        let fail = failure_rng.lock().unwrap().gen_bool(0.1);
                        if fail {
                            Err("random failure".to_string())
                        } else {
                            Ok(())
                        }
                    }
                },
                JobOptions::new(priority)
                    .with_max_attempts(3)
                    .with_timeout_ms(1_000),
            )
            .await
            .unwrap();
    }

    let started = drain(&scheduler, Duration::from_secs(120)).await;
    assert_eq!(started.len(), JOBS, "every job is started exactly once");

    let stats = scheduler.stats().await;
    assert_eq!(stats.terminal(), JOBS);
    assert_eq!(stats.completed + stats.failed + stats.cancelled, JOBS);
    assert_eq!(stats.pending, 0);
    assert!(stats.pending_by_priority.values().all(|&n| n == 0));
    assert!(scheduler.running_jobs().await.is_empty());

    let jobs = scheduler.jobs().await;
    let mut latency: HashMap<Priority, (i64, i64)> = HashMap::new();
    for job in &jobs {
        assert!(job.attempts >= 1 && job.attempts <= job.max_attempts);
        if job.status == JobStatus::Failed {
            assert_eq!(job.attempts, job.max_attempts);
            assert!(job.last_error.is_some());
        }
        let ms = job.latency().unwrap().num_milliseconds();
        let entry = latency.entry(job.priority).or_default();
        entry.0 += ms;
        entry.1 += 1;
    }

    let mean = |p: Priority| {
        let (sum, count) = latency[&p];
        sum as f64 / count as f64
    };
    assert!(mean(Priority::Critical) < mean(Priority::High));
    assert!(mean(Priority::High) < mean(Priority::Medium));
    assert!(mean(Priority::Medium) < mean(Priority::Low));

    // Every Critical job started before any Low job
    let position = |id: &str| started.iter().position(|s| s == id).unwrap();
    let last_critical = jobs
        .iter()
        .filter(|j| j.priority == Priority::Critical)
        .map(|j| position(&j.id))
        .max()
        .unwrap();
    let first_low = jobs
        .iter()
        .filter(|j| j.priority == Priority::Low)
        .map(|j| position(&j.id))
        .min()
        .unwrap();
    assert!(last_critical < first_low);
}

#[tokio::test(start_paused = true)]
async fn test_simulation_report() {
    let scheduler = test_scheduler();
    let config = SimulationConfig::default().with_seed(42);

    let report = run_simulation(&scheduler, &config, CancellationToken::new())
        .await
        .unwrap();

    assert!(!report.interrupted);
    assert_eq!(report.submitted, JOBS);
    assert_eq!(report.terminal(), JOBS);
    assert_eq!(report.unfinished, 0);
    assert_eq!(report.cancelled, 0);
    assert!(report.total_attempts >= JOBS as u64);
    assert!(report.total_attempts <= 3 * JOBS as u64);

    for priority in Priority::ALL {
        assert_eq!(report.per_priority[&priority].jobs, JOBS / 4);
    }
    let critical = report.per_priority[&Priority::Critical].mean_latency_ms;
    let low = report.per_priority[&Priority::Low].mean_latency_ms;
    assert!(
        critical < low,
        "critical mean {}ms should beat low mean {}ms",
        critical,
        low
    );

    assert!(scheduler.is_idle().await);
    assert!(scheduler.running_jobs().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_simulation_interrupted_by_shutdown() {
    let scheduler = test_scheduler();
    let config = SimulationConfig::default().with_seed(3).with_jobs(40);
    let stop = CancellationToken::new();

    let trigger = {
        let scheduler = scheduler.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            scheduler.shutdown().await;
            stop.cancel();
        })
    };

    let report = run_simulation(&scheduler, &config, stop).await.unwrap();
    trigger.await.unwrap();

    assert!(report.interrupted);
    assert!(report.unfinished > 0);
    assert_eq!(report.submitted, 40);
    assert_eq!(report.terminal() + report.unfinished, 40);

    // Whatever was running finishes and is recorded; nothing new starts
    test_harness::assert_eventually(
        || async { scheduler.running_jobs().await.is_empty() },
        Duration::from_secs(2),
        "running job should finish after shutdown",
    )
    .await;
    assert!(scheduler.advance().await.is_none());
    assert!(scheduler.stats().await.pending > 0);
}

#[tokio::test(start_paused = true)]
async fn test_simulation_rejects_invalid_config() {
    let scheduler = test_scheduler();
    let config = SimulationConfig {
        failure_rate: 2.0,
        ..SimulationConfig::default()
    };
    let err = run_simulation(&scheduler, &config, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(scheduler.jobs().await.is_empty());
}
