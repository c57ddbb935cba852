use chrono::{Duration, Utc};
use jobslot::error::{JobError, SchedulerError};
use jobslot::scheduler::job::{Job, JobOptions, JobStatus, Priority};
use jobslot::scheduler::queue::JobQueue;

fn job(id: &str, priority: Priority) -> Job {
    Job::new(id, JobOptions::new(priority), Utc::now())
}

#[test]
fn test_job_creation() {
    let job = Job::new("sync-indicator", JobOptions::default(), Utc::now());
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.priority, Priority::Medium);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_attempts, 1);
    assert!(job.timeout_ms.is_none());
    assert!(job.started_at.is_none());
    assert!(job.completed_at.is_none());
    assert!(job.last_error.is_none());
    assert!(job.cache.is_empty());
}

#[test]
fn test_priority_total_order() {
    assert!(Priority::Critical > Priority::High);
    assert!(Priority::High > Priority::Medium);
    assert!(Priority::Medium > Priority::Low);
    assert_eq!(
        Priority::ALL,
        [
            Priority::Critical,
            Priority::High,
            Priority::Medium,
            Priority::Low
        ]
    );
}

#[test]
fn test_priority_parse_and_display() {
    for priority in Priority::ALL {
        let parsed: Priority = priority.to_string().parse().unwrap();
        assert_eq!(parsed, priority);
    }
    assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
    let err = "urgent".parse::<Priority>().unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidOptions(_)));
}

#[test]
fn test_options_validation() {
    assert!(JobOptions::default().validate().is_ok());
    assert!(JobOptions::default()
        .with_max_attempts(3)
        .with_timeout_ms(500)
        .validate()
        .is_ok());

    let err = JobOptions::default()
        .with_max_attempts(0)
        .validate()
        .unwrap_err();
    assert!(err.is_validation());

    let err = JobOptions::default()
        .with_timeout_ms(0)
        .validate()
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidOptions(_)));
}

#[test]
fn test_peek_next_follows_priority_order() {
    let mut queue = JobQueue::new();
    queue.submit(job("low", Priority::Low)).unwrap();
    queue.submit(job("medium", Priority::Medium)).unwrap();
    queue.submit(job("high", Priority::High)).unwrap();
    queue.submit(job("critical", Priority::Critical)).unwrap();

    let mut order = Vec::new();
    while let Some(id) = queue.peek_next().map(str::to_string) {
        assert!(queue.commit_next(&id));
        order.push(id);
    }
    assert_eq!(order, vec!["critical", "high", "medium", "low"]);
}

#[test]
fn test_fifo_within_priority() {
    let mut queue = JobQueue::new();
    for id in ["a", "b", "c"] {
        queue.submit(job(id, Priority::High)).unwrap();
    }
    let pending: Vec<&str> = queue.pending_ids(Priority::High).collect();
    assert_eq!(pending, vec!["a", "b", "c"]);

    assert_eq!(queue.peek_next(), Some("a"));
    queue.commit_next("a");
    assert_eq!(queue.peek_next(), Some("b"));
}

#[test]
fn test_peek_does_not_mutate() {
    let mut queue = JobQueue::new();
    queue.submit(job("only", Priority::Low)).unwrap();
    assert_eq!(queue.peek_next(), Some("only"));
    assert_eq!(queue.peek_next(), Some("only"));
    assert_eq!(queue.pending_len(Priority::Low), 1);
    assert_eq!(queue.get_job("only").unwrap().status, JobStatus::Pending);
}

#[test]
fn test_commit_next_marks_running() {
    let mut queue = JobQueue::new();
    queue.submit(job("a", Priority::Medium)).unwrap();

    assert!(queue.commit_next("a"));
    assert_eq!(queue.get_job("a").unwrap().status, JobStatus::Running);
    assert_eq!(queue.pending_len(Priority::Medium), 0);
    assert_eq!(queue.running_jobs().len(), 1);

    // Already running, and unknown ids
    assert!(!queue.commit_next("a"));
    assert!(!queue.commit_next("missing"));
}

#[test]
fn test_remove_if_pending() {
    let mut queue = JobQueue::new();
    queue.submit(job("a", Priority::Low)).unwrap();
    queue.submit(job("b", Priority::Low)).unwrap();
    queue.commit_next("a");

    assert!(!queue.remove_if_pending("a"), "running job is not pending");
    assert!(queue.remove_if_pending("b"));
    assert!(!queue.remove_if_pending("b"));
    assert!(queue.peek_next().is_none());
}

#[test]
fn test_discard_stale_only_drops_non_pending_entries() {
    let mut queue = JobQueue::new();
    queue.submit(job("live", Priority::High)).unwrap();
    assert!(!queue.discard_stale("live"));
    assert_eq!(queue.peek_next(), Some("live"));

    // Marked terminal behind the queue's back
    queue.get_job_mut("live").unwrap().status = JobStatus::Completed;
    assert!(queue.discard_stale("live"));
    assert!(queue.peek_next().is_none());
    assert!(!queue.discard_stale("live"));
}

#[test]
fn test_duplicate_active_id_rejected() {
    let mut queue = JobQueue::new();
    queue.submit(job("dup", Priority::Low)).unwrap();

    let err = queue.submit(job("dup", Priority::High)).unwrap_err();
    assert_eq!(err, SchedulerError::DuplicateJob("dup".to_string()));

    queue.commit_next("dup");
    let err = queue.submit(job("dup", Priority::High)).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_terminal_id_can_be_reused() {
    let mut queue = JobQueue::new();
    queue.submit(job("reuse", Priority::Low)).unwrap();
    queue.commit_next("reuse");
    queue.finish("reuse", JobStatus::Completed, None, Utc::now());

    queue.submit(job("reuse", Priority::Critical)).unwrap();
    let record = queue.get_job("reuse").unwrap();
    assert_eq!(record.status, JobStatus::Pending);
    assert_eq!(record.priority, Priority::Critical);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.peek_next(), Some("reuse"));
}

#[test]
fn test_finish_is_monotonic() {
    let mut queue = JobQueue::new();
    queue.submit(job("a", Priority::Low)).unwrap();
    queue.commit_next("a");

    let first = Utc::now();
    assert!(queue.finish(
        "a",
        JobStatus::Failed,
        Some(JobError::Timeout(10)),
        first
    ));
    assert!(!queue.finish(
        "a",
        JobStatus::Completed,
        None,
        first + Duration::seconds(1)
    ));

    let record = queue.get_job("a").unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.last_error, Some(JobError::Timeout(10)));
    assert_eq!(record.completed_at, Some(first));
}

#[test]
fn test_capacity_and_cleanup() {
    let mut queue = JobQueue::with_capacity(2);
    queue.submit(job("a", Priority::Low)).unwrap();
    queue.submit(job("b", Priority::Low)).unwrap();
    assert!(queue.is_full());

    let err = queue.submit(job("c", Priority::Low)).unwrap_err();
    assert_eq!(err, SchedulerError::QueueFull(2));

    queue.commit_next("a");
    queue.finish("a", JobStatus::Completed, None, Utc::now());
    assert_eq!(queue.cleanup_finished_jobs(), 1);
    assert!(queue.get_job("a").is_none());

    queue.submit(job("c", Priority::Low)).unwrap();
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_stats_by_status_and_priority() {
    let mut queue = JobQueue::new();
    queue.submit(job("c1", Priority::Critical)).unwrap();
    queue.submit(job("h1", Priority::High)).unwrap();
    queue.submit(job("h2", Priority::High)).unwrap();
    queue.submit(job("l1", Priority::Low)).unwrap();

    queue.commit_next("c1");
    queue.remove_if_pending("l1");
    queue.finish("l1", JobStatus::Cancelled, None, Utc::now());

    let stats = queue.stats();
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.running, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.terminal(), 1);
    assert_eq!(stats.total(), 4);
    assert_eq!(stats.pending_by_priority[&Priority::High], 2);
    assert_eq!(stats.pending_by_priority[&Priority::Critical], 0);
    assert_eq!(stats.pending_by_priority[&Priority::Low], 0);
}

#[test]
fn test_all_jobs_sorted_by_creation() {
    let mut queue = JobQueue::new();
    let base = Utc::now();
    queue
        .submit(Job::new("late", JobOptions::default(), base + Duration::seconds(5)))
        .unwrap();
    queue
        .submit(Job::new("early", JobOptions::default(), base))
        .unwrap();

    let ids: Vec<&str> = queue.all_jobs().iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["early", "late"]);
}

#[test]
fn test_reset_clears_everything() {
    let mut queue = JobQueue::new();
    queue.submit(job("a", Priority::Low)).unwrap();
    queue.submit(job("b", Priority::Critical)).unwrap();
    queue.reset();

    assert!(queue.is_empty());
    assert!(queue.peek_next().is_none());
    assert!(!queue.has_pending());
}
