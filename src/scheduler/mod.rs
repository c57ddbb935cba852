pub mod cache;
pub mod job;
pub mod pump;
pub mod queue;

pub use cache::JobCache;
pub use job::{Job, JobOptions, JobStatus, Priority};
pub use pump::{CancelOutcome, Scheduler};
pub use queue::{JobQueue, QueueStats};
