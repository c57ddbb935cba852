pub mod clock;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod shutdown;
pub mod simulation;
pub mod worker;

pub use error::{JobError, Result, SchedulerError};
pub use scheduler::{CancelOutcome, Job, JobOptions, JobStatus, Priority, Scheduler};
pub use worker::{JobContext, PumpDriver};
