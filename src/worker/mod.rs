//! Job execution.
//!
//! - [`runner`]: drives one job through its attempts (timeout race, retry
//!   decision, cancellation override) and frees the slot when done.
//! - [`driver`]: [`PumpDriver`], a background loop that keeps calling
//!   [`Scheduler::advance`](crate::scheduler::Scheduler::advance).
//!
//! # Execution Flow
//!
//! 1. `advance()` commits the next job and spawns a runner for it
//! 2. Each attempt runs in its own task with a [`JobContext`]
//! 3. The attempt is raced against the job's `timeout_ms`, if any
//! 4. The outcome is recorded; failed attempts retry until `max_attempts`
//! 5. The slot is released and the driver is woken
//!
//! # Cancellation Note
//!
//! Cancellation and timeouts are cooperative. A timed-out attempt task is
//! aborted at its next await point and its token is cancelled, but anything
//! it detached on its own keeps running unless it watches the token.

pub mod driver;
pub mod runner;

pub use driver::PumpDriver;
pub use runner::JobContext;
