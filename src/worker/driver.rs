use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::scheduler::Scheduler;

/// Calls [`Scheduler::advance`] on a fixed cadence, and right away whenever a
/// job is submitted or the slot is released.
#[derive(Debug, Clone)]
pub struct PumpDriver {
    scheduler: Scheduler,
    interval: Duration,
}

impl PumpDriver {
    pub fn new(scheduler: Scheduler) -> Self {
        let interval = scheduler.config().pump_interval();
        Self {
            scheduler,
            interval,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Run until `cancel` fires or the scheduler is shut down.
    pub async fn run(self, cancel: CancellationToken) {
        let wakeup = self.scheduler.wakeup();
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Pump driver started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Pump driver cancelled");
                    break;
                }
                _ = interval.tick() => {}
                _ = wakeup.notified() => {}
            }

            if self.scheduler.is_shut_down().await {
                tracing::info!("Scheduler shut down, pump driver exiting");
                break;
            }
            if let Some(job_id) = self.scheduler.advance().await {
                tracing::debug!(job_id = %job_id, "Pump driver started job");
            }
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
