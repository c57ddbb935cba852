use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scheduler::queue::DEFAULT_MAX_JOBS;

/// Scheduler-wide settings. Missing fields deserialize to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on registry records (pending, running and terminal).
    pub max_jobs: usize,
    /// How often a [`PumpDriver`](crate::worker::PumpDriver) calls `advance()`
    /// when nothing wakes it earlier.
    pub pump_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_jobs: DEFAULT_MAX_JOBS,
            pump_interval_ms: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn new(max_jobs: usize) -> Self {
        Self {
            max_jobs,
            ..Default::default()
        }
    }

    pub fn with_pump_interval_ms(mut self, pump_interval_ms: u64) -> Self {
        self.pump_interval_ms = pump_interval_ms;
        self
    }

    pub fn pump_interval(&self) -> Duration {
        Duration::from_millis(self.pump_interval_ms.max(1))
    }
}

/// Parameters of the synthetic load run by `jobslot simulate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Total jobs, spread round-robin over the four priorities.
    pub jobs: usize,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    /// Independent chance, per attempt, that a job body fails.
    pub failure_rate: f64,
    pub max_attempts: u32,
    pub timeout_ms: Option<u64>,
    /// Fixed seed for reproducible runs. `None` draws from OS entropy.
    pub seed: Option<u64>,
    /// How often the drain loop samples registry stats.
    pub poll_interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            jobs: 100,
            min_duration_ms: 25,
            max_duration_ms: 100,
            failure_rate: 0.1,
            max_attempts: 3,
            timeout_ms: Some(1_000),
            seed: None,
            poll_interval_ms: 10,
        }
    }
}

impl SimulationConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.min_duration_ms > self.max_duration_ms {
            return Err(format!(
                "min duration {}ms exceeds max duration {}ms",
                self.min_duration_ms, self.max_duration_ms
            ));
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(format!(
                "failure rate {} is outside [0, 1]",
                self.failure_rate
            ));
        }
        if self.max_attempts == 0 {
            return Err("max attempts must be at least 1".to_string());
        }
        Ok(())
    }
}
