//! Scheduler configuration

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Max operations executing at once
    #[serde(rename = "max-concurrent", default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Pause after a slot frees up before the scheduler tries to refill it
    #[serde(rename = "dispatch-delay-ms", default = "default_dispatch_delay_ms")]
    pub dispatch_delay_ms: u64,

    /// Per-operation timeout; unset means operations may run forever
    #[serde(rename = "operation-timeout-ms", default)]
    pub operation_timeout_ms: Option<u64>,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_dispatch_delay_ms() -> u64 {
    200
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            dispatch_delay_ms: default_dispatch_delay_ms(),
            operation_timeout_ms: None,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration before spawning a scheduler
    ///
    /// With no slots nothing is ever dispatched and every outcome waits forever.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(eyre::eyre!("max-concurrent must be at least 1"));
        }
        Ok(())
    }

    /// Get the inter-dispatch delay as a Duration
    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.dispatch_delay_ms)
    }

    /// Get the operation timeout as a Duration, if one is configured
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}
