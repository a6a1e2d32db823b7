use super::invalid;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout and retry defaults for checker invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Used when neither the checker nor its stage declares a timeout.
    pub default_timeout_ms: u64,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: 300_000,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 2_000,
        }
    }
}

impl ExecutorSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    /// Settings with no backoff between attempts.
    pub fn without_backoff(mut self) -> Self {
        self.retry_base_delay_ms = 0;
        self.retry_max_delay_ms = 0;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout_ms == 0 {
            return Err(invalid("executor.default_timeout_ms", "must be greater than zero"));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(invalid(
                "executor.retry_max_delay_ms",
                "must not be smaller than executor.retry_base_delay_ms",
            ));
        }
        Ok(())
    }
}
