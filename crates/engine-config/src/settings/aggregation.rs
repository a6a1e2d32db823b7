use super::invalid;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Deduplication thresholds and scoring weights. The defaults are starting
/// points, not calibrated values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationSettings {
    /// Minimum Jaccard similarity of both location and message for two issues to merge.
    pub similarity_threshold: f64,
    pub critical_weight: f64,
    pub warning_weight: f64,
    /// Checkers slower than this get a performance recommendation.
    pub slow_checker_threshold_ms: u64,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.8,
            critical_weight: 0.3,
            warning_weight: 0.1,
            slow_checker_threshold_ms: 30_000,
        }
    }
}

impl AggregationSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(invalid(
                "aggregation.similarity_threshold",
                format!("must be within [0, 1], got {}", self.similarity_threshold),
            ));
        }
        for (name, weight) in [
            ("aggregation.critical_weight", self.critical_weight),
            ("aggregation.warning_weight", self.warning_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(invalid(name, format!("must be a non-negative number, got {weight}")));
            }
        }
        Ok(())
    }
}
