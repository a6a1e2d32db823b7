use super::invalid;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Chunking and memory budget for streamed validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Byte budget a single chunk should approach.
    pub target_chunk_bytes: u64,
    /// Upper bound on memory tracked for resident chunks of one stream.
    pub max_memory_bytes: u64,
    /// Inputs larger than this are streamed to checkers that support it.
    pub streaming_threshold_bytes: u64,
    /// Chunks validated concurrently within one stream.
    pub max_in_flight_chunks: usize,
    /// Largest gap between consecutive chunks' time ranges still treated as contiguous.
    pub temporal_tolerance: f64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            target_chunk_bytes: 8 * MIB,
            max_memory_bytes: 512 * MIB,
            streaming_threshold_bytes: 64 * MIB,
            max_in_flight_chunks: 1,
            temporal_tolerance: 1.0,
        }
    }
}

impl StreamSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_chunk_bytes == 0 {
            return Err(invalid("stream.target_chunk_bytes", "must be greater than zero"));
        }
        if self.max_memory_bytes == 0 {
            return Err(invalid("stream.max_memory_bytes", "must be greater than zero"));
        }
        if self.max_in_flight_chunks == 0 {
            return Err(invalid("stream.max_in_flight_chunks", "must be at least 1"));
        }
        if !self.temporal_tolerance.is_finite() || self.temporal_tolerance < 0.0 {
            return Err(invalid(
                "stream.temporal_tolerance",
                format!("must be a non-negative number, got {}", self.temporal_tolerance),
            ));
        }
        Ok(())
    }
}
