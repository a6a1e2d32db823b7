use model::{
    ChunkMetadata, ResultStatus, SessionId, TemporalRange, ValidationIssue, ValidationResult,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

pub const TEMPORAL_OVERLAP_CHECK: &str = "temporal_overlap";
pub const TEMPORAL_GAP_CHECK: &str = "temporal_gap";
pub const SCHEMA_DRIFT_CHECK: &str = "schema_drift";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub chunk_id: u64,
    pub start: u64,
    pub end: u64,
    pub is_valid: bool,
    pub issue_count: usize,
    pub execution_time_ms: u64,
}

/// Everything carried from one chunk to the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalState {
    pub total_chunks: u64,
    /// Temporal range of the most recent chunk that declared one.
    pub last_temporal: Option<TemporalRange>,
    /// First fingerprint seen per dataset.
    pub fingerprints: BTreeMap<String, String>,
    pub chunk_summaries: Vec<ChunkSummary>,
}

impl GlobalState {
    pub fn total_execution_time_ms(&self) -> u64 {
        self.chunk_summaries.iter().map(|c| c.execution_time_ms).sum()
    }

    pub fn valid_chunks(&self) -> usize {
        self.chunk_summaries.iter().filter(|c| c.is_valid).count()
    }
}

/// Cross-chunk checks for one stream. Chunks must be observed in chunk-id
/// order.
#[derive(Debug, Clone)]
pub struct ProgressiveValidator {
    checker_name: String,
    session_id: SessionId,
    tolerance: f64,
    state: GlobalState,
}

impl ProgressiveValidator {
    pub fn new(checker_name: impl Into<String>, session_id: SessionId, tolerance: f64) -> Self {
        Self {
            checker_name: checker_name.into(),
            session_id,
            tolerance,
            state: GlobalState::default(),
        }
    }

    /// Resumes from a previously captured state.
    pub fn with_state(mut self, state: GlobalState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> &GlobalState {
        &self.state
    }

    /// Adds cross-chunk issues for `chunk_id` to `result` and folds the chunk
    /// into the running state. Temporal ranges are half-open, so contiguous
    /// chunks have `current.start == previous.end` whatever the sample step.
    pub fn observe(&mut self, chunk_id: u64, metadata: &ChunkMetadata, result: &mut ValidationResult) {
        let location = chunk_location(&metadata.dataset, chunk_id);

        if let Some(current) = metadata.temporal {
            if let Some(previous) = self.state.last_temporal {
                if previous.end > current.start {
                    result.push_issue(
                        ValidationIssue::warning(
                            TEMPORAL_OVERLAP_CHECK,
                            format!(
                                "Chunk {chunk_id} starts at {} before the previous chunk ends at {}",
                                current.start, previous.end
                            ),
                            location.as_str(),
                        )
                        .with_checker(self.checker_name.as_str())
                        .with_detail("previous_end", previous.end)
                        .with_detail("current_start", current.start),
                    );
                } else if current.start - previous.end > self.tolerance {
                    result.push_issue(
                        ValidationIssue::info(
                            TEMPORAL_GAP_CHECK,
                            format!(
                                "Gap of {} between chunk {chunk_id} and the previous chunk",
                                current.start - previous.end
                            ),
                            location.as_str(),
                        )
                        .with_checker(self.checker_name.as_str())
                        .with_detail("previous_end", previous.end)
                        .with_detail("current_start", current.start),
                    );
                }
            }
            self.state.last_temporal = Some(current);
        }

        match self.state.fingerprints.get(&metadata.dataset) {
            Some(expected) if *expected != metadata.fingerprint => {
                result.push_issue(
                    ValidationIssue::warning(
                        SCHEMA_DRIFT_CHECK,
                        format!(
                            "Structure of '{}' changed in chunk {chunk_id}",
                            metadata.dataset
                        ),
                        location.as_str(),
                    )
                    .with_checker(self.checker_name.as_str())
                    .with_detail("expected", expected.as_str())
                    .with_detail("found", metadata.fingerprint.as_str()),
                );
            }
            Some(_) => {}
            None => {
                self.state
                    .fingerprints
                    .insert(metadata.dataset.clone(), metadata.fingerprint.clone());
            }
        }

        self.state.total_chunks += 1;
        self.state.chunk_summaries.push(ChunkSummary {
            chunk_id,
            start: metadata.start,
            end: metadata.end,
            is_valid: result.is_valid(),
            issue_count: result.issues().len(),
            execution_time_ms: result.execution_time_ms,
        });
    }

    /// End-of-stream summary. Valid iff every chunk was valid.
    pub fn finish(self, final_usage: u64, max_memory_bytes: u64, peak_usage: u64) -> ValidationResult {
        let efficiency = if max_memory_bytes == 0 {
            1.0
        } else {
            1.0 - final_usage as f64 / max_memory_bytes as f64
        };
        let state = self.state;
        let valid_chunks = state.valid_chunks();
        let total_time = state.total_execution_time_ms();

        let mut result = ValidationResult::new(self.checker_name, self.session_id)
            .with_summary("streamed", true)
            .with_summary("total_chunks", state.total_chunks)
            .with_summary("valid_chunks", valid_chunks as u64)
            .with_summary("total_execution_time_ms", total_time)
            .with_summary("peak_memory_bytes", peak_usage)
            .with_summary("streaming_efficiency", efficiency)
            .with_summary("fingerprints", json!(state.fingerprints))
            .with_metric("streaming_efficiency", efficiency);
        result.set_valid(valid_chunks as u64 == state.total_chunks);
        result.execution_time_ms = total_time;
        result.finish(ResultStatus::Completed);
        result
    }
}

pub fn chunk_location(dataset: &str, chunk_id: u64) -> String {
    format!("{dataset}.chunk_{chunk_id}")
}
