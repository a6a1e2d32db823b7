use crate::{
    core::{
        identifiers::SessionId,
        value::{ValueMap, append_value},
    },
    execution::result::ValidationResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Metadata key under which the executor records every completed result.
pub const VALIDATION_RESULTS_KEY: &str = "validation_results";

/// Execution-scoped state for one pipeline run.
///
/// `metadata` is append-only: the stage executor is the only writer and it
/// never overwrites an existing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationContext {
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    metadata: ValueMap,
    pub configuration: ValueMap,
    pub started_at: DateTime<Utc>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self {
            session_id: SessionId::generate(),
            file_path: None,
            metadata: ValueMap::new(),
            configuration: ValueMap::new(),
            started_at: Utc::now(),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_configuration(mut self, configuration: ValueMap) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn metadata(&self) -> &ValueMap {
        &self.metadata
    }

    pub fn append_metadata(&mut self, key: &str, value: Value) {
        append_value(&mut self.metadata, key, value);
    }

    /// Records a finished result under `validation_results`.
    pub fn record_result(&mut self, result: &ValidationResult) {
        let entry = serde_json::to_value(result).unwrap_or_else(|err| {
            serde_json::json!({
                "checker_name": result.checker_name,
                "result_id": result.result_id,
                "serialization_error": err.to_string(),
            })
        });

        match self.metadata.get_mut(VALIDATION_RESULTS_KEY) {
            Some(Value::Array(items)) => items.push(entry),
            _ => append_value(&mut self.metadata, VALIDATION_RESULTS_KEY, Value::Array(vec![entry])),
        }
    }

    /// Number of results recorded so far.
    pub fn recorded_results(&self) -> usize {
        match self.metadata.get(VALIDATION_RESULTS_KEY) {
            Some(Value::Array(items)) => items.len(),
            _ => 0,
        }
    }
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self::new()
    }
}
