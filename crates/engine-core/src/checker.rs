use crate::{error::CheckerError, source::ValidationInput};
use async_trait::async_trait;
use model::{StreamChunk, ValidationContext, ValidationResult, ValueMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What a checker can do, and which configuration keys it reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckerCapabilities {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Implements `validate_chunk`.
    pub streaming: bool,
    #[serde(default)]
    pub config_keys: Vec<String>,
}

impl CheckerCapabilities {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_config_key(mut self, key: impl Into<String>) -> Self {
        self.config_keys.push(key.into());
        self
    }
}

/// Pluggable data-quality check.
///
/// Implementations must not write to shared state; anything worth keeping
/// goes into the returned result. Errors and panics are turned into critical
/// issues by the executor.
#[async_trait]
pub trait Checker: Send + Sync + 'static {
    fn capabilities(&self) -> CheckerCapabilities;

    async fn validate(
        &self,
        input: &ValidationInput,
        ctx: &CheckerContext,
    ) -> Result<ValidationResult, CheckerError>;

    /// Validates one chunk of a streamed input. Only called when
    /// `capabilities().streaming` is set.
    async fn validate_chunk(
        &self,
        _chunk: StreamChunk,
        _ctx: &CheckerContext,
    ) -> Result<ValidationResult, CheckerError> {
        Err(CheckerError::StreamingUnsupported)
    }
}

/// Read-only view a checker gets for one invocation attempt.
#[derive(Debug, Clone)]
pub struct CheckerContext {
    checker_name: Arc<str>,
    context: Arc<ValidationContext>,
    prior_results: Arc<Vec<ValidationResult>>,
    config: Arc<ValueMap>,
    attempt: usize,
    cancel: CancellationToken,
}

impl CheckerContext {
    pub fn new(
        checker_name: impl Into<String>,
        context: Arc<ValidationContext>,
        prior_results: Arc<Vec<ValidationResult>>,
        config: ValueMap,
    ) -> Self {
        Self {
            checker_name: Arc::from(checker_name.into()),
            context,
            prior_results,
            config: Arc::new(config),
            attempt: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Copy for a specific attempt with its own cancellation token.
    pub fn for_attempt(&self, attempt: usize, cancel: CancellationToken) -> Self {
        Self {
            attempt,
            cancel,
            ..self.clone()
        }
    }

    pub fn checker_name(&self) -> &str {
        &self.checker_name
    }

    pub fn context(&self) -> &ValidationContext {
        &self.context
    }

    /// Results completed before this invocation started.
    pub fn prior_results(&self) -> &[ValidationResult] {
        &self.prior_results
    }

    pub fn results_for<'a>(&'a self, checker: &'a str) -> impl Iterator<Item = &'a ValidationResult> + 'a {
        self.prior_results
            .iter()
            .filter(move |r| r.checker_name == checker)
    }

    pub fn config(&self) -> &ValueMap {
        &self.config
    }

    /// Zero-based attempt number.
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Checkers doing long work should poll this and stop early.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Empty result bound to this checker and session.
    pub fn new_result(&self) -> ValidationResult {
        ValidationResult::new(self.checker_name.to_string(), self.context.session_id.clone())
    }
}
