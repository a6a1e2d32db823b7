use async_trait::async_trait;
use engine_config::EngineSettings;
use engine_core::{
    checker::{Checker, CheckerCapabilities, CheckerContext},
    error::CheckerError,
    source::{InMemorySource, SourceDescriptor, ValidationInput},
};
use model::{StreamChunk, ValidationIssue, ValidationResult};
use std::{
    ops::Range,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Shared log of checker names in the order they ran.
pub type RunLog = Arc<Mutex<Vec<String>>>;

pub fn run_log() -> RunLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Settings with no retry backoff so tests stay fast.
pub fn fast_settings() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.executor = settings.executor.without_backoff();
    settings
}

/// One-dimensional input of `elements` values, `element_size` bytes each,
/// with a unit-step time axis.
pub fn signal_input(elements: u64, element_size: u64) -> ValidationInput {
    let descriptor = SourceDescriptor::new("signal", vec![elements], "f64", element_size);
    ValidationInput::from_source(InMemorySource::zeroed(descriptor).with_time_axis(0.0, 1.0))
}

/// Reports a fixed list of issues and appends its name to a run log.
pub struct StaticChecker {
    name: String,
    issues: Vec<ValidationIssue>,
    log: Option<RunLog>,
}

impl StaticChecker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            issues: Vec::new(),
            log: None,
        }
    }

    pub fn reporting(mut self, issue: ValidationIssue) -> Self {
        self.issues.push(issue);
        self
    }

    pub fn logging_to(mut self, log: &RunLog) -> Self {
        self.log = Some(Arc::clone(log));
        self
    }
}

#[async_trait]
impl Checker for StaticChecker {
    fn capabilities(&self) -> CheckerCapabilities {
        CheckerCapabilities::new(self.name.clone())
    }

    async fn validate(
        &self,
        _input: &ValidationInput,
        ctx: &CheckerContext,
    ) -> Result<ValidationResult, CheckerError> {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(ctx.checker_name().to_string());
        }
        let mut result = ctx.new_result();
        result.extend_issues(self.issues.iter().cloned());
        Ok(result)
    }
}

/// Never returns; ignores cancellation.
pub struct HangingChecker {
    pub calls: Arc<AtomicUsize>,
}

impl HangingChecker {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Checker for HangingChecker {
    fn capabilities(&self) -> CheckerCapabilities {
        CheckerCapabilities::new("hanging")
    }

    async fn validate(
        &self,
        _input: &ValidationInput,
        _ctx: &CheckerContext,
    ) -> Result<ValidationResult, CheckerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        loop {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
        }
    }
}

/// Fails with an error, or panics when `panics` is set.
pub struct BrokenChecker {
    pub panics: bool,
}

#[async_trait]
impl Checker for BrokenChecker {
    fn capabilities(&self) -> CheckerCapabilities {
        CheckerCapabilities::new(if self.panics { "panicking" } else { "failing" })
    }

    async fn validate(
        &self,
        _input: &ValidationInput,
        _ctx: &CheckerContext,
    ) -> Result<ValidationResult, CheckerError> {
        if self.panics {
            panic!("index out of range in header parser");
        }
        Err(CheckerError::Failed("could not parse header".into()))
    }
}

/// Streaming checker recording each chunk it receives. Reports a critical
/// issue for chunk ids listed in `reject`.
pub struct ChunkRecorder {
    pub chunks: Arc<Mutex<Vec<(u64, Range<u64>, u64)>>>,
    pub reject: Vec<u64>,
}

impl ChunkRecorder {
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(Mutex::new(Vec::new())),
            reject: Vec::new(),
        }
    }
}

#[async_trait]
impl Checker for ChunkRecorder {
    fn capabilities(&self) -> CheckerCapabilities {
        CheckerCapabilities::new("chunk_recorder").streaming()
    }

    async fn validate(
        &self,
        _input: &ValidationInput,
        ctx: &CheckerContext,
    ) -> Result<ValidationResult, CheckerError> {
        Ok(ctx.new_result().with_summary("whole_input", true))
    }

    async fn validate_chunk(
        &self,
        chunk: StreamChunk,
        ctx: &CheckerContext,
    ) -> Result<ValidationResult, CheckerError> {
        self.chunks
            .lock()
            .unwrap()
            .push((chunk.chunk_id, chunk.metadata.range(), chunk.size_bytes));

        let mut result = ctx.new_result();
        if self.reject.contains(&chunk.chunk_id) {
            result.push_issue(ValidationIssue::critical(
                "value_range",
                format!("chunk {} holds out-of-range samples", chunk.chunk_id),
                format!("{}.chunk_{}", chunk.metadata.dataset, chunk.chunk_id),
            ));
        }
        Ok(result)
    }
}
