use crate::core::value::ValueMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeSet, time::Duration};

/// Concurrency policy for the checkers of one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
    Conditional,
}

/// Declares one checker's place in a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckerSpec {
    /// Unique within the pipeline; used as `checker_name` on every result.
    pub name: String,
    /// Registry key of the implementation to run.
    pub checker: String,
    #[serde(default)]
    pub config: ValueMap,
    /// Checkers that must complete with a valid result first.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_count: u32,
}

fn default_enabled() -> bool {
    true
}

impl CheckerSpec {
    /// Spec whose name doubles as the registry key.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            checker: name.clone(),
            name,
            config: ValueMap::new(),
            dependencies: BTreeSet::new(),
            enabled: true,
            timeout_ms: None,
            retry_count: 0,
        }
    }

    pub fn with_checker(mut self, checker: impl Into<String>) -> Self {
        self.checker = checker.into();
        self
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.insert(dependency.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Group of checkers sharing one execution policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub name: String,
    #[serde(default)]
    pub checkers: Vec<CheckerSpec>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default = "default_continue_on_failure")]
    pub continue_on_failure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_continue_on_failure() -> bool {
    true
}

impl PipelineStage {
    pub fn new(name: impl Into<String>, execution_mode: ExecutionMode) -> Self {
        Self {
            name: name.into(),
            checkers: Vec::new(),
            execution_mode,
            continue_on_failure: true,
            timeout_ms: None,
        }
    }

    pub fn with_checker(mut self, spec: CheckerSpec) -> Self {
        self.checkers.push(spec);
        self
    }

    /// A critical issue in this stage prevents later stages from running.
    pub fn stop_on_failure(mut self) -> Self {
        self.continue_on_failure = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn enabled_checkers(&self) -> impl Iterator<Item = &CheckerSpec> {
        self.checkers.iter().filter(|c| c.enabled)
    }
}
