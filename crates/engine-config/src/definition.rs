use crate::error::ConfigError;
use model::PipelineStage;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path};
use tracing::debug;

/// Declarative pipeline: stages run in order, each with its own checkers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub stages: Vec<PipelineStage>,
}

impl PipelineDefinition {
    pub fn new(stages: Vec<PipelineStage>) -> Self {
        Self { stages }
    }

    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let definition: PipelineDefinition = serde_json::from_str(source)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading pipeline definition");
        let source = std::fs::read_to_string(path)?;
        Self::from_json_str(&source)
    }

    /// Structural checks that need no checker implementations: non-empty
    /// names, positive timeouts, and checker names unique across the pipeline.
    /// Dependency graphs are checked later, per stage, by the resolver.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut stage_names = HashSet::new();
        let mut checker_names = HashSet::new();

        for stage in &self.stages {
            if stage.name.trim().is_empty() {
                return Err(ConfigError::InvalidDefinition(
                    "stage name must not be empty".to_string(),
                ));
            }
            if !stage_names.insert(stage.name.as_str()) {
                return Err(ConfigError::InvalidDefinition(format!(
                    "duplicate stage name `{}`",
                    stage.name
                )));
            }
            if stage.timeout_ms == Some(0) {
                return Err(ConfigError::InvalidDefinition(format!(
                    "stage `{}` has a zero timeout",
                    stage.name
                )));
            }

            for spec in &stage.checkers {
                if spec.name.trim().is_empty() {
                    return Err(ConfigError::InvalidDefinition(format!(
                        "stage `{}` contains a checker without a name",
                        stage.name
                    )));
                }
                if !checker_names.insert(spec.name.as_str()) {
                    return Err(ConfigError::DuplicateChecker {
                        stage: stage.name.clone(),
                        checker: spec.name.clone(),
                    });
                }
                if spec.timeout_ms == Some(0) {
                    return Err(ConfigError::InvalidDefinition(format!(
                        "checker `{}` has a zero timeout",
                        spec.name
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn checker_count(&self) -> usize {
        self.stages.iter().map(|s| s.checkers.len()).sum()
    }
}
