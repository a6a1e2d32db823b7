use crate::error::ConfigError;
use aggregation::AggregationSettings;
use executor::ExecutorSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use stream::StreamSettings;
use tracing::debug;

pub mod aggregation;
pub mod executor;
pub mod stream;

/// Tunables for one engine instance. Every field has a default, so a partial
/// JSON document (or `{}`) is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub stream: StreamSettings,
    pub executor: ExecutorSettings,
    pub aggregation: AggregationSettings,
}

impl EngineSettings {
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let settings: EngineSettings = serde_json::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading engine settings");
        let source = std::fs::read_to_string(path)?;
        Self::from_json_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stream.validate()?;
        self.executor.validate()?;
        self.aggregation.validate()?;
        Ok(())
    }
}

pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidSetting {
        name,
        reason: reason.into(),
    }
}
