use thiserror::Error;

/// Errors raised while loading or validating engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A setting holds a value outside its allowed range.
    #[error("Invalid setting `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    /// The pipeline definition is structurally invalid.
    #[error("Invalid pipeline definition: {0}")]
    InvalidDefinition(String),

    /// Two enabled checkers share one name.
    #[error("Duplicate checker name `{checker}` in stage `{stage}`")]
    DuplicateChecker { stage: String, checker: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
}
