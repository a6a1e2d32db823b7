use engine_config::ConfigError;
use engine_processing::ResolveError;
use thiserror::Error;

/// Raised while building a pipeline. Once a pipeline exists, running it
/// cannot fail; problems are reported as issues instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid pipeline configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Stage '{stage}' cannot be scheduled: {source}")]
    Resolve {
        stage: String,
        #[source]
        source: ResolveError,
    },

    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}
