pub mod definition;
pub mod error;
pub mod settings;

pub use definition::PipelineDefinition;
pub use error::ConfigError;
pub use settings::{
    EngineSettings, aggregation::AggregationSettings, executor::ExecutorSettings,
    stream::StreamSettings,
};
