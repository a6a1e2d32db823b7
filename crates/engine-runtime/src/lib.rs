pub mod error;
pub mod logging;
pub mod pipeline;
pub mod registry;

pub use error::PipelineError;
pub use logging::init_tracing;
pub use pipeline::{Pipeline, PipelineOutcome};
pub use registry::CheckerRegistry;
