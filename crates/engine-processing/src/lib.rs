pub mod aggregate;
pub mod error;
pub mod executor;
pub mod invoke;
pub mod resolver;
pub mod stream;

pub use aggregate::{ResultsAggregator, aggregate};
pub use error::ResolveError;
pub use executor::{StageExecutor, StagePlan, StageReport};
