pub mod core;
pub mod execution;
pub mod records;
pub mod report;

pub use core::{
    identifiers::SessionId,
    issue::{Severity, ValidationIssue},
    value::ValueMap,
};
pub use execution::{
    context::ValidationContext,
    pipeline::{CheckerSpec, ExecutionMode, PipelineStage},
    result::{ResultStatus, ValidationResult},
};
pub use records::chunk::{ChunkMetadata, StreamChunk, TemporalRange};
pub use report::aggregated::AggregatedResult;
