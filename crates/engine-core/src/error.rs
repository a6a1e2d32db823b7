use thiserror::Error;

/// Failure reported by a checker instead of a result.
#[derive(Error, Debug)]
pub enum CheckerError {
    #[error("Checker failed: {0}")]
    Failed(String),

    #[error("Checker does not support chunked validation")]
    StreamingUnsupported,

    #[error("Failed to read input: {0}")]
    Source(#[from] SourceError),

    #[error("Unexpected error: {0}")]
    Unexpected(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Range {start}..{end} is outside the addressable extent {extent}")]
    OutOfBounds { start: u64, end: u64, extent: u64 },

    #[error("Buffer holds {actual} bytes but the descriptor requires {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The request does not fit even with every resident chunk evicted.
    #[error("Cannot allocate {requested} bytes: budget is {max} bytes")]
    Exhausted { requested: u64, max: u64 },
}
