use thiserror::Error;

/// Reasons a stage cannot be scheduled. Raised before anything runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Dependency cycle in stage '{stage}' among: {}", .remaining.join(", "))]
    Cycle {
        stage: String,
        remaining: Vec<String>,
    },

    #[error("Checker '{checker}' in stage '{stage}' depends on unknown checker '{dependency}'")]
    UnknownDependency {
        stage: String,
        checker: String,
        dependency: String,
    },

    #[error("Checker '{checker}' is declared more than once in stage '{stage}'")]
    DuplicateChecker { stage: String, checker: String },

    #[error("No implementation registered as '{implementation}' for checker '{checker}'")]
    UnknownImplementation {
        checker: String,
        implementation: String,
    },
}
