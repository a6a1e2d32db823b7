pub mod planner;
pub mod processor;
pub mod progressive;

pub use planner::ChunkPlan;
pub use processor::StreamProcessor;
pub use progressive::{ChunkSummary, GlobalState, ProgressiveValidator};
