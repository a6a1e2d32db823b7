pub mod checker;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod source;
