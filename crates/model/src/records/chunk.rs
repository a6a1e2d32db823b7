use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{ops::Range, path::PathBuf};

/// Declared coverage of a chunk along the time axis, half-open: `end` is
/// where the next contiguous chunk starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalRange {
    pub start: f64,
    pub end: f64,
}

impl TemporalRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// Describes where a chunk comes from and what it looks like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Logical dataset the chunk belongs to.
    pub dataset: String,
    /// First element (inclusive) along the leading dimension.
    pub start: u64,
    /// Last element (exclusive) along the leading dimension.
    pub end: u64,
    /// Shape of this chunk; the leading entry is `end - start`.
    pub shape: Vec<u64>,
    pub dtype: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalRange>,
    /// Structural signature (element type and trailing shape).
    pub fingerprint: String,
}

impl ChunkMetadata {
    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One addressable slice of a large input. Owned by exactly one checker
/// invocation at a time.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub chunk_id: u64,
    pub data: Bytes,
    pub metadata: ChunkMetadata,
    pub size_bytes: u64,
}

impl StreamChunk {
    pub fn new(chunk_id: u64, data: Bytes, metadata: ChunkMetadata) -> Self {
        let size_bytes = data.len() as u64;
        Self {
            chunk_id,
            data,
            metadata,
            size_bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
