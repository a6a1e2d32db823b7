use engine_core::source::SourceDescriptor;
use std::ops::Range;

/// Splits the leading dimension of an input into ranges of roughly
/// `target_bytes` each. Trailing dimensions stay whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    extent: u64,
    rows_per_chunk: u64,
}

impl ChunkPlan {
    pub fn new(extent: u64, row_bytes: u64, target_bytes: u64) -> Self {
        let rows = if row_bytes == 0 {
            extent
        } else {
            target_bytes / row_bytes
        };
        Self {
            extent,
            rows_per_chunk: rows.clamp(1, extent.max(1)),
        }
    }

    pub fn for_descriptor(descriptor: &SourceDescriptor, target_bytes: u64) -> Self {
        Self::new(descriptor.leading_extent(), descriptor.row_bytes(), target_bytes)
    }

    pub fn extent(&self) -> u64 {
        self.extent
    }

    pub fn rows_per_chunk(&self) -> u64 {
        self.rows_per_chunk
    }

    pub fn chunk_count(&self) -> u64 {
        self.extent.div_ceil(self.rows_per_chunk)
    }

    /// Range covered by chunk `chunk_id`, if it exists.
    pub fn range(&self, chunk_id: u64) -> Option<Range<u64>> {
        let start = chunk_id.checked_mul(self.rows_per_chunk)?;
        if start >= self.extent {
            return None;
        }
        Some(start..(start + self.rows_per_chunk).min(self.extent))
    }

    /// `(chunk_id, range)` pairs in increasing order.
    pub fn ranges(&self) -> impl Iterator<Item = (u64, Range<u64>)> + '_ {
        (0..self.chunk_count()).filter_map(|id| self.range(id).map(|r| (id, r)))
    }
}
