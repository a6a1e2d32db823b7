use crate::{
    invoke::Invoker,
    stream::{
        planner::ChunkPlan,
        progressive::{ProgressiveValidator, chunk_location},
    },
};
use engine_config::StreamSettings;
use engine_core::{
    checker::{Checker, CheckerContext},
    memory::MemoryManager,
    metrics::Metrics,
    source::DataSource,
};
use futures::{StreamExt, stream};
use model::{ChunkMetadata, StreamChunk, ValidationIssue, ValidationResult};
use std::{ops::Range, pin::pin, sync::Arc};
use tracing::{info, warn};

pub const RESOURCE_EXHAUSTION_CHECK: &str = "resource_exhaustion";
pub const CHUNK_READ_CHECK: &str = "chunk_read_failure";

/// Drives one streaming checker over a chunked input within a memory budget.
#[derive(Debug)]
pub struct StreamProcessor {
    target_chunk_bytes: u64,
    max_in_flight: usize,
    temporal_tolerance: f64,
    memory: Arc<MemoryManager>,
    metrics: Metrics,
}

impl StreamProcessor {
    pub fn new(settings: &StreamSettings, metrics: Metrics) -> Self {
        Self {
            target_chunk_bytes: settings.target_chunk_bytes,
            max_in_flight: settings.max_in_flight_chunks.max(1),
            temporal_tolerance: settings.temporal_tolerance,
            memory: Arc::new(MemoryManager::new(settings.max_memory_bytes)),
            metrics,
        }
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn plan(&self, source: &dyn DataSource) -> ChunkPlan {
        ChunkPlan::for_descriptor(source.descriptor(), self.target_chunk_bytes)
    }

    /// Validates every chunk in chunk-id order and returns the per-chunk
    /// results followed by one summary result.
    pub async fn process(
        &self,
        source: &Arc<dyn DataSource>,
        checker: &Arc<dyn Checker>,
        invoker: &Invoker,
        base: &CheckerContext,
    ) -> Vec<ValidationResult> {
        let plan = self.plan(source.as_ref());
        let descriptor = source.descriptor();
        info!(
            checker = invoker.name(),
            dataset = %descriptor.dataset,
            chunks = plan.chunk_count(),
            rows_per_chunk = plan.rows_per_chunk(),
            "Starting chunked validation"
        );

        let mut progressive = ProgressiveValidator::new(
            invoker.name(),
            base.context().session_id.clone(),
            self.temporal_tolerance,
        );
        let mut results = Vec::with_capacity(plan.chunk_count() as usize + 1);

        {
            let mut chunks = pin!(
                stream::iter(plan.ranges())
                    .map(|(chunk_id, range)| {
                        self.process_chunk(source, checker, invoker, base, chunk_id, range)
                    })
                    .buffered(self.max_in_flight)
            );

            while let Some((chunk_id, metadata, mut result)) = chunks.next().await {
                progressive.observe(chunk_id, &metadata, &mut result);
                results.push(result);

                if invoker.cancellation().is_cancelled() {
                    warn!(checker = invoker.name(), chunk_id, "Run cancelled, stopping stream");
                    break;
                }
            }
        }

        let summary = progressive.finish(
            self.memory.current_usage(),
            self.memory.max_memory_bytes(),
            self.memory.peak_usage(),
        );
        info!(
            checker = invoker.name(),
            chunks = results.len(),
            evictions = self.memory.eviction_count(),
            valid = summary.is_valid(),
            "Chunked validation finished"
        );
        results.push(summary);
        results
    }

    async fn process_chunk(
        &self,
        source: &Arc<dyn DataSource>,
        checker: &Arc<dyn Checker>,
        invoker: &Invoker,
        base: &CheckerContext,
        chunk_id: u64,
        range: Range<u64>,
    ) -> (u64, ChunkMetadata, ValidationResult) {
        let descriptor = source.descriptor();
        let metadata = ChunkMetadata {
            source: descriptor.path.clone(),
            dataset: descriptor.dataset.clone(),
            start: range.start,
            end: range.end,
            shape: descriptor.chunk_shape(range.end - range.start),
            dtype: descriptor.dtype.clone(),
            temporal: source.temporal_range(range.clone()),
            fingerprint: source.fingerprint(range.clone()),
        };
        let location = chunk_location(&metadata.dataset, chunk_id);
        let size = descriptor.row_bytes().saturating_mul(range.end - range.start);
        let session = base.context().session_id.clone();

        let allocation = match self.memory.allocate(chunk_id, size) {
            Ok(allocation) => allocation,
            Err(err) => {
                warn!(checker = invoker.name(), chunk_id, error = %err, "Chunk allocation failed");
                self.metrics.increment_allocation_failures();
                let issue = ValidationIssue::critical(
                    RESOURCE_EXHAUSTION_CHECK,
                    format!("Chunk {chunk_id} needs {size} bytes: {err}"),
                    location.as_str(),
                )
                .with_checker(invoker.name())
                .with_remediation("Lower the target chunk size or raise the memory budget");
                let result = ValidationResult::failed(invoker.name(), session, issue)
                    .with_summary("chunk_id", chunk_id);
                return (chunk_id, metadata, result);
            }
        };
        if !allocation.evicted().is_empty() {
            self.metrics.increment_evictions(allocation.evicted().len() as u64);
        }

        let data = match source.read(range.clone()).await {
            Ok(data) => data,
            Err(err) => {
                warn!(checker = invoker.name(), chunk_id, error = %err, "Chunk read failed");
                let issue = ValidationIssue::critical(
                    CHUNK_READ_CHECK,
                    format!("Failed to read chunk {chunk_id}: {err}"),
                    location.as_str(),
                )
                .with_checker(invoker.name());
                let result = ValidationResult::failed(invoker.name(), session, issue)
                    .with_summary("chunk_id", chunk_id);
                return (chunk_id, metadata, result);
            }
        };

        let chunk = StreamChunk::new(chunk_id, data, metadata.clone());
        let bytes = chunk.size_bytes;
        let checker = Arc::clone(checker);
        let result = invoker
            .invoke(base, &location, move |ctx| {
                let checker = Arc::clone(&checker);
                let chunk = chunk.clone();
                Box::pin(async move { checker.validate_chunk(chunk, &ctx).await })
            })
            .await;

        drop(allocation);
        self.metrics.record_chunk(bytes);

        let result = result
            .with_summary("chunk_id", chunk_id)
            .with_summary("start", range.start)
            .with_summary("end", range.end);
        (chunk_id, metadata, result)
    }
}
