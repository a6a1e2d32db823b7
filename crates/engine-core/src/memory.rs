use crate::error::MemoryError;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tracing::debug;

#[derive(Debug, Default)]
struct AllocationTable {
    /// chunk id -> bytes held
    resident: BTreeMap<u64, u64>,
    current: u64,
    peak: u64,
    evictions: u64,
}

/// Tracks chunk memory against a fixed budget.
///
/// Allocation, eviction and release all happen under one lock, so the
/// budget can never be over-committed by concurrent chunks of a stream.
#[derive(Debug)]
pub struct MemoryManager {
    max_memory_bytes: u64,
    table: Mutex<AllocationTable>,
}

impl MemoryManager {
    pub fn new(max_memory_bytes: u64) -> Self {
        Self {
            max_memory_bytes,
            table: Mutex::new(AllocationTable::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AllocationTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves `bytes` for `chunk_id`, evicting the oldest resident chunks
    /// when headroom is short. The reservation is released when the returned
    /// guard is dropped.
    ///
    /// Eviction only releases accounting. A chunk evicted while its
    /// validation is still in flight keeps its buffer until that invocation
    /// returns, so actual resident memory can briefly exceed
    /// `max_memory_bytes` by the evicted in-flight chunks. With one chunk in
    /// flight this never happens.
    pub fn allocate(
        self: &Arc<Self>,
        chunk_id: u64,
        bytes: u64,
    ) -> Result<Allocation, MemoryError> {
        if bytes > self.max_memory_bytes {
            return Err(MemoryError::Exhausted {
                requested: bytes,
                max: self.max_memory_bytes,
            });
        }

        let mut table = self.lock();

        if let Some(previous) = table.resident.remove(&chunk_id) {
            table.current -= previous;
        }

        let mut evicted = Vec::new();
        while table.current + bytes > self.max_memory_bytes {
            let Some((oldest, held)) = table.resident.pop_first() else {
                break;
            };
            table.current -= held;
            table.evictions += 1;
            evicted.push(oldest);
        }

        table.resident.insert(chunk_id, bytes);
        table.current += bytes;
        table.peak = table.peak.max(table.current);

        if !evicted.is_empty() {
            debug!(chunk_id, evicted = ?evicted, "Evicted resident chunks");
        }

        Ok(Allocation {
            manager: Arc::clone(self),
            chunk_id,
            bytes,
            evicted,
        })
    }

    /// Releases whatever `chunk_id` holds. Releasing an unknown or
    /// already-evicted chunk is a no-op.
    pub fn free(&self, chunk_id: u64) -> u64 {
        let mut table = self.lock();
        match table.resident.remove(&chunk_id) {
            Some(held) => {
                table.current -= held;
                held
            }
            None => 0,
        }
    }

    pub fn current_usage(&self) -> u64 {
        self.lock().current
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_bytes
    }

    pub fn peak_usage(&self) -> u64 {
        self.lock().peak
    }

    pub fn eviction_count(&self) -> u64 {
        self.lock().evictions
    }

    pub fn resident_chunks(&self) -> Vec<u64> {
        self.lock().resident.keys().copied().collect()
    }
}

/// Reservation held for one chunk while it is being validated.
#[derive(Debug)]
pub struct Allocation {
    manager: Arc<MemoryManager>,
    chunk_id: u64,
    bytes: u64,
    evicted: Vec<u64>,
}

impl Allocation {
    pub fn chunk_id(&self) -> u64 {
        self.chunk_id
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Chunks evicted to make room for this one, oldest first.
    pub fn evicted(&self) -> &[u64] {
        &self.evicted
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.manager.free(self.chunk_id);
    }
}
