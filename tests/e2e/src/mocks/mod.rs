//! Misbehaving backends for failure-path journeys

use std::sync::Arc;
use std::time::Duration;

use mnemon_core::{
    Capabilities, MemoryRecord, MemoryStore, RecordFilter, ScoredRecord, StoreResult,
};

/// Wraps a store, sleeping before every call
///
/// Used to push a tier past the search deadline.
pub struct SlowStore {
    inner: Arc<dyn MemoryStore>,
    delay: Duration,
}

impl SlowStore {
    /// Wrap `inner`, delaying every call by `delay`
    pub fn new(inner: Arc<dyn MemoryStore>, delay: Duration) -> Self {
        Self { inner, delay }
    }

    fn stall(&self) {
        std::thread::sleep(self.delay);
    }
}

impl MemoryStore for SlowStore {
    fn put(&self, record: &MemoryRecord) -> StoreResult<()> {
        self.stall();
        self.inner.put(record)
    }

    fn get_by_id(&self, id: &str) -> StoreResult<MemoryRecord> {
        self.stall();
        self.inner.get_by_id(id)
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        self.stall();
        self.inner.delete(id)
    }

    fn list_by_filter(&self, filter: &RecordFilter) -> StoreResult<Vec<MemoryRecord>> {
        self.stall();
        self.inner.list_by_filter(filter)
    }

    fn count(&self) -> StoreResult<u64> {
        self.stall();
        self.inner.count()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn vector_search(&self, query: &[f32], k: usize) -> StoreResult<Vec<ScoredRecord>> {
        self.stall();
        self.inner.vector_search(query, k)
    }

    fn keyword_search(&self, query: &str, k: usize) -> StoreResult<Vec<ScoredRecord>> {
        self.stall();
        self.inner.keyword_search(query, k)
    }
}
