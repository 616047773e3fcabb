//! In-process reference backend
//!
//! Serves as the hot and warm reference implementation and as the workhorse
//! of the test suite. Vector search is brute-force cosine; keyword search is
//! token overlap. An availability toggle lets tests exercise the
//! unavailable-tier paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::embedding::{cosine_similarity, relevance_from_cosine};
use crate::memory::MemoryRecord;

use super::{
    Capabilities, DurabilityClass, MemoryStore, RecordFilter, ScoredRecord, StoreError,
    StoreResult,
};

/// In-memory map store
pub struct MemStore {
    records: RwLock<HashMap<String, MemoryRecord>>,
    capabilities: Capabilities,
    available: AtomicBool,
    name: &'static str,
}

impl MemStore {
    /// Create a store with explicit capabilities
    pub fn new(name: &'static str, capabilities: Capabilities) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            capabilities,
            available: AtomicBool::new(true),
            name,
        }
    }

    /// Hot-tier reference: session durability, fastest latency
    pub fn hot() -> Self {
        Self::new(
            "hot",
            Capabilities {
                supports_vector_search: false,
                typical_latency_ms: 1,
                durability_class: DurabilityClass::Session,
            },
        )
    }

    /// Warm-tier reference: durable with native vector search
    pub fn warm() -> Self {
        Self::new(
            "warm",
            Capabilities {
                supports_vector_search: true,
                typical_latency_ms: 10,
                durability_class: DurabilityClass::Durable,
            },
        )
    }

    /// Cold-tier reference used in tests without a database file
    pub fn cold() -> Self {
        Self::new(
            "cold",
            Capabilities {
                supports_vector_search: false,
                typical_latency_ms: 50,
                durability_class: DurabilityClass::Archival,
            },
        )
    }

    /// Toggle availability; while false every call fails `Unavailable`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!("{} store offline", self.name)))
        }
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, HashMap<String, MemoryRecord>>> {
        self.records
            .read()
            .map_err(|_| StoreError::Unavailable(format!("{} store lock poisoned", self.name)))
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, HashMap<String, MemoryRecord>>> {
        self.records
            .write()
            .map_err(|_| StoreError::Unavailable(format!("{} store lock poisoned", self.name)))
    }
}

impl MemoryStore for MemStore {
    fn put(&self, record: &MemoryRecord) -> StoreResult<()> {
        self.check_available()?;
        self.write()?.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> StoreResult<MemoryRecord> {
        self.check_available()?;
        self.read()?
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> StoreResult<()> {
        self.check_available()?;
        self.write()?.remove(id);
        Ok(())
    }

    fn list_by_filter(&self, filter: &RecordFilter) -> StoreResult<Vec<MemoryRecord>> {
        self.check_available()?;
        let records = self.read()?;
        let mut matched: Vec<MemoryRecord> = records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        // Deterministic order for callers that sample
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn count(&self) -> StoreResult<u64> {
        self.check_available()?;
        Ok(self.read()?.len() as u64)
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn vector_search(&self, query: &[f32], k: usize) -> StoreResult<Vec<ScoredRecord>> {
        if !self.capabilities.supports_vector_search {
            return Err(StoreError::Unsupported("vector search"));
        }
        self.check_available()?;

        let records = self.read()?;
        let mut scored: Vec<ScoredRecord> = records
            .values()
            .filter(|r| !r.is_tombstone())
            .filter_map(|r| {
                let embedding = r.embedding.as_deref()?;
                if embedding.len() != query.len() {
                    return None;
                }
                let score = relevance_from_cosine(cosine_similarity(embedding, query));
                Some(ScoredRecord {
                    record: r.clone(),
                    score,
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.record.id.cmp(&b.record.id)));
        scored.truncate(k);
        Ok(scored)
    }

    fn keyword_search(&self, query: &str, k: usize) -> StoreResult<Vec<ScoredRecord>> {
        self.check_available()?;

        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.read()?;
        let mut scored: Vec<ScoredRecord> = records
            .values()
            .filter(|r| !r.is_tombstone())
            .filter_map(|r| {
                let content = r.content.to_lowercase();
                let hits = terms.iter().filter(|t| content.contains(t.as_str())).count();
                if hits == 0 {
                    return None;
                }
                Some(ScoredRecord {
                    record: r.clone(),
                    score: hits as f64 / terms.len() as f64,
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.record.id.cmp(&b.record.id)));
        scored.truncate(k);
        Ok(scored)
    }
}

// ============================================================================
// TESTS
// ============================================================================
