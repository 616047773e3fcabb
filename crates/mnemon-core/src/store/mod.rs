//! Storage backend contract
//!
//! Each tier is served by one backend implementing [`MemoryStore`]. All
//! operations are single-record and idempotent by id. Backends store records
//! verbatim - the core owns every cross-field invariant, and may observe
//! temporary duplication across backends during tier moves.

mod memstore;
mod migrations;
mod sqlite;

pub use memstore::MemStore;
pub use migrations::{Migration, MIGRATIONS};
pub use sqlite::SqliteStore;

use crate::memory::{MemoryRecord, MemoryTier, MemoryType};

// ============================================================================
// ERRORS
// ============================================================================

/// Backend error kinds
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// No record with the given id
    #[error("not found: {0}")]
    NotFound(String),
    /// Concurrent modification detected
    #[error("conflict: {0}")]
    Conflict(String),
    /// The backend cannot serve the call right now
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// The backend does not implement this optional capability
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

/// Result alias for backend calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// CAPABILITIES
// ============================================================================

/// Durability class a backend publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityClass {
    /// Lives only for the session
    Session,
    /// Survives the session but may be dropped under pressure
    Ephemeral,
    /// Durably persisted
    Durable,
    /// Durable, append-oriented archive
    Archival,
}

/// Capability hints a backend publishes; the core treats backends
/// identically apart from these
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// Whether `vector_search` is implemented natively
    pub supports_vector_search: bool,
    /// Typical operation latency, for routing diagnostics
    pub typical_latency_ms: u32,
    /// Durability class
    pub durability_class: DurabilityClass,
}

// ============================================================================
// FILTER
// ============================================================================

/// Filter for `list_by_filter`
///
/// Tombstones are excluded unless explicitly requested; listing APIs never
/// surface them.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Restrict to one memory type
    pub memory_type: Option<MemoryType>,
    /// Restrict to one tier
    pub tier: Option<MemoryTier>,
    /// Require a tag
    pub tag: Option<String>,
    /// Require at least this importance
    pub min_importance: Option<f64>,
    /// Include tombstoned records
    pub include_tombstones: bool,
    /// Maximum records returned
    pub limit: Option<usize>,
}

impl RecordFilter {
    /// Match everything (up to any limit)
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a memory type
    pub fn with_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    /// Restrict to a tier
    pub fn with_tier(mut self, tier: MemoryTier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Require a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Require a minimum importance
    pub fn with_min_importance(mut self, min: f64) -> Self {
        self.min_importance = Some(min);
        self
    }

    /// Include tombstones
    pub fn with_tombstones(mut self) -> Self {
        self.include_tombstones = true;
        self
    }

    /// Cap the result count
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a record passes this filter
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if !self.include_tombstones && record.is_tombstone() {
            return false;
        }
        if let Some(memory_type) = self.memory_type {
            if record.memory_type != memory_type {
                return false;
            }
        }
        if let Some(tier) = self.tier {
            if record.tier != tier {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !record.tags.contains(tag) {
                return false;
            }
        }
        if let Some(min) = self.min_importance {
            if record.importance < min {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// A record scored by a backend search, score normalized to [0, 1]
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    /// The matched record
    pub record: MemoryRecord,
    /// Normalized relevance: `(cosine + 1) / 2` for vector backends,
    /// a rank-normalized text score for keyword backends
    pub score: f64,
}

/// Contract every tier backend satisfies
///
/// `put` is an upsert; `delete` of a missing id succeeds. Optional search
/// hooks default to `Unsupported`, which the router answers with in-core
/// fallbacks.
pub trait MemoryStore: Send + Sync {
    /// Upsert a record by id
    fn put(&self, record: &MemoryRecord) -> StoreResult<()>;

    /// Fetch a record by id, tombstones included
    fn get_by_id(&self, id: &str) -> StoreResult<MemoryRecord>;

    /// Delete a record by id; succeeds when already absent
    fn delete(&self, id: &str) -> StoreResult<()>;

    /// List records matching a filter
    fn list_by_filter(&self, filter: &RecordFilter) -> StoreResult<Vec<MemoryRecord>>;

    /// Count stored records, tombstones included
    fn count(&self) -> StoreResult<u64>;

    /// Published capability hints
    fn capabilities(&self) -> Capabilities;

    /// Nearest-neighbor search over embeddings
    fn vector_search(&self, _query: &[f32], _k: usize) -> StoreResult<Vec<ScoredRecord>> {
        Err(StoreError::Unsupported("vector search"))
    }

    /// Keyword search over content
    fn keyword_search(&self, _query: &str, _k: usize) -> StoreResult<Vec<ScoredRecord>> {
        Err(StoreError::Unsupported("keyword search"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ForgetCause, MemoryType};
    use chrono::Utc;

    #[test]
    fn test_filter_matching() {
        let now = Utc::now();
        let mut record = MemoryRecord::new("x", MemoryType::Semantic, now);
        record.importance = 0.6;
        record.tags.insert("alpha".into());

        assert!(RecordFilter::all().matches(&record));
        assert!(RecordFilter::all().with_type(MemoryType::Semantic).matches(&record));
        assert!(!RecordFilter::all().with_type(MemoryType::Episodic).matches(&record));
        assert!(RecordFilter::all().with_tag("alpha").matches(&record));
        assert!(!RecordFilter::all().with_tag("beta").matches(&record));
        assert!(RecordFilter::all().with_min_importance(0.5).matches(&record));
        assert!(!RecordFilter::all().with_min_importance(0.7).matches(&record));
    }

    #[test]
    fn test_filter_excludes_tombstones_by_default() {
        let now = Utc::now();
        let mut record = MemoryRecord::new("x", MemoryType::Episodic, now);
        record.tombstone(ForgetCause::Manual, now);

        assert!(!RecordFilter::all().matches(&record));
        assert!(RecordFilter::all().with_tombstones().matches(&record));
    }
}
