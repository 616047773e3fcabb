//! # Mnemon Core
//!
//! Cognitive memory engine for AI assistants. Ingests, ranks, decays,
//! consolidates, and retrieves discrete memory records across three storage
//! tiers with different latency/cost profiles:
//!
//! - **Scoring algebra**: importance from recency, frequency, salience, and
//!   context relevance; per-day decay modulated by importance, access
//!   recency, and memory type; reinforcement on access
//! - **Three-tier placement**: hot (session, TTL-bound), warm (primary,
//!   vector-searchable), cold (durable keyword archive) with promotion and
//!   demotion rules evaluated every maintenance cycle
//! - **Consolidation**: single-linkage clustering over embeddings with
//!   temporal and conversation bonuses; clusters are linked, summarized, or
//!   split into keepers and a summary
//! - **Spaced-repetition review**: SM-2-family intervals seeded from
//!   importance, priority-ordered due queues, context-boosted ranking
//! - **Forgetting**: privacy-driven expiration with never-forget protection
//!   and tombstone grace windows
//!
//! The embedding provider, summarizer, and production storage drivers are
//! external collaborators behind small traits; reference backends (in-memory
//! and SQLite/FTS5) keep the engine runnable end to end.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mnemon_core::prelude::*;
//! use std::sync::Arc;
//! use mnemon_core::store::MemStore;
//!
//! # fn main() -> mnemon_core::Result<()> {
//! let service = MemoryService::builder()
//!     .hot(Arc::new(MemStore::hot()))
//!     .warm(Arc::new(MemStore::warm()))
//!     .cold(Arc::new(MemStore::cold()))
//!     .build()?;
//!
//! // Remember something
//! let receipt = service.create(CreateInput {
//!     content: "The deploy finished cleanly".to_string(),
//!     ..Default::default()
//! })?;
//!
//! // Recall it
//! let record = service.get(&receipt.id)?;
//! assert_eq!(record.access_count, 1);
//!
//! // Search across tiers
//! let response = service.search(SearchQuery::new("deploy", 10))?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```
//!
//! ## Maintenance
//!
//! A periodic cycle drives the engines in a load-bearing order: overflow
//! drain, decay, review refresh, consolidation, forgetting, placement. Run
//! it manually with [`MemoryService::run_maintenance`] or spawn the
//! [`MaintenanceDaemon`] on a tokio runtime.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod config;
pub mod consolidation;
pub mod decay;
pub mod embedding;
pub mod error;
pub mod forgetting;
pub mod locks;
pub mod maintenance;
pub mod memory;
pub mod placement;
pub mod review;
pub mod scoring;
pub mod service;
pub mod store;
pub mod tier;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Record model
pub use memory::{
    new_record_id, validate_content_schema, CreateInput, CreateReceipt, Durability, ForgetCause,
    MemoryRecord, MemoryState, MemoryStats, MemoryTier, MemoryType, PrivacyMarkers, RecordPatch,
    ReviewState, SalienceSignals, TierStats,
};

// Errors
pub use error::{MemoryError, Result};

// Configuration
pub use config::CoreConfig;

// Scoring engine
pub use scoring::{ImportanceWeights, PrivacyDetector, ScoringEngine, ScoringError};

// Store contract
pub use store::{
    Capabilities, DurabilityClass, MemStore, MemoryStore, RecordFilter, ScoredRecord, SqliteStore,
    StoreError, StoreResult,
};

// Tier routing
pub use tier::{SearchOutcome, SearchRequest, TierHit, TierRouter};

// Placement
pub use placement::{
    PendingMove, PlacementDecision, PlacementEngine, PlacementQueue, PlacementReport,
};

// Decay
pub use decay::{DecayReport, DecayWorker};

// Consolidation
pub use consolidation::{
    cluster_records, pairwise_distance, ClusterParams, ConsolidationEngine, ConsolidationReport,
    Strategy,
};

// Review scheduling
pub use review::{ReviewReport, ReviewScheduler};

// Forgetting
pub use forgetting::{ExpireReason, ForgettingEngine, ForgettingReport};

// Maintenance
pub use maintenance::{CycleReport, MaintenanceDaemon, PhaseBudget};

// Service facade
pub use service::{
    MemoryService, MemoryServiceBuilder, OverflowLog, SearchHit, SearchQuery, SearchResponse,
};

// External collaborator interfaces
pub use embedding::{
    cosine_similarity, relevance_from_cosine, renormalized_mean, CachedEmbedding, EmbeddingCache,
    EmbeddingProvider, NaiveSummarizer, Summarizer,
};

// Id locking
pub use locks::{IdGuard, IdLockTable};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding dimension when none is configured
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        CoreConfig, CreateInput, CreateReceipt, Durability, MemoryError, MemoryRecord,
        MemoryService, MemoryState, MemoryStats, MemoryTier, MemoryType, RecordPatch, Result,
        SearchQuery, SearchResponse,
    };

    pub use crate::{EmbeddingProvider, MemoryStore, Summarizer};

    pub use crate::{CycleReport, MaintenanceDaemon};
}
