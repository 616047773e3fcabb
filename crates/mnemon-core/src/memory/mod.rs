//! Memory module - core record types and service-facing data structures

mod record;

pub use record::{
    new_record_id, validate_content_schema, ForgetCause, MemoryRecord, MemoryState, MemoryTier,
    MemoryType, PrivacyMarkers, ReviewState, SalienceSignals, ACCESS_HISTORY_CAP,
    MAX_CONTENT_BYTES,
};

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for creating a new memory record
///
/// Uses `deny_unknown_fields` to prevent field injection through the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateInput {
    /// The content to remember
    pub content: String,
    /// Memory type
    #[serde(default)]
    pub memory_type: MemoryType,
    /// Tags for categorization and protection
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Salience sub-scores; defaults to neutral when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salience: Option<SalienceSignals>,
    /// Precomputed embedding; generated by the provider when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Context vector contributing a relevance factor to importance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_embedding: Option<Vec<f32>>,
    /// Whether to initialize review scheduling
    #[serde(default = "default_true")]
    pub schedule_review: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CreateInput {
    fn default() -> Self {
        Self {
            content: String::new(),
            memory_type: MemoryType::Episodic,
            tags: BTreeSet::new(),
            salience: None,
            embedding: None,
            context_embedding: None,
            schedule_review: true,
        }
    }
}

/// Partial update applied by `update`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecordPatch {
    /// Replacement content; triggers re-scoring
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Replacement tag set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    /// Replacement salience sub-scores
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salience: Option<SalienceSignals>,
    /// Replacement embedding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl RecordPatch {
    /// True when the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.tags.is_none()
            && self.salience.is_none()
            && self.embedding.is_none()
    }
}

// ============================================================================
// RECEIPTS AND STATS
// ============================================================================

/// Durability of a completed write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Persisted in a tier
    Stored,
    /// All tiers were unavailable; queued in the overflow log
    Pending,
}

/// Result of a `create`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReceipt {
    /// Id of the new record
    pub id: String,
    /// Tier the record landed in, absent when overflow-queued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<MemoryTier>,
    /// Whether the write reached a tier or the overflow log
    pub durability: Durability,
}

/// Per-tier statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TierStats {
    /// Record count (tombstones excluded)
    pub records: u64,
    /// Approximate stored bytes
    pub bytes: u64,
    /// Exponentially weighted moving average of backend latency
    pub avg_latency_ms: f64,
}

/// Statistics for the whole memory system
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    /// Hot tier
    pub hot: TierStats,
    /// Warm tier
    pub warm: TierStats,
    /// Cold tier
    pub cold: TierStats,
    /// Duration of the last maintenance cycle in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_ms: Option<i64>,
    /// Lines waiting in the overflow log
    pub overflow_depth: u64,
    /// When the stats were assembled
    pub collected_at: Option<DateTime<Utc>>,
}

// ============================================================================
// TESTS
// ============================================================================
