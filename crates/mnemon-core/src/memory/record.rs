//! Memory record - the fundamental unit the engine stores, scores, and moves
//!
//! Each record carries:
//! - Content and type
//! - Derived importance and decay-affected strength
//! - Review scheduling state (spaced repetition)
//! - Privacy detection markers
//! - Tier residency and access history

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum content size in bytes (64 KiB)
pub const MAX_CONTENT_BYTES: usize = 64 * 1024;

/// Recent access timestamps retained per record for windowed counting
pub const ACCESS_HISTORY_CAP: usize = 100;

// ============================================================================
// MEMORY TYPES
// ============================================================================

/// Types of memory records
///
/// The type affects the decay modifier and never-forget status, and selects
/// the content schema validated at create for the structured variants.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// An event or experience; decays fastest
    #[default]
    Episodic,
    /// A fact or generalization
    Semantic,
    /// How-to knowledge; most stable
    Procedural,
    /// Emotionally charged content
    Emotional,
    /// Short-lived working context; always placed hot
    Working,
    /// System knowledge; never forgotten
    System,
    /// A structured trace of iterative refinement steps
    RefinementTrace,
    /// A structured multi-expert consensus
    ExpertConsensus,
}

impl MemoryType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
            MemoryType::Procedural => "procedural",
            MemoryType::Emotional => "emotional",
            MemoryType::Working => "working",
            MemoryType::System => "system",
            MemoryType::RefinementTrace => "refinement_trace",
            MemoryType::ExpertConsensus => "expert_consensus",
        }
    }

    /// Parse from string name, defaulting to episodic
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "episodic" => MemoryType::Episodic,
            "semantic" => MemoryType::Semantic,
            "procedural" => MemoryType::Procedural,
            "emotional" => MemoryType::Emotional,
            "working" => MemoryType::Working,
            "system" => MemoryType::System,
            "refinement_trace" => MemoryType::RefinementTrace,
            "expert_consensus" => MemoryType::ExpertConsensus,
            _ => MemoryType::Episodic,
        }
    }

    /// Decay modifier applied to the per-day decay rate
    pub fn decay_modifier(&self) -> f64 {
        match self {
            MemoryType::Episodic => 1.0,
            MemoryType::Semantic => 0.7,
            MemoryType::Procedural => 0.5,
            MemoryType::Emotional => 0.6,
            MemoryType::System => 0.3,
            _ => 1.0,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// TIERS AND STATES
// ============================================================================

/// Storage tier, ordered by increasing latency and decreasing cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    /// Session-fast storage with TTL semantics
    Hot,
    /// Primary vector-searchable storage
    Warm,
    /// Durable keyword-searchable archive
    Cold,
}

impl MemoryTier {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryTier::Hot => "hot",
            MemoryTier::Warm => "warm",
            MemoryTier::Cold => "cold",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hot" => Some(MemoryTier::Hot),
            "warm" => Some(MemoryTier::Warm),
            "cold" => Some(MemoryTier::Cold),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record lifecycle state, derived from strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryState {
    /// Strength >= 0.30
    #[default]
    Active,
    /// 0.15 <= strength < 0.30
    Weak,
    /// 0.05 <= strength < 0.15
    Archived,
    /// Strength < 0.05, or explicitly expired; tombstoned until purge
    Deleted,
}

impl MemoryState {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryState::Active => "active",
            MemoryState::Weak => "weak",
            MemoryState::Archived => "archived",
            MemoryState::Deleted => "deleted",
        }
    }

    /// Derive the state for a strength value
    ///
    /// Never-forget records floor at `Archived` instead of `Deleted`.
    pub fn for_strength(strength: f64, never_forget: bool) -> Self {
        if strength >= 0.30 {
            MemoryState::Active
        } else if strength >= 0.15 {
            MemoryState::Weak
        } else if strength >= 0.05 || never_forget {
            MemoryState::Archived
        } else {
            MemoryState::Deleted
        }
    }
}

impl std::fmt::Display for MemoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a tombstoned record was deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForgetCause {
    /// Expired by the forgetting engine for privacy reasons
    Privacy,
    /// Explicit caller delete
    Manual,
    /// Strength decayed below the deletion threshold
    Decayed,
}

// ============================================================================
// EMBEDDED STATE
// ============================================================================

/// Spaced-repetition scheduling state; present iff the record is scheduled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewState {
    /// Current inter-review interval in days
    pub interval_days: f64,
    /// Easiness factor in [1.3, 3.0]
    pub easiness_factor: f64,
    /// Next scheduled review
    pub next_review_at: DateTime<Utc>,
    /// Successful reviews so far
    pub review_count: u32,
}

/// Privacy detection flags, derived from content and tags
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyMarkers {
    /// Saturated sum of detected personal markers, in [0, 1]
    pub pii_score: f64,
    /// Saturated sum of detected financial markers, in [0, 1]
    pub financial_score: f64,
}

/// Caller-supplied salience sub-scores, each in [0, 10]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SalienceSignals {
    /// Emotional charge
    pub emotional: f64,
    /// Novelty relative to what is already known
    pub novelty: f64,
    /// Whether the content calls for action
    pub actionable: f64,
    /// Personal relevance to the user
    pub personal: f64,
}

impl SalienceSignals {
    /// Neutral salience (all sub-scores at 5.0, i.e. a 0.5 factor)
    pub fn neutral() -> Self {
        Self {
            emotional: 5.0,
            novelty: 5.0,
            actionable: 5.0,
            personal: 5.0,
        }
    }

    /// True when every sub-score is inside [0, 10]
    pub fn is_valid(&self) -> bool {
        [self.emotional, self.novelty, self.actionable, self.personal]
            .iter()
            .all(|v| (0.0..=10.0).contains(v))
    }

    /// Combined salience factor in [0, 1]
    pub fn factor(&self) -> f64 {
        (self.emotional + self.novelty + self.actionable + self.personal) / 40.0
    }
}

// ============================================================================
// MEMORY RECORD
// ============================================================================

/// A memory record
///
/// Identity is immutable; scores, state, and tier residency are not. The
/// engine owns every invariant between the fields - backends store records
/// verbatim.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Unique identifier, `mem_<epoch_ms>_<8_hex>`
    pub id: String,
    /// Free-text or schema-validated content, at most 64 KiB
    pub content: String,
    /// Memory type
    pub memory_type: MemoryType,
    /// Embedding vector of the deployment dimension, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Derived importance in [0, 1]
    pub importance: f64,
    /// Decay-affected strength in [0, 1]
    pub strength: f64,
    /// Total accesses
    pub access_count: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last access time
    pub last_accessed: DateTime<Utc>,
    /// Last decay application
    pub last_decayed: DateTime<Utc>,
    /// Unordered tag set
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Tier currently authoritative for this record
    pub tier: MemoryTier,
    /// When the record entered its current tier
    pub tier_entered_at: DateTime<Utc>,
    /// Review scheduling state, present iff scheduled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_state: Option<ReviewState>,
    /// Privacy detection flags
    #[serde(default)]
    pub privacy_markers: PrivacyMarkers,
    /// Lifecycle state, derived from strength
    pub state: MemoryState,
    /// Ids of related records (set by consolidation LINK)
    #[serde(default)]
    pub links: BTreeSet<String>,
    /// Stored salience used when re-scoring without fresh signals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salience: Option<SalienceSignals>,
    /// Recent access timestamps, newest last, capped
    #[serde(default)]
    pub recent_accesses: Vec<DateTime<Utc>>,
    /// Best query relevance observed recently
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_relevance: Option<f64>,
    /// When that relevance was observed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_relevance_at: Option<DateTime<Utc>>,
    /// Tombstone timestamp; set iff state is `Deleted`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Why the record was tombstoned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forget_cause: Option<ForgetCause>,
}

/// Generate a record id for the given instant
pub fn new_record_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("mem_{}_{}", now.timestamp_millis(), &suffix[..8])
}

impl MemoryRecord {
    /// Create a fresh record with derived fields at their initial values
    pub fn new(content: impl Into<String>, memory_type: MemoryType, now: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(now),
            content: content.into(),
            memory_type,
            embedding: None,
            importance: 0.5,
            strength: 1.0,
            access_count: 0,
            created_at: now,
            last_accessed: now,
            last_decayed: now,
            tags: BTreeSet::new(),
            tier: MemoryTier::Warm,
            tier_entered_at: now,
            review_state: None,
            privacy_markers: PrivacyMarkers::default(),
            state: MemoryState::Active,
            links: BTreeSet::new(),
            salience: None,
            recent_accesses: Vec::new(),
            last_relevance: None,
            last_relevance_at: None,
            deleted_at: None,
            forget_cause: None,
        }
    }

    /// Age in fractional days at `now`
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds().max(0) as f64 / 86400.0
    }

    /// Whether the record is protected from deletion
    ///
    /// System type, protective tags, very high importance, or very high
    /// access counts all qualify. Thresholds match the forgetting defaults;
    /// the forgetting engine passes its configured values.
    pub fn is_never_forget(&self, importance_floor: f64, access_floor: u32) -> bool {
        self.memory_type == MemoryType::System
            || self.tags.contains("protected")
            || self.tags.contains("explicitly_saved")
            || self.tags.contains("never_forget")
            || self.tags.contains("system")
            || self.importance > importance_floor
            || self.access_count > access_floor
    }

    /// Record an access at `now`, maintaining the capped history
    pub fn record_access(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed = now;
        self.recent_accesses.push(now);
        if self.recent_accesses.len() > ACCESS_HISTORY_CAP {
            let excess = self.recent_accesses.len() - ACCESS_HISTORY_CAP;
            self.recent_accesses.drain(..excess);
        }
    }

    /// Accesses observed at or after `cutoff`
    ///
    /// Bounded by the history cap; older accesses beyond the cap are not
    /// counted, which only under-counts for extremely hot records.
    pub fn accesses_since(&self, cutoff: DateTime<Utc>) -> u32 {
        self.recent_accesses.iter().filter(|t| **t >= cutoff).count() as u32
    }

    /// Accesses since entering the current tier
    pub fn accesses_in_tier(&self) -> u32 {
        self.accesses_since(self.tier_entered_at)
    }

    /// Whether the record is a tombstone
    pub fn is_tombstone(&self) -> bool {
        self.state == MemoryState::Deleted
    }

    /// Whether the tombstone grace window has elapsed at `now`
    pub fn grace_elapsed(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        match self.deleted_at {
            Some(at) => now - at >= grace,
            None => false,
        }
    }

    /// Mark the record as a tombstone
    pub fn tombstone(&mut self, cause: ForgetCause, now: DateTime<Utc>) {
        self.state = MemoryState::Deleted;
        self.deleted_at = Some(now);
        self.forget_cause = Some(cause);
    }

    /// The conversation tag value, if any (`conversation:<id>`)
    pub fn conversation_id(&self) -> Option<&str> {
        self.tags
            .iter()
            .find_map(|t| t.strip_prefix("conversation:"))
    }

    /// Approximate stored size in bytes
    pub fn approximate_bytes(&self) -> u64 {
        let embedding = self.embedding.as_ref().map_or(0, |e| e.len() * 4);
        (self.content.len() + embedding) as u64
    }
}

// ============================================================================
// CONTENT SCHEMAS
// ============================================================================

/// Validate per-variant content schemas
///
/// `refinement_trace` content must be a JSON object with a non-empty `steps`
/// array; `expert_consensus` content must be a JSON object with an `experts`
/// array and a string `verdict`. Other types accept free text.
pub fn validate_content_schema(memory_type: MemoryType, content: &str) -> Result<(), String> {
    match memory_type {
        MemoryType::RefinementTrace => {
            let value: serde_json::Value = serde_json::from_str(content)
                .map_err(|e| format!("refinement_trace content must be JSON: {e}"))?;
            match value.get("steps").and_then(|s| s.as_array()) {
                Some(steps) if !steps.is_empty() => Ok(()),
                _ => Err("refinement_trace content requires a non-empty 'steps' array".into()),
            }
        }
        MemoryType::ExpertConsensus => {
            let value: serde_json::Value = serde_json::from_str(content)
                .map_err(|e| format!("expert_consensus content must be JSON: {e}"))?;
            let has_experts = value.get("experts").is_some_and(|e| e.is_array());
            let has_verdict = value.get("verdict").is_some_and(|v| v.is_string());
            if has_experts && has_verdict {
                Ok(())
            } else {
                Err("expert_consensus content requires an 'experts' array and a string 'verdict'"
                    .into())
            }
        }
        _ => Ok(()),
    }
}

// ============================================================================
// TESTS
// ============================================================================
