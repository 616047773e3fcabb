//! Core configuration.
//!
//! Every tunable the engine exposes lives here, grouped per component, with
//! defaults matching the documented behavior. All sections implement
//! `Default` so callers can override only what they need:
//!
//! ```rust
//! use mnemon_core::config::CoreConfig;
//!
//! let config = CoreConfig {
//!     embedding_dim: 768,
//!     ..Default::default()
//! };
//! assert_eq!(config.router.hot_importance, 0.7);
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the memory core
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Embedding dimension; vectors of any other length are rejected
    pub embedding_dim: usize,
    /// Tier router tunables
    pub router: RouterConfig,
    /// Placement engine tunables
    pub placement: PlacementConfig,
    /// Decay worker tunables
    pub decay: DecayConfig,
    /// Consolidation engine tunables
    pub consolidation: ConsolidationConfig,
    /// Review scheduler tunables
    pub review: ReviewConfig,
    /// Forgetting engine tunables
    pub forgetting: ForgettingConfig,
    /// Maintenance orchestrator tunables
    pub maintenance: MaintenanceConfig,
    /// Query-embedding cache byte budget
    pub embedding_cache_bytes: usize,
    /// Idle time after which an uncontended id mutex is evicted
    pub id_lock_idle: Duration,
    /// Overflow log path; `None` resolves to the platform data directory
    pub overflow_path: Option<PathBuf>,
}

impl CoreConfig {
    /// Default embedding dimension
    pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

    /// Default query-embedding cache budget (10 MiB)
    pub const DEFAULT_EMBEDDING_CACHE_BYTES: usize = 10 * 1024 * 1024;

    /// Construct the documented default configuration
    pub fn new() -> Self {
        Self::default()
    }
}

/// Tier router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Records at or above this importance land in hot
    pub hot_importance: f64,
    /// Records at or above this importance (and below hot) land in warm
    pub warm_importance: f64,
    /// Total fan-out deadline for `search` when the caller supplies none
    pub search_deadline: Duration,
    /// A cold `get` hit with at least this many accesses schedules promotion
    pub cold_hit_promotion_accesses: u32,
    /// Sample window for the brute-force cosine fallback when the warm
    /// backend lacks vector search
    pub brute_force_sample: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            hot_importance: 0.7,
            warm_importance: 0.3,
            search_deadline: Duration::from_millis(800),
            cold_hit_promotion_accesses: 10,
            brute_force_sample: 512,
        }
    }
}

/// Placement engine configuration
#[derive(Debug, Clone)]
pub struct PlacementConfig {
    /// Base hot-tier TTL
    pub hot_ttl_base: Duration,
    /// TTL extension granted per access inside the hot window
    pub hot_ttl_per_access: Duration,
    /// Upper bound on the extended hot TTL
    pub hot_ttl_cap: Duration,
    /// Accesses required inside the base hot window to stay hot
    pub hot_min_accesses: u32,
    /// Warm→hot requires this many accesses in the last 24h
    pub warm_promote_accesses: u32,
    /// Warm→hot requires at least this strength
    pub warm_promote_min_strength: f64,
    /// Cold→warm requires this many accesses in the last 7d
    pub cold_promote_accesses: u32,
    /// Cold→warm alternative: a recent query relevance at or above this
    pub cold_promote_relevance: f64,
    /// Window in which a query relevance counts as "recent"
    pub relevance_window: Duration,
    /// Warm→cold below this strength
    pub warm_demote_strength: f64,
    /// Warm→cold when older than this many days with no recent access
    pub warm_demote_age_days: i64,
    /// "No recent access" window for warm→cold, in days
    pub warm_demote_idle_days: i64,
    /// Backoff schedule for tier-move retries; its length is the attempt cap
    pub retry_backoff: Vec<Duration>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            hot_ttl_base: Duration::from_secs(6 * 3600),
            hot_ttl_per_access: Duration::from_secs(3 * 3600),
            hot_ttl_cap: Duration::from_secs(24 * 3600),
            hot_min_accesses: 5,
            warm_promote_accesses: 5,
            warm_promote_min_strength: 0.6,
            cold_promote_accesses: 3,
            cold_promote_relevance: 0.8,
            relevance_window: Duration::from_secs(7 * 86400),
            warm_demote_strength: 0.30,
            warm_demote_age_days: 90,
            warm_demote_idle_days: 30,
            retry_backoff: vec![
                Duration::from_millis(100),
                Duration::from_millis(500),
                Duration::from_secs(2),
            ],
        }
    }
}

/// Decay worker configuration
#[derive(Debug, Clone)]
pub struct DecayConfig {
    /// Base decay rate per day before modifiers
    pub base_rate: f64,
    /// Exponential recency constant for importance scoring
    pub recency_lambda: f64,
    /// Minimum interval between decay applications to one record
    pub min_interval: Duration,
    /// Maximum records processed per tick
    pub batch_size: usize,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            base_rate: 0.1,
            recency_lambda: 0.05,
            min_interval: Duration::from_secs(86400),
            batch_size: 1000,
        }
    }
}

/// Consolidation engine configuration
#[derive(Debug, Clone)]
pub struct ConsolidationConfig {
    /// Run when the total record count across tiers exceeds this
    pub trigger_total_records: u64,
    /// Run when hot+warm bytes exceed this fraction of `byte_budget`
    pub trigger_byte_ratio: f64,
    /// Configured hot+warm byte budget
    pub byte_budget: u64,
    /// Scheduled interval between runs regardless of pressure
    pub schedule_interval: Duration,
    /// Maximum warm candidates sampled per run, oldest last-accessed first
    pub sample_size: usize,
    /// Single-linkage merge threshold on the pairwise distance
    pub distance_threshold: f64,
    /// Clusters at or below this size are linked, not rewritten
    pub link_max_size: usize,
    /// Average importance below this selects SUMMARIZE
    pub low_importance: f64,
    /// Members at or above this importance are kept in KEEP_AND_SUMMARIZE
    pub high_importance: f64,
    /// Window inside which two records earn the temporal bonus
    pub temporal_bonus_window: Duration,
    /// Distance subtracted at zero temporal separation
    pub temporal_bonus: f64,
    /// Distance subtracted when both records share a conversation tag
    pub conversation_bonus: f64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            trigger_total_records: 10_000,
            trigger_byte_ratio: 0.8,
            byte_budget: 64 * 1024 * 1024,
            schedule_interval: Duration::from_secs(86400),
            sample_size: 5000,
            distance_threshold: 0.3,
            link_max_size: 3,
            low_importance: 0.4,
            high_importance: 0.7,
            temporal_bonus_window: Duration::from_secs(3600),
            temporal_bonus: 0.1,
            conversation_bonus: 0.1,
        }
    }
}

/// Review scheduler configuration
#[derive(Debug, Clone)]
pub struct ReviewConfig {
    /// Easiness factor lower bound
    pub min_easiness: f64,
    /// Easiness factor upper bound
    pub max_easiness: f64,
    /// Easiness span multiplied by importance on initialization
    pub easiness_span: f64,
    /// First interval, in days
    pub first_interval_days: f64,
    /// Floor applied when scheduling the second review
    pub second_interval_floor: f64,
    /// Log base of the overdue saturation curve, in days
    pub overdue_log_base: f64,
    /// Multiplier applied to the priority of due records on context queries
    pub due_boost: f64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            min_easiness: 1.3,
            max_easiness: 3.0,
            easiness_span: 1.7,
            first_interval_days: 1.0,
            second_interval_floor: 6.0,
            overdue_log_base: 30.0,
            due_boost: 1.5,
        }
    }
}

/// Forgetting engine configuration
#[derive(Debug, Clone)]
pub struct ForgettingConfig {
    /// PII score above which aged records expire
    pub pii_threshold: f64,
    /// Age in days before a PII-marked record expires
    pub pii_age_days: i64,
    /// Financial score above which aged records expire
    pub financial_threshold: f64,
    /// Age in days before a financial-marked record expires
    pub financial_age_days: i64,
    /// Importance below which stale episodic records expire
    pub episodic_importance: f64,
    /// Age in days before a low-importance episodic record expires
    pub episodic_age_days: i64,
    /// Privacy risk above which a record expires immediately
    pub risk_threshold: f64,
    /// Tombstone grace window before hard deletion
    pub grace: Duration,
    /// Importance above which a record is never forgotten
    pub never_forget_importance: f64,
    /// Access count above which a record is never forgotten
    pub never_forget_accesses: u32,
}

impl Default for ForgettingConfig {
    fn default() -> Self {
        Self {
            pii_threshold: 0.5,
            pii_age_days: 30,
            financial_threshold: 0.5,
            financial_age_days: 90,
            episodic_importance: 0.3,
            episodic_age_days: 180,
            risk_threshold: 0.7,
            grace: Duration::from_secs(7 * 86400),
            never_forget_importance: 0.8,
            never_forget_accesses: 50,
        }
    }
}

/// Maintenance orchestrator configuration
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Interval between automatic cycles
    pub interval: Duration,
    /// Wall-clock budget per phase before it yields with progress
    pub phase_budget: Duration,
    /// Records processed between budget checks
    pub yield_every_records: usize,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            phase_budget: Duration::from_millis(250),
            yield_every_records: 1000,
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            embedding_dim: Self::DEFAULT_EMBEDDING_DIM,
            router: RouterConfig::default(),
            placement: PlacementConfig::default(),
            decay: DecayConfig::default(),
            consolidation: ConsolidationConfig::default(),
            review: ReviewConfig::default(),
            forgetting: ForgettingConfig::default(),
            maintenance: MaintenanceConfig::default(),
            embedding_cache_bytes: Self::DEFAULT_EMBEDDING_CACHE_BYTES,
            id_lock_idle: Duration::from_secs(5),
            overflow_path: None,
        }
    }
}
