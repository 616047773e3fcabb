//! Retrieval API
//!
//! `MemoryService` is the public facade: create, get, search, update,
//! delete, stats, and the maintenance entry point. Every operation has a
//! `_at` variant taking an explicit clock, which the public wrappers feed
//! with `Utc::now()`; tests and the simulation harness drive the `_at`
//! variants directly.

mod overflow;

pub use overflow::OverflowLog;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::config::CoreConfig;
use crate::consolidation::ConsolidationEngine;
use crate::decay::DecayWorker;
use crate::embedding::{EmbeddingCache, EmbeddingProvider, NaiveSummarizer, Summarizer};
use crate::error::{MemoryError, Result};
use crate::forgetting::ForgettingEngine;
use crate::locks::IdLockTable;
use crate::maintenance::{CycleReport, PhaseBudget};
use crate::memory::{
    validate_content_schema, CreateInput, CreateReceipt, Durability, ForgetCause, MemoryRecord,
    MemoryStats, MemoryTier, MemoryType, RecordPatch, TierStats, MAX_CONTENT_BYTES,
};
use crate::placement::{PlacementEngine, PlacementQueue};
use crate::review::ReviewScheduler;
use crate::scoring::ScoringEngine;
use crate::store::{MemStore, MemoryStore, RecordFilter, SqliteStore, StoreError};
use crate::tier::{SearchOutcome, SearchRequest, TierRouter};

// ============================================================================
// QUERY TYPES
// ============================================================================

/// A search against the service
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Query text
    pub text: String,
    /// Result count
    pub k: usize,
    /// Restrict to one memory type
    pub memory_type: Option<MemoryType>,
    /// Require a tag
    pub tag: Option<String>,
    /// Require a minimum importance
    pub min_importance: Option<f64>,
    /// Include the hot tier
    pub session_scope: bool,
    /// Fan-out deadline; the configured default applies when absent
    pub deadline: Option<Duration>,
}

impl SearchQuery {
    /// Plain query with defaults
    pub fn new(text: impl Into<String>, k: usize) -> Self {
        Self {
            text: text.into(),
            k,
            memory_type: None,
            tag: None,
            min_importance: None,
            session_scope: false,
            deadline: None,
        }
    }
}

/// One search result
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// The matched record
    pub record: MemoryRecord,
    /// Normalized relevance
    pub relevance: f64,
    /// Final ranking score
    pub score: f64,
    /// Tier the hit came from
    pub tier: MemoryTier,
}

/// Search response
#[derive(Debug, Clone)]
pub struct SearchResponse {
    /// Hits, best first
    pub results: Vec<SearchHit>,
    /// True when a tier timed out or was unavailable
    pub partial: bool,
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builder for [`MemoryService`]
pub struct MemoryServiceBuilder {
    config: CoreConfig,
    hot: Option<Arc<dyn MemoryStore>>,
    warm: Option<Arc<dyn MemoryStore>>,
    cold: Option<Arc<dyn MemoryStore>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl MemoryServiceBuilder {
    /// Override the configuration
    pub fn config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Supply the hot backend
    pub fn hot(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.hot = Some(store);
        self
    }

    /// Supply the warm backend
    pub fn warm(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.warm = Some(store);
        self
    }

    /// Supply the cold backend
    pub fn cold(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.cold = Some(store);
        self
    }

    /// Supply the embedding provider
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Supply the summarizer
    pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Build the service
    ///
    /// Missing backends fall back to the reference implementations: map
    /// stores for hot and warm, SQLite for cold.
    pub fn build(self) -> Result<MemoryService> {
        let hot = match self.hot {
            Some(store) => store,
            None => Arc::new(MemStore::hot()),
        };
        let warm = match self.warm {
            Some(store) => store,
            None => Arc::new(MemStore::warm()),
        };
        let cold = match self.cold {
            Some(store) => store,
            None => Arc::new(SqliteStore::new(None)?),
        };
        let summarizer = self
            .summarizer
            .unwrap_or_else(|| Arc::new(NaiveSummarizer::default()));

        let config = self.config;
        let queue = Arc::new(PlacementQueue::new());
        let overflow = OverflowLog::new(config.overflow_path.clone())?;

        Ok(MemoryService {
            scoring: ScoringEngine::new(Default::default(), config.decay.clone()),
            router: TierRouter::new(hot, warm, cold, config.router.clone()),
            review: ReviewScheduler::new(config.review.clone()),
            placement: PlacementEngine::new(config.placement.clone()),
            decay: DecayWorker::new(config.decay.clone(), config.forgetting.clone()),
            consolidation: ConsolidationEngine::new(config.consolidation.clone(), summarizer),
            forgetting: ForgettingEngine::new(config.forgetting.clone()),
            queue,
            overflow,
            embedder: self.embedder,
            query_cache: Mutex::new(EmbeddingCache::new(config.embedding_cache_bytes)),
            locks: IdLockTable::new(config.id_lock_idle),
            last_cycle_ms: Mutex::new(None),
            config,
        })
    }
}

// ============================================================================
// SERVICE
// ============================================================================

/// The memory service facade
///
/// Interior mutability throughout: every method takes `&self`, so the
/// service is shared as `Arc<MemoryService>` across retrieval callers and
/// the maintenance daemon.
pub struct MemoryService {
    config: CoreConfig,
    scoring: ScoringEngine,
    router: TierRouter,
    review: ReviewScheduler,
    placement: PlacementEngine,
    decay: DecayWorker,
    consolidation: ConsolidationEngine,
    forgetting: ForgettingEngine,
    queue: Arc<PlacementQueue>,
    overflow: OverflowLog,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    query_cache: Mutex<EmbeddingCache>,
    locks: IdLockTable,
    last_cycle_ms: Mutex<Option<i64>>,
}

impl MemoryService {
    /// Start building a service
    pub fn builder() -> MemoryServiceBuilder {
        MemoryServiceBuilder {
            config: CoreConfig::default(),
            hot: None,
            warm: None,
            cold: None,
            embedder: None,
            summarizer: None,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // CREATE
    // ------------------------------------------------------------------

    /// Create a record
    pub fn create(&self, input: CreateInput) -> Result<CreateReceipt> {
        self.create_at(input, Utc::now())
    }

    /// Create a record at an explicit instant
    pub fn create_at(&self, input: CreateInput, now: DateTime<Utc>) -> Result<CreateReceipt> {
        if input.content.len() > MAX_CONTENT_BYTES {
            return Err(MemoryError::InvalidInput(format!(
                "content is {} bytes, limit is {MAX_CONTENT_BYTES}",
                input.content.len()
            )));
        }
        validate_content_schema(input.memory_type, &input.content)
            .map_err(MemoryError::InvalidInput)?;
        if let Some(salience) = &input.salience {
            if !salience.is_valid() {
                return Err(MemoryError::InvalidInput(
                    "salience sub-scores must lie in [0, 10]".into(),
                ));
            }
        }
        if let Some(context) = &input.context_embedding {
            self.check_dimension(context)?;
        }

        let embedding = match input.embedding {
            Some(vector) => {
                self.check_dimension(&vector)?;
                Some(vector)
            }
            None => match &self.embedder {
                Some(embedder) => {
                    let vector = embedder.embed(&input.content);
                    self.check_dimension(&vector)?;
                    Some(vector)
                }
                None => None,
            },
        };

        let mut record = MemoryRecord::new(input.content, input.memory_type, now);
        record.tags = input.tags;
        record.salience = input.salience;
        record.embedding = embedding;
        record.privacy_markers = self.scoring.privacy_markers(&record.content, &record.tags);
        record.importance = self
            .scoring
            .importance(
                &record,
                input.salience.as_ref(),
                input.context_embedding.as_deref(),
                now,
            )
            .map_err(MemoryError::from)?;
        record.state = crate::memory::MemoryState::Active;
        if input.schedule_review {
            record.review_state = Some(self.review.initial_state(record.importance, now));
        }
        record.tier = self
            .router
            .initial_tier(record.importance, record.memory_type, &record.tags);
        record.tier_entered_at = now;

        match self.persist_with_fallback(&mut record) {
            Ok(tier) => {
                tracing::debug!(id = %record.id, tier = %tier, "record created");
                Ok(CreateReceipt {
                    id: record.id,
                    tier: Some(tier),
                    durability: Durability::Stored,
                })
            }
            Err(StoreError::Unavailable(_)) => {
                // Total tier failure never loses data
                self.overflow.append(&record)?;
                Ok(CreateReceipt {
                    id: record.id,
                    tier: None,
                    durability: Durability::Pending,
                })
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Try the record's tier, then the remaining tiers, on unavailability
    fn persist_with_fallback(&self, record: &mut MemoryRecord) -> std::result::Result<MemoryTier, StoreError> {
        let mut order = vec![record.tier];
        for tier in [MemoryTier::Hot, MemoryTier::Warm, MemoryTier::Cold] {
            if tier != record.tier {
                order.push(tier);
            }
        }

        let mut last_err = StoreError::Unavailable("no tier accepted the write".into());
        for tier in order {
            record.tier = tier;
            match self.router.write(record) {
                Ok(()) => return Ok(tier),
                Err(err @ StoreError::Unavailable(_)) => {
                    tracing::warn!(id = %record.id, tier = %tier, "tier refused write");
                    last_err = err;
                }
                Err(other) => return Err(other),
            }
        }
        Err(last_err)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.config.embedding_dim {
            return Err(MemoryError::InvalidInput(format!(
                "embedding dimension {} does not match deployment dimension {}",
                vector.len(),
                self.config.embedding_dim
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // GET
    // ------------------------------------------------------------------

    /// Fetch a record by id, reinforcing it as an access
    pub fn get(&self, id: &str) -> Result<MemoryRecord> {
        self.get_at(id, Utc::now())
    }

    /// Fetch at an explicit instant
    pub fn get_at(&self, id: &str, now: DateTime<Utc>) -> Result<MemoryRecord> {
        let _guard = self.locks.lock(id);
        let (mut record, tier) = self.router.lookup(id)?;

        if record.is_tombstone() {
            return Err(self.tombstone_error(&record, now));
        }

        self.scoring.reinforce(&mut record, now);
        if let Some(state) = record.review_state.clone() {
            if self.review.is_due(&state, now) {
                let mut state = state;
                self.review.on_review(&mut state, now);
                record.review_state = Some(state);
            }
        }

        if let Err(err) = self.router.store_for(tier).put(&record) {
            tracing::warn!(id, error = %err, "access write-back failed");
        }

        // A busy cold record is a promotion candidate; never block the read
        if tier == MemoryTier::Cold
            && record.access_count >= self.config.router.cold_hit_promotion_accesses
        {
            self.queue.push(record.id.clone());
        }
        Ok(record)
    }

    fn tombstone_error(&self, record: &MemoryRecord, now: DateTime<Utc>) -> MemoryError {
        let grace = chrono::Duration::from_std(self.config.forgetting.grace)
            .unwrap_or_else(|_| chrono::Duration::days(7));
        match record.forget_cause {
            Some(ForgetCause::Privacy) if !record.grace_elapsed(now, grace) => {
                MemoryError::PrivacyExpired(record.id.clone())
            }
            _ => MemoryError::NotFound(record.id.clone()),
        }
    }

    // ------------------------------------------------------------------
    // SEARCH
    // ------------------------------------------------------------------

    /// Search across tiers
    pub fn search(&self, query: SearchQuery) -> Result<SearchResponse> {
        self.search_at(query, Utc::now())
    }

    /// Search at an explicit instant
    pub fn search_at(&self, query: SearchQuery, now: DateTime<Utc>) -> Result<SearchResponse> {
        if query.k == 0 {
            return Err(MemoryError::InvalidInput("k must be positive".into()));
        }
        let embedding = self.query_embedding(&query.text)?;

        let request = SearchRequest {
            text: query.text.clone(),
            embedding,
            k: query.k,
            session_scope: query.session_scope,
            deadline: query.deadline,
        };

        // Due records rank by their boosted review priority instead of raw
        // importance
        let review = &self.review;
        let outcome: SearchOutcome = self.router.search(&request, |record| {
            let state = record.review_state.as_ref()?;
            review.is_due(state, now).then(|| review.context_priority(record, now))
        });

        let mut filter = RecordFilter::all();
        filter.memory_type = query.memory_type;
        filter.tag = query.tag.clone();
        filter.min_importance = query.min_importance;

        let mut results = Vec::new();
        for hit in outcome.hits {
            if !filter.matches(&hit.record) {
                continue;
            }
            let mut record = hit.record;
            // Remember how relevant this record just was; placement reads it
            record.last_relevance = Some(hit.relevance);
            record.last_relevance_at = Some(now);
            if let Err(err) = self.router.store_for(hit.tier).put(&record) {
                tracing::debug!(id = %record.id, error = %err, "relevance write-back failed");
            }
            results.push(SearchHit {
                record,
                relevance: hit.relevance,
                score: hit.score,
                tier: hit.tier,
            });
        }
        Ok(SearchResponse {
            results,
            partial: outcome.partial,
        })
    }

    fn query_embedding(&self, text: &str) -> Result<Option<Arc<Vec<f32>>>> {
        let Some(embedder) = &self.embedder else {
            return Ok(None);
        };
        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(entry) = cache.get(text) {
                return Ok(Some(entry.vector));
            }
        }
        let vector = embedder.embed(text);
        self.check_dimension(&vector)?;
        let entry = match self.query_cache.lock() {
            Ok(mut cache) => cache.insert(text.to_string(), vector).vector,
            Err(_) => Arc::new(vector),
        };
        Ok(Some(entry))
    }

    // ------------------------------------------------------------------
    // UPDATE / DELETE
    // ------------------------------------------------------------------

    /// Apply a partial update; content changes re-score the record
    pub fn update(&self, id: &str, patch: RecordPatch) -> Result<MemoryRecord> {
        self.update_at(id, patch, Utc::now())
    }

    /// Update at an explicit instant
    pub fn update_at(&self, id: &str, patch: RecordPatch, now: DateTime<Utc>) -> Result<MemoryRecord> {
        if patch.is_empty() {
            return Err(MemoryError::InvalidInput("empty patch".into()));
        }
        let _guard = self.locks.lock(id);
        let (mut record, tier) = self.router.lookup(id)?;
        if record.is_tombstone() {
            return Err(self.tombstone_error(&record, now));
        }

        let mut rescore = false;
        if let Some(tags) = patch.tags {
            record.tags = tags;
            rescore = true;
        }
        if let Some(salience) = patch.salience {
            if !salience.is_valid() {
                return Err(MemoryError::InvalidInput(
                    "salience sub-scores must lie in [0, 10]".into(),
                ));
            }
            record.salience = Some(salience);
            rescore = true;
        }
        if let Some(embedding) = patch.embedding {
            self.check_dimension(&embedding)?;
            record.embedding = Some(embedding);
        }
        if let Some(content) = patch.content {
            if content.len() > MAX_CONTENT_BYTES {
                return Err(MemoryError::InvalidInput(format!(
                    "content is {} bytes, limit is {MAX_CONTENT_BYTES}",
                    content.len()
                )));
            }
            validate_content_schema(record.memory_type, &content)
                .map_err(MemoryError::InvalidInput)?;
            record.content = content;
            if let Some(embedder) = &self.embedder {
                let vector = embedder.embed(&record.content);
                self.check_dimension(&vector)?;
                record.embedding = Some(vector);
            }
            rescore = true;
        }

        if rescore {
            record.privacy_markers = self.scoring.privacy_markers(&record.content, &record.tags);
            record.importance = self
                .scoring
                .importance(&record, None, None, now)
                .map_err(MemoryError::from)?;
        }

        self.router.store_for(tier).put(&record)?;
        tracing::debug!(id, rescored = rescore, "record updated");
        Ok(record)
    }

    /// Delete a record: soft (tombstone) by default, hard with `force`
    pub fn delete(&self, id: &str, force: bool) -> Result<()> {
        self.delete_at(id, force, Utc::now())
    }

    /// Delete at an explicit instant
    pub fn delete_at(&self, id: &str, force: bool, now: DateTime<Utc>) -> Result<()> {
        let _guard = self.locks.lock(id);
        let (mut record, tier) = self.router.lookup(id)?;

        if force {
            self.router.store_for(tier).delete(id)?;
            tracing::info!(id, "record hard-deleted");
            return Ok(());
        }
        if record.is_tombstone() {
            return Ok(());
        }
        if self.forgetting.is_never_forget(&record) {
            return Err(MemoryError::Conflict(format!(
                "{id} is protected from deletion; use force"
            )));
        }
        record.tombstone(ForgetCause::Manual, now);
        self.router.store_for(tier).put(&record)?;
        tracing::info!(id, "record tombstoned");
        Ok(())
    }

    // ------------------------------------------------------------------
    // STATS
    // ------------------------------------------------------------------

    /// System statistics
    pub fn stats(&self) -> Result<MemoryStats> {
        self.stats_at(Utc::now())
    }

    /// Statistics at an explicit instant
    pub fn stats_at(&self, now: DateTime<Utc>) -> Result<MemoryStats> {
        let mut stats = MemoryStats {
            collected_at: Some(now),
            overflow_depth: self.overflow.depth(),
            last_cycle_ms: self.last_cycle_ms.lock().ok().and_then(|v| *v),
            ..Default::default()
        };

        for tier in [MemoryTier::Hot, MemoryTier::Warm, MemoryTier::Cold] {
            let tier_stats = self.tier_stats(tier)?;
            match tier {
                MemoryTier::Hot => stats.hot = tier_stats,
                MemoryTier::Warm => stats.warm = tier_stats,
                MemoryTier::Cold => stats.cold = tier_stats,
            }
        }
        Ok(stats)
    }

    fn tier_stats(&self, tier: MemoryTier) -> Result<TierStats> {
        let records = match self.router.store_for(tier).list_by_filter(&RecordFilter::all()) {
            Ok(records) => records,
            Err(StoreError::Unavailable(_)) => Vec::new(),
            Err(other) => return Err(other.into()),
        };
        Ok(TierStats {
            records: records.len() as u64,
            bytes: records.iter().map(|r| r.approximate_bytes()).sum(),
            avg_latency_ms: self.router.latency_ms(tier),
        })
    }

    // ------------------------------------------------------------------
    // MAINTENANCE
    // ------------------------------------------------------------------

    /// Run one maintenance cycle now
    pub fn run_maintenance(&self) -> CycleReport {
        self.run_maintenance_at(Utc::now())
    }

    /// Run one maintenance cycle at an explicit instant
    ///
    /// Phase order is load-bearing: decay before consolidation, then
    /// forgetting, then placement.
    pub fn run_maintenance_at(&self, now: DateTime<Utc>) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();
        let maintenance = &self.config.maintenance;

        report.overflow_drained = match self.overflow.drain(|mut record| {
            self.persist_with_fallback(&mut record).is_ok()
        }) {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(error = %err, "overflow drain failed");
                0
            }
        };

        let mut budget = PhaseBudget::new(maintenance.phase_budget, maintenance.yield_every_records);
        report.decay = self
            .decay
            .run_tick(&self.router, &self.scoring, &self.queue, now, &mut budget);

        let mut budget = PhaseBudget::new(maintenance.phase_budget, maintenance.yield_every_records);
        report.review = self.review.refresh(&self.router, now, &mut budget);

        if let Some(consolidation) = self.maybe_consolidate(now) {
            report.consolidation = Some(consolidation);
        }

        let mut budget = PhaseBudget::new(maintenance.phase_budget, maintenance.yield_every_records);
        report.forgetting = self
            .forgetting
            .run_cycle(&self.router, &self.scoring, now, &mut budget);

        let mut budget = PhaseBudget::new(maintenance.phase_budget, maintenance.yield_every_records);
        report.placement =
            self.placement
                .run_cycle(&self.router, &self.locks, &self.queue, now, &mut budget);

        report.duration_ms = started.elapsed().as_millis() as i64;
        if let Ok(mut last) = self.last_cycle_ms.lock() {
            *last = Some(report.duration_ms);
        }
        tracing::info!(
            duration_ms = report.duration_ms,
            decayed = report.decay.decayed,
            moved = report.placement.moved,
            expired = report.forgetting.expired,
            "maintenance cycle complete"
        );
        report
    }

    fn maybe_consolidate(&self, now: DateTime<Utc>) -> Option<crate::consolidation::ConsolidationReport> {
        let mut total_records = 0u64;
        for tier in [MemoryTier::Hot, MemoryTier::Warm, MemoryTier::Cold] {
            total_records += self.router.store_for(tier).count().unwrap_or(0);
        }
        let mut hot_warm_bytes = 0u64;
        for tier in [MemoryTier::Hot, MemoryTier::Warm] {
            if let Ok(records) = self.router.store_for(tier).list_by_filter(&RecordFilter::all()) {
                hot_warm_bytes += records.iter().map(|r| r.approximate_bytes()).sum::<u64>();
            }
        }

        if !self.consolidation.should_run(total_records, hot_warm_bytes, now) {
            return None;
        }
        let maintenance = &self.config.maintenance;
        let mut budget = PhaseBudget::new(maintenance.phase_budget, maintenance.yield_every_records);
        Some(self.consolidation.run_cycle(&self.router, now, &mut budget))
    }

    /// Ids queued for placement review (diagnostic hook)
    pub fn placement_queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Scheduled records currently due, highest priority first
    pub fn due_reviews(&self, limit: usize) -> Vec<(MemoryRecord, f64)> {
        self.due_reviews_at(limit, Utc::now())
    }

    /// Due reviews at an explicit instant
    pub fn due_reviews_at(&self, limit: usize, now: DateTime<Utc>) -> Vec<(MemoryRecord, f64)> {
        self.review.due_now(&self.router, limit, now)
    }
}

// ============================================================================
// TESTS
// ============================================================================
