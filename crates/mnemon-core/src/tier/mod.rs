//! Tier router
//!
//! Chooses the tier for writes, fans reads out hot→warm→cold, and runs the
//! parallel search fan-out under a deadline. Merging uses
//! `0.6·relevance + 0.4·importance`; callers may substitute the importance
//! leg per record (the review scheduler does, for due records).

use std::collections::{BTreeSet, HashMap};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::RouterConfig;
use crate::embedding::{cosine_similarity, relevance_from_cosine};
use crate::memory::{MemoryRecord, MemoryTier, MemoryType};
use crate::store::{MemoryStore, RecordFilter, ScoredRecord, StoreError, StoreResult};

/// Weight of relevance in the merge score
const RELEVANCE_WEIGHT: f64 = 0.6;
/// Weight of importance (or substituted priority) in the merge score
const IMPORTANCE_WEIGHT: f64 = 0.4;
/// Per-leg fetch multiplier, headroom for post-merge filtering
const FETCH_MULTIPLIER: usize = 2;

// ============================================================================
// LATENCY TRACKING
// ============================================================================

/// Exponentially weighted moving average of backend latency
#[derive(Debug, Default)]
struct Ewma {
    value: Option<f64>,
}

impl Ewma {
    const ALPHA: f64 = 0.2;

    fn observe(&mut self, sample_ms: f64) {
        self.value = Some(match self.value {
            Some(prev) => Self::ALPHA * sample_ms + (1.0 - Self::ALPHA) * prev,
            None => sample_ms,
        });
    }

    fn get(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }
}

// ============================================================================
// SEARCH TYPES
// ============================================================================

/// A search request against the router
#[derive(Clone)]
pub struct SearchRequest {
    /// Query text, used by keyword legs
    pub text: String,
    /// Query embedding, used by vector legs
    pub embedding: Option<Arc<Vec<f32>>>,
    /// Result count after merging
    pub k: usize,
    /// Also query the hot tier
    pub session_scope: bool,
    /// Total fan-out deadline; the router default applies when absent
    pub deadline: Option<Duration>,
}

impl SearchRequest {
    /// Plain text request
    pub fn text(text: impl Into<String>, k: usize) -> Self {
        Self {
            text: text.into(),
            embedding: None,
            k,
            session_scope: false,
            deadline: None,
        }
    }
}

/// One merged search hit
#[derive(Debug, Clone)]
pub struct TierHit {
    /// The matched record
    pub record: MemoryRecord,
    /// Normalized relevance from the winning leg
    pub relevance: f64,
    /// Merge score the hit was ranked by
    pub score: f64,
    /// Tier the hit came from
    pub tier: MemoryTier,
}

/// Merged fan-out result
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Hits, best first
    pub hits: Vec<TierHit>,
    /// True when a tier timed out or was unavailable
    pub partial: bool,
}

// ============================================================================
// TIER ROUTER
// ============================================================================

/// Routes reads and writes across the three tiers
pub struct TierRouter {
    hot: Arc<dyn MemoryStore>,
    warm: Arc<dyn MemoryStore>,
    cold: Arc<dyn MemoryStore>,
    config: RouterConfig,
    latency: [Mutex<Ewma>; 3],
}

impl TierRouter {
    /// Create a router over three backends
    pub fn new(
        hot: Arc<dyn MemoryStore>,
        warm: Arc<dyn MemoryStore>,
        cold: Arc<dyn MemoryStore>,
        config: RouterConfig,
    ) -> Self {
        Self {
            hot,
            warm,
            cold,
            config,
            latency: [
                Mutex::new(Ewma::default()),
                Mutex::new(Ewma::default()),
                Mutex::new(Ewma::default()),
            ],
        }
    }

    /// Backend serving a tier
    pub fn store_for(&self, tier: MemoryTier) -> &Arc<dyn MemoryStore> {
        match tier {
            MemoryTier::Hot => &self.hot,
            MemoryTier::Warm => &self.warm,
            MemoryTier::Cold => &self.cold,
        }
    }

    /// Current latency EWMA for a tier, in milliseconds
    pub fn latency_ms(&self, tier: MemoryTier) -> f64 {
        self.latency[tier_index(tier)]
            .lock()
            .map(|e| e.get())
            .unwrap_or(0.0)
    }

    fn observe_latency(&self, tier: MemoryTier, elapsed: Duration) {
        if let Ok(mut ewma) = self.latency[tier_index(tier)].lock() {
            ewma.observe(elapsed.as_secs_f64() * 1000.0);
        }
    }

    /// Initial tier for a write
    ///
    /// Importance thresholds, with a type/tag override to hot for working
    /// memory and session-active records.
    pub fn initial_tier(
        &self,
        importance: f64,
        memory_type: MemoryType,
        tags: &BTreeSet<String>,
    ) -> MemoryTier {
        if memory_type == MemoryType::Working || tags.contains("session_active") {
            return MemoryTier::Hot;
        }
        if importance >= self.config.hot_importance {
            MemoryTier::Hot
        } else if importance >= self.config.warm_importance {
            MemoryTier::Warm
        } else {
            MemoryTier::Cold
        }
    }

    /// Persist a record to its tier (exactly one; never mirrored)
    pub fn write(&self, record: &MemoryRecord) -> StoreResult<()> {
        let start = Instant::now();
        let result = self.store_for(record.tier).put(record);
        self.observe_latency(record.tier, start.elapsed());
        result
    }

    /// Fetch by id, fanning hot→warm→cold
    ///
    /// Misses fan out; unavailable tiers are skipped, and reported only when
    /// the id is found nowhere else.
    pub fn lookup(&self, id: &str) -> StoreResult<(MemoryRecord, MemoryTier)> {
        let mut unavailable: Option<StoreError> = None;
        for tier in [MemoryTier::Hot, MemoryTier::Warm, MemoryTier::Cold] {
            let start = Instant::now();
            let result = self.store_for(tier).get_by_id(id);
            self.observe_latency(tier, start.elapsed());
            match result {
                Ok(record) => return Ok((record, tier)),
                Err(StoreError::NotFound(_)) => continue,
                Err(err @ StoreError::Unavailable(_)) => {
                    unavailable = Some(err);
                }
                Err(other) => return Err(other),
            }
        }
        Err(unavailable.unwrap_or_else(|| StoreError::NotFound(id.to_string())))
    }

    /// Parallel search fan-out
    ///
    /// Queries warm (vector) and cold (keyword), plus hot under session
    /// scope. `weight_override` may substitute the importance leg of the
    /// merge score per record; return `None` to keep importance.
    pub fn search(
        &self,
        request: &SearchRequest,
        weight_override: impl Fn(&MemoryRecord) -> Option<f64>,
    ) -> SearchOutcome {
        let deadline = request.deadline.unwrap_or(self.config.search_deadline);
        let started = Instant::now();
        let fetch_k = request.k.saturating_mul(FETCH_MULTIPLIER).max(1);

        let mut legs: Vec<(MemoryTier, Arc<dyn MemoryStore>)> = vec![
            (MemoryTier::Warm, Arc::clone(&self.warm)),
            (MemoryTier::Cold, Arc::clone(&self.cold)),
        ];
        if request.session_scope {
            legs.push((MemoryTier::Hot, Arc::clone(&self.hot)));
        }
        let expected = legs.len();

        let (tx, rx) = mpsc::channel();
        for (tier, store) in legs {
            let tx = tx.clone();
            let request = request.clone();
            let sample = self.config.brute_force_sample;
            std::thread::spawn(move || {
                let leg_start = Instant::now();
                let result = run_leg(store.as_ref(), tier, &request, fetch_k, sample);
                // Receiver may be gone after the deadline; nothing to do then
                let _ = tx.send((tier, result, leg_start.elapsed()));
            });
        }
        drop(tx);

        let mut merged: HashMap<String, TierHit> = HashMap::new();
        let mut responded = 0usize;
        let mut partial = false;

        while responded < expected {
            let remaining = deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            match rx.recv_timeout(remaining) {
                Ok((tier, result, elapsed)) => {
                    responded += 1;
                    self.observe_latency(tier, elapsed);
                    match result {
                        Ok(scored) => merge_hits(&mut merged, scored, tier, &weight_override),
                        Err(StoreError::Unavailable(msg)) => {
                            tracing::warn!(tier = %tier, error = %msg, "search leg unavailable");
                            partial = true;
                        }
                        Err(err) => {
                            tracing::warn!(tier = %tier, error = %err, "search leg failed");
                            partial = true;
                        }
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => break,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        if responded < expected {
            tracing::debug!(
                responded,
                expected,
                "search deadline elapsed with legs outstanding"
            );
            partial = true;
        }

        let mut hits: Vec<TierHit> = merged.into_values().collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.record.id.cmp(&b.record.id)));
        hits.truncate(request.k);
        SearchOutcome { hits, partial }
    }
}

fn tier_index(tier: MemoryTier) -> usize {
    match tier {
        MemoryTier::Hot => 0,
        MemoryTier::Warm => 1,
        MemoryTier::Cold => 2,
    }
}

/// Run one tier's leg of the fan-out
///
/// Warm and hot legs prefer vector search when an embedding is available
/// (native, or brute-force cosine over a sampled window when the backend
/// lacks the capability). The cold leg is keyword/text search. A
/// token-overlap scan is the last resort for either modality.
fn run_leg(
    store: &dyn MemoryStore,
    tier: MemoryTier,
    request: &SearchRequest,
    fetch_k: usize,
    sample: usize,
) -> StoreResult<Vec<ScoredRecord>> {
    if tier != MemoryTier::Cold {
        if let Some(embedding) = request.embedding.as_deref() {
            match store.vector_search(embedding, fetch_k) {
                Ok(hits) => return Ok(hits),
                Err(StoreError::Unsupported(_)) => {
                    return brute_force_cosine(store, embedding, fetch_k, sample);
                }
                Err(other) => return Err(other),
            }
        }
    }
    match store.keyword_search(&request.text, fetch_k) {
        Ok(hits) => Ok(hits),
        Err(StoreError::Unsupported(_)) => {
            tracing::debug!(tier = %tier, "keyword search unsupported, scanning");
            token_overlap_scan(store, &request.text, fetch_k, sample)
        }
        Err(other) => Err(other),
    }
}

/// Brute-force cosine over a sampled window, for backends without native
/// vector search
fn brute_force_cosine(
    store: &dyn MemoryStore,
    query: &[f32],
    fetch_k: usize,
    sample: usize,
) -> StoreResult<Vec<ScoredRecord>> {
    let records = store.list_by_filter(&RecordFilter::all().with_limit(sample))?;
    let mut scored: Vec<ScoredRecord> = records
        .into_iter()
        .filter_map(|record| {
            let embedding = record.embedding.as_deref()?;
            if embedding.len() != query.len() {
                return None;
            }
            let score = relevance_from_cosine(cosine_similarity(embedding, query));
            Some(ScoredRecord { record, score })
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(fetch_k);
    Ok(scored)
}

/// Token-overlap scan, the last-resort text leg
fn token_overlap_scan(
    store: &dyn MemoryStore,
    text: &str,
    fetch_k: usize,
    sample: usize,
) -> StoreResult<Vec<ScoredRecord>> {
    let terms: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
    if terms.is_empty() {
        return Ok(Vec::new());
    }
    let records = store.list_by_filter(&RecordFilter::all().with_limit(sample))?;
    let mut scored: Vec<ScoredRecord> = records
        .into_iter()
        .filter_map(|record| {
            let content = record.content.to_lowercase();
            let hits = terms.iter().filter(|t| content.contains(t.as_str())).count();
            if hits == 0 {
                return None;
            }
            let score = hits as f64 / terms.len() as f64;
            Some(ScoredRecord { record, score })
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(fetch_k);
    Ok(scored)
}

fn merge_hits(
    merged: &mut HashMap<String, TierHit>,
    scored: Vec<ScoredRecord>,
    tier: MemoryTier,
    weight_override: &impl Fn(&MemoryRecord) -> Option<f64>,
) {
    for ScoredRecord { record, score: relevance } in scored {
        let weight = weight_override(&record).unwrap_or(record.importance);
        let score = RELEVANCE_WEIGHT * relevance + IMPORTANCE_WEIGHT * weight;
        let entry = merged.entry(record.id.clone());
        match entry {
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                // Duplicates across tiers happen only mid-move; keep the
                // better-scored copy
                if score > slot.get().score {
                    slot.insert(TierHit {
                        record,
                        relevance,
                        score,
                        tier,
                    });
                }
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(TierHit {
                    record,
                    relevance,
                    score,
                    tier,
                });
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
