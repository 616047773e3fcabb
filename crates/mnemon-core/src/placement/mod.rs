//! Placement engine
//!
//! Evaluates promotion/demotion rules once per maintenance cycle and
//! executes tier moves. A move is `put(dest) → verify → delete(src)` with
//! bounded retries; a surviving source copy is tolerated and resolved by the
//! reconciliation pass of the next cycle, which trusts the destination.

use std::collections::BTreeSet;
use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::config::PlacementConfig;
use crate::locks::IdLockTable;
use crate::maintenance::PhaseBudget;
use crate::memory::{MemoryState, MemoryTier};
use crate::store::{RecordFilter, StoreError, StoreResult};
use crate::tier::TierRouter;

// ============================================================================
// QUEUE AND LEDGER
// ============================================================================

/// Ids awaiting a placement review in the next cycle
///
/// Fed by cold-hit promotions and by decay-driven state transitions.
#[derive(Default)]
pub struct PlacementQueue {
    ids: Mutex<BTreeSet<String>>,
}

impl PlacementQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an id; duplicates collapse
    pub fn push(&self, id: impl Into<String>) {
        if let Ok(mut ids) = self.ids.lock() {
            ids.insert(id.into());
        }
    }

    /// Take every queued id
    pub fn drain(&self) -> Vec<String> {
        match self.ids.lock() {
            Ok(mut ids) => std::mem::take(&mut *ids).into_iter().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Queued id count
    pub fn len(&self) -> usize {
        self.ids.lock().map(|ids| ids.len()).unwrap_or(0)
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A move whose source delete did not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    /// Record id
    pub id: String,
    /// Tier still holding the stale copy
    pub src: MemoryTier,
    /// Tier holding the authoritative copy
    pub dest: MemoryTier,
}

// ============================================================================
// DECISIONS
// ============================================================================

/// Outcome of evaluating one record against the rule table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementDecision {
    /// The record stays where it is
    Stay,
    /// The record moves to the given tier
    Move(MemoryTier),
}

/// Report of one placement pass
#[derive(Debug, Clone, Default)]
pub struct PlacementReport {
    /// Records evaluated
    pub evaluated: usize,
    /// Moves completed
    pub moved: usize,
    /// Pending moves resolved by reconciliation
    pub reconciled: usize,
    /// Moves abandoned after retries
    pub failed: usize,
    /// True when the phase budget ran out before the scan finished
    pub yielded: bool,
}

// ============================================================================
// PLACEMENT ENGINE
// ============================================================================

/// Applies the promotion/demotion rule table and executes moves
pub struct PlacementEngine {
    config: PlacementConfig,
    ledger: Mutex<Vec<PendingMove>>,
}

impl PlacementEngine {
    /// Create an engine with the given tunables
    pub fn new(config: PlacementConfig) -> Self {
        Self {
            config,
            ledger: Mutex::new(Vec::new()),
        }
    }

    /// Pending moves awaiting reconciliation (diagnostic hook)
    pub fn pending_moves(&self) -> Vec<PendingMove> {
        self.ledger.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Evaluate the rule table for one record
    pub fn evaluate(
        &self,
        record: &crate::memory::MemoryRecord,
        now: DateTime<Utc>,
    ) -> PlacementDecision {
        if record.is_tombstone() {
            return PlacementDecision::Stay;
        }
        let cfg = &self.config;

        match record.tier {
            MemoryTier::Hot => {
                // Records that are no longer active have no business in hot
                if record.state != MemoryState::Active {
                    return PlacementDecision::Move(MemoryTier::Warm);
                }
                let elapsed = (now - record.tier_entered_at)
                    .to_std()
                    .unwrap_or_default();
                let accesses = record.accesses_in_tier();
                let ttl = std::cmp::min(
                    cfg.hot_ttl_base + cfg.hot_ttl_per_access * accesses,
                    cfg.hot_ttl_cap,
                );
                let ttl_expired = elapsed >= ttl;
                let under_accessed =
                    elapsed >= cfg.hot_ttl_base && accesses < cfg.hot_min_accesses;
                if ttl_expired || under_accessed {
                    PlacementDecision::Move(MemoryTier::Warm)
                } else {
                    PlacementDecision::Stay
                }
            }
            MemoryTier::Warm => {
                let day_accesses = record.accesses_since(now - ChronoDuration::hours(24));
                if day_accesses >= cfg.warm_promote_accesses
                    && record.strength >= cfg.warm_promote_min_strength
                {
                    return PlacementDecision::Move(MemoryTier::Hot);
                }
                let idle_cutoff = now - ChronoDuration::days(cfg.warm_demote_idle_days);
                let aged_out = record.age_days(now) > cfg.warm_demote_age_days as f64
                    && record.accesses_since(idle_cutoff) == 0;
                if record.strength < cfg.warm_demote_strength || aged_out {
                    PlacementDecision::Move(MemoryTier::Cold)
                } else {
                    PlacementDecision::Stay
                }
            }
            MemoryTier::Cold => {
                let week_accesses = record.accesses_since(now - ChronoDuration::days(7));
                let relevant = match (record.last_relevance, record.last_relevance_at) {
                    (Some(relevance), Some(at)) => {
                        relevance >= cfg.cold_promote_relevance
                            && (now - at).to_std().unwrap_or_default() <= cfg.relevance_window
                    }
                    _ => false,
                };
                if week_accesses >= cfg.cold_promote_accesses || relevant {
                    PlacementDecision::Move(MemoryTier::Warm)
                } else {
                    PlacementDecision::Stay
                }
            }
        }
    }

    /// Execute a tier move under the record's id mutex
    ///
    /// Returns `Ok(true)` when the record moved, `Ok(false)` when it was
    /// already at the destination.
    pub fn execute_move(
        &self,
        router: &TierRouter,
        locks: &IdLockTable,
        id: &str,
        dest: MemoryTier,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let _guard = locks.lock(id);

        let (mut record, src) = router.lookup(id)?;
        if src == dest {
            return Ok(false);
        }
        record.tier = dest;
        record.tier_entered_at = now;

        let dest_store = router.store_for(dest);
        self.with_retries(|| dest_store.put(&record))?;
        self.with_retries(|| dest_store.get_by_id(id).map(|_| ()))?;

        let src_store = router.store_for(src);
        if let Err(err) = self.with_retries(|| src_store.delete(id)) {
            tracing::warn!(
                id,
                src = %src,
                dest = %dest,
                error = %err,
                "source delete failed after retries; duplicate tolerated until reconciliation"
            );
            if let Ok(mut ledger) = self.ledger.lock() {
                ledger.push(PendingMove {
                    id: id.to_string(),
                    src,
                    dest,
                });
            }
        }
        tracing::debug!(id, src = %src, dest = %dest, "tier move complete");
        Ok(true)
    }

    /// Resolve pending moves by trusting the destination and retrying the
    /// source delete
    pub fn reconcile(&self, router: &TierRouter) -> usize {
        let pending = match self.ledger.lock() {
            Ok(mut ledger) => std::mem::take(&mut *ledger),
            Err(_) => return 0,
        };

        let mut resolved = 0;
        for pending_move in pending {
            let src_store = router.store_for(pending_move.src);
            match self.with_retries(|| src_store.delete(&pending_move.id)) {
                Ok(()) => resolved += 1,
                Err(err) => {
                    tracing::warn!(
                        id = %pending_move.id,
                        error = %err,
                        "reconciliation delete still failing"
                    );
                    if let Ok(mut ledger) = self.ledger.lock() {
                        ledger.push(pending_move);
                    }
                }
            }
        }
        resolved
    }

    /// One placement pass: reconcile, drain the review queue, then scan
    pub fn run_cycle(
        &self,
        router: &TierRouter,
        locks: &IdLockTable,
        queue: &PlacementQueue,
        now: DateTime<Utc>,
        budget: &mut PhaseBudget,
    ) -> PlacementReport {
        let mut report = PlacementReport {
            reconciled: self.reconcile(router),
            ..Default::default()
        };

        // Queued ids first: these are reads and decay transitions that
        // explicitly asked for review
        for id in queue.drain() {
            if budget.should_yield() {
                report.yielded = true;
                return report;
            }
            budget.charge(1);
            self.review_one(router, locks, &id, now, &mut report);
        }

        for tier in [MemoryTier::Hot, MemoryTier::Warm, MemoryTier::Cold] {
            let filter = RecordFilter::all().with_limit(budget.records_remaining());
            let records = match router.store_for(tier).list_by_filter(&filter) {
                Ok(records) => records,
                Err(err) => {
                    tracing::warn!(tier = %tier, error = %err, "placement scan skipped tier");
                    continue;
                }
            };
            for record in records {
                if budget.should_yield() {
                    report.yielded = true;
                    return report;
                }
                budget.charge(1);
                report.evaluated += 1;
                if let PlacementDecision::Move(dest) = self.evaluate(&record, now) {
                    match self.execute_move(router, locks, &record.id, dest, now) {
                        Ok(true) => report.moved += 1,
                        Ok(false) => {}
                        Err(err) => {
                            tracing::warn!(id = %record.id, error = %err, "tier move failed");
                            report.failed += 1;
                        }
                    }
                }
            }
        }
        report
    }

    fn review_one(
        &self,
        router: &TierRouter,
        locks: &IdLockTable,
        id: &str,
        now: DateTime<Utc>,
        report: &mut PlacementReport,
    ) {
        let Ok((record, _)) = router.lookup(id) else {
            return;
        };
        report.evaluated += 1;
        if let PlacementDecision::Move(dest) = self.evaluate(&record, now) {
            match self.execute_move(router, locks, id, dest, now) {
                Ok(true) => report.moved += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(id, error = %err, "queued tier move failed");
                    report.failed += 1;
                }
            }
        }
    }

    /// Run an operation with the configured backoff schedule
    ///
    /// The schedule length caps the retry count; `InvalidInput`-class errors
    /// do not occur at this layer, so every failure is retried.
    fn with_retries<T>(&self, mut op: impl FnMut() -> StoreResult<T>) -> StoreResult<T> {
        let mut last_err: Option<StoreError> = None;
        for attempt in 0..=self.config.retry_backoff.len() {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if let Some(delay) = self.config.retry_backoff.get(attempt) {
                        std::thread::sleep(*delay);
                    }
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| StoreError::Unavailable("retries exhausted".into())))
    }
}

// ============================================================================
// TESTS
// ============================================================================
