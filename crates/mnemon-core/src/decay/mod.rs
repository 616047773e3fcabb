//! Decay worker
//!
//! Periodically applies the strength decay and state-threshold transitions.
//! Records are self-cursoring: `last_decayed` advances on every application,
//! so a tick that yields picks up where it left off on the next cycle.

use chrono::{DateTime, Utc};

use crate::config::{DecayConfig, ForgettingConfig};
use crate::maintenance::PhaseBudget;
use crate::memory::{ForgetCause, MemoryState, MemoryTier};
use crate::placement::PlacementQueue;
use crate::scoring::ScoringEngine;
use crate::store::RecordFilter;
use crate::tier::TierRouter;

/// Report of one decay tick
#[derive(Debug, Clone, Default)]
pub struct DecayReport {
    /// Records inspected
    pub scanned: usize,
    /// Records whose strength was updated
    pub decayed: usize,
    /// State transitions applied
    pub transitions: usize,
    /// Records tombstoned because strength fell below the floor
    pub deleted: usize,
    /// True when the budget ran out before the scan finished
    pub yielded: bool,
}

/// Applies decay and state transitions in bounded batches
pub struct DecayWorker {
    config: DecayConfig,
    forgetting: ForgettingConfig,
}

impl DecayWorker {
    /// Create a worker
    ///
    /// The forgetting config supplies the never-forget thresholds that gate
    /// the deleted-state floor.
    pub fn new(config: DecayConfig, forgetting: ForgettingConfig) -> Self {
        Self { config, forgetting }
    }

    /// Run one tick across all tiers
    pub fn run_tick(
        &self,
        router: &TierRouter,
        scoring: &ScoringEngine,
        queue: &PlacementQueue,
        now: DateTime<Utc>,
        budget: &mut PhaseBudget,
    ) -> DecayReport {
        let mut report = DecayReport::default();
        let min_interval =
            chrono::Duration::from_std(self.config.min_interval).unwrap_or(chrono::Duration::days(1));
        let mut processed = 0usize;

        'tiers: for tier in [MemoryTier::Hot, MemoryTier::Warm, MemoryTier::Cold] {
            let store = router.store_for(tier);
            // Over-fetch so records decayed moments ago don't crowd out due
            // ones; due-ness is re-checked per record
            let filter = RecordFilter::all().with_limit(self.config.batch_size * 2);
            let records = match store.list_by_filter(&filter) {
                Ok(records) => records,
                Err(err) => {
                    tracing::warn!(tier = %tier, error = %err, "decay scan skipped tier");
                    continue;
                }
            };

            for mut record in records {
                if processed >= self.config.batch_size || budget.should_yield() {
                    report.yielded = true;
                    break 'tiers;
                }
                report.scanned += 1;
                if now - record.last_decayed < min_interval {
                    continue;
                }
                budget.charge(1);
                processed += 1;

                scoring.apply_decay(&mut record, now);
                report.decayed += 1;

                let never_forget = record.is_never_forget(
                    self.forgetting.never_forget_importance,
                    self.forgetting.never_forget_accesses,
                );
                let new_state = MemoryState::for_strength(record.strength, never_forget);
                let old_state = record.state;
                if new_state != old_state {
                    record.state = new_state;
                    report.transitions += 1;
                    if new_state == MemoryState::Deleted {
                        record.tombstone(ForgetCause::Decayed, now);
                        report.deleted += 1;
                    } else {
                        // Residency may no longer match the new state; let
                        // placement re-evaluate next
                        queue.push(record.id.clone());
                    }
                    tracing::debug!(
                        id = %record.id,
                        from = %old_state,
                        to = %new_state,
                        strength = record.strength,
                        "decay state transition"
                    );
                }

                if let Err(err) = store.put(&record) {
                    tracing::warn!(id = %record.id, error = %err, "decay write-back failed");
                }
            }
        }
        report
    }
}

// ============================================================================
// TESTS
// ============================================================================
