//! Review scheduler
//!
//! Spaced-repetition scheduling in the SM-2 family: an easiness factor
//! seeded from importance, a floor of six days when scheduling the second
//! review, multiplicative growth after. Priority blends overdue-ness,
//! importance, and weakness; context queries boost due records.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::config::ReviewConfig;
use crate::maintenance::PhaseBudget;
use crate::memory::{MemoryRecord, MemoryTier, ReviewState};
use crate::store::RecordFilter;
use crate::tier::TierRouter;

/// Report of one review refresh pass
#[derive(Debug, Clone, Default)]
pub struct ReviewReport {
    /// Scheduled records inspected
    pub scanned: usize,
    /// Records currently due
    pub due: usize,
    /// Schedules repaired so `next_review_at >= last_accessed`
    pub repaired: usize,
    /// True when the budget ran out before the scan finished
    pub yielded: bool,
}

/// Spaced-repetition scheduler
pub struct ReviewScheduler {
    config: ReviewConfig,
}

impl Default for ReviewScheduler {
    fn default() -> Self {
        Self::new(ReviewConfig::default())
    }
}

impl ReviewScheduler {
    /// Create a scheduler
    pub fn new(config: ReviewConfig) -> Self {
        Self { config }
    }

    /// Initialize scheduling state at create time
    pub fn initial_state(&self, importance: f64, now: DateTime<Utc>) -> ReviewState {
        let easiness = (self.config.min_easiness + self.config.easiness_span * importance)
            .clamp(self.config.min_easiness, self.config.max_easiness);
        ReviewState {
            interval_days: self.config.first_interval_days,
            easiness_factor: easiness,
            next_review_at: now + days_to_duration(self.config.first_interval_days),
            review_count: 0,
        }
    }

    /// Whether the schedule is due at `now`
    pub fn is_due(&self, state: &ReviewState, now: DateTime<Utc>) -> bool {
        state.next_review_at <= now
    }

    /// Record a successful review (an access or explicit acknowledgement)
    ///
    /// The second review is scheduled at least six days out; every later
    /// review multiplies the interval by the easiness factor.
    pub fn on_review(&self, state: &mut ReviewState, now: DateTime<Utc>) {
        state.review_count += 1;
        state.interval_days = if state.review_count == 1 {
            (state.interval_days * state.easiness_factor).max(self.config.second_interval_floor)
        } else {
            state.interval_days * state.easiness_factor
        };
        state.next_review_at = now + days_to_duration(state.interval_days);
    }

    /// Review priority for a scheduled record
    ///
    /// `0.4·overdue + 0.3·importance + 0.3·(1 − strength)`, with overdue
    /// saturating on a log curve over the configured base.
    pub fn priority(&self, record: &MemoryRecord, now: DateTime<Utc>) -> f64 {
        let Some(state) = &record.review_state else {
            return 0.0;
        };
        let days_overdue =
            ((now - state.next_review_at).num_seconds().max(0) as f64 / 86400.0).max(0.0);
        let overdue =
            ((1.0 + days_overdue).ln() / self.config.overdue_log_base.ln()).clamp(0.0, 1.0);
        0.4 * overdue + 0.3 * record.importance + 0.3 * (1.0 - record.strength)
    }

    /// Priority under a context query: boosted when due
    pub fn context_priority(&self, record: &MemoryRecord, now: DateTime<Utc>) -> f64 {
        let base = self.priority(record, now);
        match &record.review_state {
            Some(state) if self.is_due(state, now) => self.config.due_boost * base,
            _ => base,
        }
    }

    /// Scheduled records due at `now`, highest priority first
    pub fn due_now(
        &self,
        router: &TierRouter,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<(MemoryRecord, f64)> {
        let mut due: Vec<(MemoryRecord, f64)> = Vec::new();
        for tier in [MemoryTier::Hot, MemoryTier::Warm, MemoryTier::Cold] {
            let records = match router.store_for(tier).list_by_filter(&RecordFilter::all()) {
                Ok(records) => records,
                Err(err) => {
                    tracing::warn!(tier = %tier, error = %err, "due scan skipped tier");
                    continue;
                }
            };
            for record in records {
                let Some(state) = &record.review_state else {
                    continue;
                };
                if self.is_due(state, now) {
                    let priority = self.priority(&record, now);
                    due.push((record, priority));
                }
            }
        }
        due.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        due.truncate(limit);
        due
    }

    /// Per-cycle refresh: count due records and repair schedules that drifted
    /// behind `last_accessed`
    pub fn refresh(
        &self,
        router: &TierRouter,
        now: DateTime<Utc>,
        budget: &mut PhaseBudget,
    ) -> ReviewReport {
        let mut report = ReviewReport::default();

        'tiers: for tier in [MemoryTier::Hot, MemoryTier::Warm, MemoryTier::Cold] {
            let store = router.store_for(tier);
            let records = match store.list_by_filter(&RecordFilter::all()) {
                Ok(records) => records,
                Err(err) => {
                    tracing::warn!(tier = %tier, error = %err, "review refresh skipped tier");
                    continue;
                }
            };
            for mut record in records {
                if budget.should_yield() {
                    report.yielded = true;
                    break 'tiers;
                }
                let Some(state) = &mut record.review_state else {
                    continue;
                };
                budget.charge(1);
                report.scanned += 1;

                if state.next_review_at < record.last_accessed {
                    state.next_review_at = record.last_accessed;
                    report.repaired += 1;
                    if let Err(err) = store.put(&record) {
                        tracing::warn!(id = %record.id, error = %err, "schedule repair failed");
                    }
                    report.due += 1;
                    continue;
                }
                if state.next_review_at <= now {
                    report.due += 1;
                }
            }
        }
        report
    }
}

fn days_to_duration(days: f64) -> ChronoDuration {
    ChronoDuration::seconds((days * 86400.0) as i64)
}

// ============================================================================
// TESTS
// ============================================================================
