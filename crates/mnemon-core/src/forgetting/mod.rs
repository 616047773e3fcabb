//! Forgetting engine
//!
//! Privacy-driven expiration. Rules expire aged PII/financial content, stale
//! unimportant episodes, and anything whose composite privacy risk crosses
//! the immediate threshold. Never-forget protection overrides every rule.
//! Expired records become tombstones for a grace window, then are purged.

use chrono::{DateTime, Utc};

use crate::config::ForgettingConfig;
use crate::maintenance::PhaseBudget;
use crate::memory::{ForgetCause, MemoryRecord, MemoryTier, MemoryType};
use crate::scoring::ScoringEngine;
use crate::store::RecordFilter;
use crate::tier::TierRouter;

/// Why a record expired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpireReason {
    /// PII score over threshold past the PII age window
    AgedPii,
    /// Financial score over threshold past the financial age window
    AgedFinancial,
    /// Unimportant episodic record past the stale window
    StaleEpisode,
    /// Composite privacy risk over the immediate threshold
    HighRisk,
}

/// Report of one forgetting pass
#[derive(Debug, Clone, Default)]
pub struct ForgettingReport {
    /// Records inspected
    pub scanned: usize,
    /// Records tombstoned this pass
    pub expired: usize,
    /// Tombstones hard-deleted after their grace window
    pub purged: usize,
    /// Records an expiration rule matched but never-forget protected
    pub protected: usize,
    /// True when the budget ran out before the scan finished
    pub yielded: bool,
}

/// Evaluates expiration rules and manages tombstone lifecycle
pub struct ForgettingEngine {
    config: ForgettingConfig,
}

impl ForgettingEngine {
    /// Create an engine
    pub fn new(config: ForgettingConfig) -> Self {
        Self { config }
    }

    /// Whether never-forget protection applies
    pub fn is_never_forget(&self, record: &MemoryRecord) -> bool {
        record.is_never_forget(
            self.config.never_forget_importance,
            self.config.never_forget_accesses,
        )
    }

    /// Evaluate the expiration rules, ignoring never-forget
    ///
    /// Callers check protection separately so a pass can report how often
    /// protection actually fired.
    pub fn evaluate(
        &self,
        record: &MemoryRecord,
        scoring: &ScoringEngine,
        now: DateTime<Utc>,
    ) -> Option<ExpireReason> {
        let age_days = record.age_days(now);
        let markers = &record.privacy_markers;

        if scoring.privacy_risk(record, now) > self.config.risk_threshold {
            return Some(ExpireReason::HighRisk);
        }
        if markers.pii_score > self.config.pii_threshold && age_days > self.config.pii_age_days as f64
        {
            return Some(ExpireReason::AgedPii);
        }
        if markers.financial_score > self.config.financial_threshold
            && age_days > self.config.financial_age_days as f64
        {
            return Some(ExpireReason::AgedFinancial);
        }
        if record.memory_type == MemoryType::Episodic
            && record.importance < self.config.episodic_importance
            && age_days > self.config.episodic_age_days as f64
        {
            return Some(ExpireReason::StaleEpisode);
        }
        None
    }

    /// One forgetting pass: expire matching records, purge elapsed tombstones
    pub fn run_cycle(
        &self,
        router: &TierRouter,
        scoring: &ScoringEngine,
        now: DateTime<Utc>,
        budget: &mut PhaseBudget,
    ) -> ForgettingReport {
        let mut report = ForgettingReport::default();
        let grace = chrono::Duration::from_std(self.config.grace)
            .unwrap_or_else(|_| chrono::Duration::days(7));

        'tiers: for tier in [MemoryTier::Hot, MemoryTier::Warm, MemoryTier::Cold] {
            let store = router.store_for(tier);
            let records = match store.list_by_filter(&RecordFilter::all().with_tombstones()) {
                Ok(records) => records,
                Err(err) => {
                    tracing::warn!(tier = %tier, error = %err, "forgetting scan skipped tier");
                    continue;
                }
            };

            for mut record in records {
                if budget.should_yield() {
                    report.yielded = true;
                    break 'tiers;
                }
                budget.charge(1);
                report.scanned += 1;

                // Tombstones only age toward their purge
                if record.is_tombstone() {
                    if record.grace_elapsed(now, grace) {
                        match store.delete(&record.id) {
                            Ok(()) => {
                                report.purged += 1;
                                tracing::debug!(id = %record.id, "tombstone purged");
                            }
                            Err(err) => {
                                tracing::warn!(id = %record.id, error = %err, "purge failed");
                            }
                        }
                    }
                    continue;
                }

                let Some(reason) = self.evaluate(&record, scoring, now) else {
                    continue;
                };
                if self.is_never_forget(&record) {
                    report.protected += 1;
                    tracing::debug!(id = %record.id, ?reason, "expiration blocked by never-forget");
                    continue;
                }

                record.tombstone(ForgetCause::Privacy, now);
                match store.put(&record) {
                    Ok(()) => {
                        report.expired += 1;
                        tracing::info!(id = %record.id, ?reason, "record expired");
                    }
                    Err(err) => {
                        tracing::warn!(id = %record.id, error = %err, "expire write failed");
                    }
                }
            }
        }
        report
    }
}

// ============================================================================
// TESTS
// ============================================================================
