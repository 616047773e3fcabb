//! Consolidation engine
//!
//! Clusters semantically related warm records and rewrites each cluster with
//! a strategy: link small clusters, summarize unimportant ones, keep the
//! valuable members and summarize the rest. Consolidation is idempotent -
//! consumed inputs leave the warm tier, so a re-run sees singletons and
//! skips them.

mod cluster;

pub use cluster::{cluster_records, pairwise_distance, ClusterParams};

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::config::ConsolidationConfig;
use crate::embedding::{renormalized_mean, Summarizer};
use crate::maintenance::PhaseBudget;
use crate::memory::{MemoryRecord, MemoryTier, MemoryType, MAX_CONTENT_BYTES};
use crate::store::RecordFilter;
use crate::tier::TierRouter;

// ============================================================================
// STRATEGY
// ============================================================================

/// Per-cluster rewrite strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Singleton cluster; leave untouched
    Skip,
    /// Small cluster; set mutual links, delete nothing
    Link,
    /// Replace every member with one summary record
    Summarize {
        /// The members form an ordered narrative
        narrative: bool,
    },
    /// Keep high-importance members, summarize the rest into a linked record
    KeepAndSummarize,
}

/// Report of one consolidation run
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    /// Warm candidates sampled
    pub candidates: usize,
    /// Clusters formed (singletons included)
    pub clusters: usize,
    /// Mutual links created
    pub links_created: usize,
    /// Summary records written
    pub summaries_created: usize,
    /// Member records deleted after summarization
    pub members_deleted: usize,
    /// Singleton clusters skipped
    pub skipped: usize,
    /// True when the budget ran out before every cluster was processed
    pub yielded: bool,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Clusters warm records and executes the chosen strategies
pub struct ConsolidationEngine {
    config: ConsolidationConfig,
    summarizer: Arc<dyn Summarizer>,
    last_run: Mutex<Option<DateTime<Utc>>>,
}

impl ConsolidationEngine {
    /// Create an engine delegating summarization to `summarizer`
    pub fn new(config: ConsolidationConfig, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            config,
            summarizer,
            last_run: Mutex::new(None),
        }
    }

    /// Whether a run is warranted
    ///
    /// Record-count pressure, byte pressure on hot+warm, or the daily
    /// schedule.
    pub fn should_run(&self, total_records: u64, hot_warm_bytes: u64, now: DateTime<Utc>) -> bool {
        if total_records > self.config.trigger_total_records {
            return true;
        }
        let budget = self.config.byte_budget as f64 * self.config.trigger_byte_ratio;
        if hot_warm_bytes as f64 > budget {
            return true;
        }
        let interval = chrono::Duration::from_std(self.config.schedule_interval)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        match *self.last_run.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(last) => now - last >= interval,
            None => true,
        }
    }

    /// Pick the strategy for a cluster of members
    ///
    /// Low average importance wins over the small-cluster LINK rule: a pair
    /// of near-duplicate throwaways is rewritten, not linked.
    pub fn choose_strategy(&self, members: &[&MemoryRecord]) -> Strategy {
        if members.len() <= 1 {
            return Strategy::Skip;
        }

        let avg_importance =
            members.iter().map(|m| m.importance).sum::<f64>() / members.len() as f64;
        if avg_importance < self.config.low_importance {
            return Strategy::Summarize { narrative: false };
        }

        if members.len() <= self.config.link_max_size {
            return Strategy::Link;
        }

        let highs = members
            .iter()
            .filter(|m| m.importance >= self.config.high_importance)
            .count();
        if highs > 0 && highs < members.len() {
            return Strategy::KeepAndSummarize;
        }

        if members.iter().all(|m| m.tags.contains("ordering")) {
            return Strategy::Summarize { narrative: true };
        }
        Strategy::Summarize { narrative: false }
    }

    /// Run one consolidation pass over the warm tier
    pub fn run_cycle(
        &self,
        router: &TierRouter,
        now: DateTime<Utc>,
        budget: &mut PhaseBudget,
    ) -> ConsolidationReport {
        let mut report = ConsolidationReport::default();
        let warm = router.store_for(MemoryTier::Warm);

        let mut candidates = match warm.list_by_filter(&RecordFilter::all()) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(error = %err, "consolidation skipped: warm unavailable");
                return report;
            }
        };
        // Oldest last-accessed first, then cap the sample; clustering needs
        // embeddings, so records without one sit out
        candidates.retain(|r| r.embedding.is_some());
        candidates.sort_by_key(|r| r.last_accessed);
        candidates.truncate(self.config.sample_size);
        report.candidates = candidates.len();

        let params = ClusterParams {
            distance_threshold: self.config.distance_threshold,
            temporal_window: self.config.temporal_bonus_window,
            temporal_bonus: self.config.temporal_bonus,
            conversation_bonus: self.config.conversation_bonus,
        };
        let clusters = cluster_records(&candidates, &params);
        report.clusters = clusters.len();

        for indices in clusters {
            if budget.should_yield() {
                report.yielded = true;
                break;
            }
            budget.charge(indices.len());

            let members: Vec<&MemoryRecord> = indices.iter().map(|i| &candidates[*i]).collect();
            match self.choose_strategy(&members) {
                Strategy::Skip => report.skipped += 1,
                Strategy::Link => self.execute_link(router, &members, &mut report),
                Strategy::Summarize { narrative } => {
                    self.execute_summarize(router, &members, &[], narrative, now, &mut report);
                }
                Strategy::KeepAndSummarize => {
                    let (kept, rest): (Vec<&MemoryRecord>, Vec<&MemoryRecord>) = members
                        .iter()
                        .copied()
                        .partition(|m| m.importance >= self.config.high_importance);
                    self.execute_summarize(router, &rest, &kept, false, now, &mut report);
                }
            }
        }

        if let Ok(mut last) = self.last_run.lock() {
            *last = Some(now);
        }
        tracing::info!(
            candidates = report.candidates,
            clusters = report.clusters,
            summaries = report.summaries_created,
            links = report.links_created,
            "consolidation cycle complete"
        );
        report
    }

    /// LINK: set mutual links across the cluster, delete nothing
    fn execute_link(
        &self,
        router: &TierRouter,
        members: &[&MemoryRecord],
        report: &mut ConsolidationReport,
    ) {
        let warm = router.store_for(MemoryTier::Warm);
        for member in members {
            let mut updated = (*member).clone();
            for other in members {
                if other.id != member.id {
                    updated.links.insert(other.id.clone());
                }
            }
            match warm.put(&updated) {
                Ok(()) => report.links_created += updated.links.len(),
                Err(err) => {
                    tracing::warn!(id = %member.id, error = %err, "link write failed");
                }
            }
        }
    }

    /// SUMMARIZE / KEEP_AND_SUMMARIZE: rewrite `members` into one summary,
    /// optionally linked to `kept` survivors
    fn execute_summarize(
        &self,
        router: &TierRouter,
        members: &[&MemoryRecord],
        kept: &[&MemoryRecord],
        narrative: bool,
        now: DateTime<Utc>,
        report: &mut ConsolidationReport,
    ) {
        if members.is_empty() {
            return;
        }
        let warm = router.store_for(MemoryTier::Warm);

        let mut ordered: Vec<&MemoryRecord> = members.to_vec();
        ordered.sort_by_key(|m| m.created_at);
        let contents: Vec<String> = ordered.iter().map(|m| m.content.clone()).collect();
        let mut summary_text = if narrative {
            self.summarizer.summarize_narrative(&contents)
        } else {
            self.summarizer.summarize(&contents)
        };
        if summary_text.len() > MAX_CONTENT_BYTES {
            let mut cut = MAX_CONTENT_BYTES;
            while !summary_text.is_char_boundary(cut) {
                cut -= 1;
            }
            summary_text.truncate(cut);
        }

        let embeddings: Vec<&[f32]> = ordered
            .iter()
            .filter_map(|m| m.embedding.as_deref())
            .collect();
        let mean_embedding = renormalized_mean(&embeddings);

        let mut tags: BTreeSet<String> = BTreeSet::new();
        for member in &ordered {
            tags.extend(member.tags.iter().cloned());
        }

        let mut summary = MemoryRecord::new(summary_text, MemoryType::Semantic, now);
        summary.importance = ordered
            .iter()
            .map(|m| m.importance)
            .fold(f64::MIN, f64::max);
        summary.tags = tags;
        summary.embedding = mean_embedding;
        for survivor in kept {
            summary.links.insert(survivor.id.clone());
        }
        summary.tier = router.initial_tier(summary.importance, summary.memory_type, &summary.tags);
        summary.tier_entered_at = now;

        if let Err(err) = router.write(&summary) {
            tracing::warn!(error = %err, "summary write failed; originals retained");
            return;
        }
        report.summaries_created += 1;

        // Link the survivors back to the summary
        for survivor in kept {
            let mut updated = (*survivor).clone();
            updated.links.insert(summary.id.clone());
            if let Err(err) = warm.put(&updated) {
                tracing::warn!(id = %survivor.id, error = %err, "survivor link failed");
            } else {
                report.links_created += 1;
            }
        }

        // Delete the consumed originals
        for member in &ordered {
            match warm.delete(&member.id) {
                Ok(()) => report.members_deleted += 1,
                Err(err) => {
                    tracing::warn!(id = %member.id, error = %err, "member delete failed");
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
