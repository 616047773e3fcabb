//! Maintenance orchestrator
//!
//! Drives the periodic cycle: drain the overflow log, then decay, review
//! refresh, consolidation, forgetting, and placement - in that order. Decay
//! precedes consolidation so weakened records are candidates; consolidation
//! precedes forgetting so fresh summaries are not expired alongside their
//! members; forgetting precedes placement so expired records are not
//! promoted. Each phase runs under a budget and yields with progress.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use crate::consolidation::ConsolidationReport;
use crate::decay::DecayReport;
use crate::forgetting::ForgettingReport;
use crate::placement::PlacementReport;
use crate::review::ReviewReport;
use crate::service::MemoryService;

// ============================================================================
// PHASE BUDGET
// ============================================================================

/// Cooperative budget for one maintenance phase
///
/// A phase yields when it has processed the record allotment or the
/// wall-clock window, whichever comes first.
pub struct PhaseBudget {
    deadline: Instant,
    max_records: usize,
    processed: usize,
}

impl PhaseBudget {
    /// Create a budget of `window` wall-clock time and `max_records` records
    pub fn new(window: Duration, max_records: usize) -> Self {
        Self {
            deadline: Instant::now() + window,
            max_records,
            processed: 0,
        }
    }

    /// Charge `n` processed records against the budget
    pub fn charge(&mut self, n: usize) {
        self.processed += n;
    }

    /// Whether the phase should stop and report progress
    pub fn should_yield(&self) -> bool {
        self.processed >= self.max_records || Instant::now() >= self.deadline
    }

    /// Records still allotted (at least one, so list calls stay non-empty)
    pub fn records_remaining(&self) -> usize {
        self.max_records.saturating_sub(self.processed).max(1)
    }

    /// Records charged so far
    pub fn processed(&self) -> usize {
        self.processed
    }
}

// ============================================================================
// CYCLE REPORT
// ============================================================================

/// Report of one full maintenance cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Overflow-log lines drained into tiers
    pub overflow_drained: usize,
    /// Decay phase
    pub decay: DecayReport,
    /// Review refresh phase
    pub review: ReviewReport,
    /// Consolidation phase, absent when no trigger fired
    pub consolidation: Option<ConsolidationReport>,
    /// Forgetting phase
    pub forgetting: ForgettingReport,
    /// Placement phase
    pub placement: PlacementReport,
    /// Total cycle duration in milliseconds
    pub duration_ms: i64,
}

// ============================================================================
// DAEMON
// ============================================================================

/// Handle to the background maintenance loop
///
/// The loop ticks on the configured interval and accepts manual triggers.
/// Cycle bodies run on the blocking pool so retrieval latency is unaffected.
pub struct MaintenanceDaemon {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<u64>,
}

impl MaintenanceDaemon {
    /// Spawn the loop on the current tokio runtime
    pub fn spawn(service: Arc<MemoryService>, interval: Duration) -> Self {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(8);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a fresh service
            // is not maintained before it holds any records
            ticker.tick().await;

            let mut cycles = 0u64;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    triggered = trigger_rx.recv() => {
                        if triggered.is_none() {
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                let service = Arc::clone(&service);
                let result =
                    tokio::task::spawn_blocking(move || service.run_maintenance()).await;
                match result {
                    Ok(report) => {
                        cycles += 1;
                        tracing::info!(
                            cycle = cycles,
                            duration_ms = report.duration_ms,
                            drained = report.overflow_drained,
                            "maintenance cycle finished"
                        );
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "maintenance cycle panicked");
                    }
                }
            }
            cycles
        });

        Self {
            trigger_tx,
            shutdown_tx,
            handle,
        }
    }

    /// Request an immediate cycle
    pub async fn trigger(&self) {
        let _ = self.trigger_tx.send(()).await;
    }

    /// Stop the loop and wait for it; returns completed cycle count
    pub async fn shutdown(self) -> u64 {
        let _ = self.shutdown_tx.send(true);
        drop(self.trigger_tx);
        self.handle.await.unwrap_or(0)
    }
}

// ============================================================================
// TESTS
// ============================================================================
