//! Test world: an in-memory tri-tier service with a manual clock

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mnemon_core::config::CoreConfig;
use mnemon_core::maintenance::CycleReport;
use mnemon_core::{
    EmbeddingProvider, MemStore, MemoryRecord, MemoryService, MemoryTier, MemoryType, Summarizer,
};

/// Embedding dimension used across e2e journeys
pub const DIM: usize = 8;

/// Deterministic embedder: tokens hash into a fixed-dimension direction
///
/// Identical texts embed identically; texts sharing tokens land near each
/// other, which is all the journeys need.
pub struct HashEmbedder;

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIM];
        for token in text.split_whitespace() {
            let mut h: u64 = 1469598103934665603;
            for b in token.bytes() {
                h ^= u64::from(b);
                h = h.wrapping_mul(1099511628211);
            }
            v[(h % DIM as u64) as usize] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        } else {
            v[0] = 1.0;
        }
        v
    }
}

/// Summarizer that makes its inputs visible in the output
pub struct EchoSummarizer;

impl Summarizer for EchoSummarizer {
    fn summarize(&self, contents: &[String]) -> String {
        format!("summary[{}]", contents.join(" / "))
    }

    fn summarize_narrative(&self, contents: &[String]) -> String {
        format!("narrative[{}]", contents.join(" -> "))
    }
}

/// A tri-tier in-memory world with a manual clock
pub struct TestWorld {
    /// Hot backend handle (availability toggles, direct inspection)
    pub hot: Arc<MemStore>,
    /// Warm backend handle
    pub warm: Arc<MemStore>,
    /// Cold backend handle
    pub cold: Arc<MemStore>,
    /// The service under test
    pub service: MemoryService,
    /// The manual clock
    pub now: DateTime<Utc>,
    _dir: tempfile::TempDir,
}

impl TestWorld {
    /// Build a world with default engine configuration
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Build a world, letting the caller adjust the configuration
    pub fn with_config(adjust: impl FnOnce(&mut CoreConfig)) -> Self {
        let hot = Arc::new(MemStore::hot());
        let warm = Arc::new(MemStore::warm());
        let cold = Arc::new(MemStore::cold());
        let dir = tempfile::tempdir().expect("tempdir");

        let mut config = CoreConfig {
            embedding_dim: DIM,
            overflow_path: Some(dir.path().join("overflow.ndjson")),
            ..Default::default()
        };
        adjust(&mut config);

        let service = MemoryService::builder()
            .config(config)
            .hot(hot.clone())
            .warm(warm.clone())
            .cold(cold.clone())
            .embedder(Arc::new(HashEmbedder))
            .summarizer(Arc::new(EchoSummarizer))
            .build()
            .expect("service build");

        Self {
            hot,
            warm,
            cold,
            service,
            now: Utc::now(),
            _dir: dir,
        }
    }

    /// Advance the manual clock
    pub fn advance(&mut self, by: Duration) -> DateTime<Utc> {
        self.now += by;
        self.now
    }

    /// Run one maintenance cycle at the current clock
    pub fn cycle(&self) -> CycleReport {
        self.service.run_maintenance_at(self.now)
    }

    /// Backend handle for a tier
    pub fn store(&self, tier: MemoryTier) -> &Arc<MemStore> {
        match tier {
            MemoryTier::Hot => &self.hot,
            MemoryTier::Warm => &self.warm,
            MemoryTier::Cold => &self.cold,
        }
    }

    /// Plant a pre-built record directly into a tier, bypassing the service
    ///
    /// Journeys that need exact scores (importance, strength, markers) seed
    /// state this way, then drive the public API.
    pub fn plant(&self, tier: MemoryTier, record: &MemoryRecord) {
        use mnemon_core::MemoryStore;
        let mut record = record.clone();
        record.tier = tier;
        self.store(tier).put(&record).expect("plant record");
    }

    /// Build a bare record for planting
    pub fn bare_record(&self, content: &str, memory_type: MemoryType) -> MemoryRecord {
        MemoryRecord::new(content, memory_type, self.now)
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}
