//! Single-linkage agglomerative clustering over record embeddings

use std::time::Duration;

use crate::embedding::cosine_similarity;
use crate::memory::MemoryRecord;

/// Distance parameters
#[derive(Debug, Clone)]
pub struct ClusterParams {
    /// Merge threshold: pairs closer than this join a cluster
    pub distance_threshold: f64,
    /// Window inside which creation proximity earns a bonus
    pub temporal_window: Duration,
    /// Distance subtracted at zero temporal separation
    pub temporal_bonus: f64,
    /// Distance subtracted for a shared conversation tag
    pub conversation_bonus: f64,
}

/// Pairwise distance between two records
///
/// `1 − cosine − temporal_bonus − conversation_bonus`. Records created close
/// together, or inside the same conversation, cluster more readily.
pub fn pairwise_distance(a: &MemoryRecord, b: &MemoryRecord, params: &ClusterParams) -> f64 {
    let cos = match (a.embedding.as_deref(), b.embedding.as_deref()) {
        (Some(ea), Some(eb)) if ea.len() == eb.len() => f64::from(cosine_similarity(ea, eb)),
        _ => return f64::INFINITY,
    };

    let delta_secs = (a.created_at - b.created_at).num_seconds().unsigned_abs() as f64;
    let window_secs = params.temporal_window.as_secs_f64().max(1.0);
    let temporal = (1.0 - delta_secs / window_secs).max(0.0) * params.temporal_bonus;

    let conversation = match (a.conversation_id(), b.conversation_id()) {
        (Some(ca), Some(cb)) if ca == cb => params.conversation_bonus,
        _ => 0.0,
    };

    1.0 - cos - temporal - conversation
}

/// Disjoint-set forest with path compression
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        if self.parent[i] != i {
            let root = self.find(self.parent[i]);
            self.parent[i] = root;
        }
        self.parent[i]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

/// Cluster records by single-linkage merging under the distance threshold
///
/// Returns index clusters into the input slice; singletons included.
/// Quadratic in the input length, so callers cap the candidate sample.
pub fn cluster_records(records: &[MemoryRecord], params: &ClusterParams) -> Vec<Vec<usize>> {
    let n = records.len();
    let mut forest = UnionFind::new(n);

    for i in 0..n {
        for j in (i + 1)..n {
            if pairwise_distance(&records[i], &records[j], params) < params.distance_threshold {
                forest.union(i, j);
            }
        }
    }

    let mut clusters: std::collections::HashMap<usize, Vec<usize>> =
        std::collections::HashMap::new();
    for i in 0..n {
        let root = forest.find(i);
        clusters.entry(root).or_default().push(i);
    }
    let mut result: Vec<Vec<usize>> = clusters.into_values().collect();
    result.sort_by_key(|c| c[0]);
    result
}

// ============================================================================
// TESTS
// ============================================================================
