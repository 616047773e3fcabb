//! Embedding interfaces and vector math
//!
//! The embedding provider and the summarizer are external collaborators; the
//! core depends only on these trait objects. Also hosts the cosine helpers
//! used throughout clustering and search, and the byte-bounded LRU cache for
//! query embeddings.

use std::sync::Arc;

use lru::LruCache;

/// External embedding provider: a pure `text -> vector` function
///
/// The caller guarantees a constant dimension per deployment; the core
/// rejects vectors of any other length with `InvalidInput`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a piece of text
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// External summarizer used by consolidation
///
/// Must be deterministic enough that re-running on identical input yields an
/// equivalent result. Output is truncated to the content cap by the caller.
pub trait Summarizer: Send + Sync {
    /// Summarize member contents, oldest first
    fn summarize(&self, contents: &[String]) -> String;

    /// Summarize with a narrative hint (ordered sequence of events)
    fn summarize_narrative(&self, contents: &[String]) -> String {
        self.summarize(contents)
    }
}

/// Built-in extractive summarizer
///
/// Joins the leading snippet of each member. A real deployment supplies an
/// abstractive summarizer; this keeps the engine usable without one.
pub struct NaiveSummarizer {
    /// Characters kept per member
    pub snippet_chars: usize,
}

impl Default for NaiveSummarizer {
    fn default() -> Self {
        Self { snippet_chars: 120 }
    }
}

impl NaiveSummarizer {
    fn snippet<'a>(&self, content: &'a str) -> &'a str {
        let first_line = content.lines().next().unwrap_or("");
        let mut cut = first_line.len().min(self.snippet_chars);
        while cut > 0 && !first_line.is_char_boundary(cut) {
            cut -= 1;
        }
        &first_line[..cut]
    }
}

impl Summarizer for NaiveSummarizer {
    fn summarize(&self, contents: &[String]) -> String {
        let snippets: Vec<&str> = contents.iter().map(|c| self.snippet(c)).collect();
        format!("Consolidated {} memories: {}", contents.len(), snippets.join("; "))
    }

    fn summarize_narrative(&self, contents: &[String]) -> String {
        let snippets: Vec<&str> = contents.iter().map(|c| self.snippet(c)).collect();
        format!("Sequence of {} events: {}", contents.len(), snippets.join(", then "))
    }
}

// ============================================================================
// VECTOR MATH
// ============================================================================

/// Cosine similarity between two vectors, in [-1, 1]
///
/// Returns 0.0 for mismatched dimensions or zero-magnitude inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Map a cosine similarity onto a [0, 1] relevance score
pub fn relevance_from_cosine(cos: f32) -> f64 {
    ((f64::from(cos) + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Element-wise mean of vectors, renormalized to unit length
///
/// Returns `None` when the input is empty or dimensions disagree.
pub fn renormalized_mean(vectors: &[&[f32]]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
        return None;
    }

    let mut mean = vec![0.0f32; dim];
    for vector in vectors {
        for (m, v) in mean.iter_mut().zip(vector.iter()) {
            *m += v;
        }
    }
    let n = vectors.len() as f32;
    for m in mean.iter_mut() {
        *m /= n;
    }

    let norm: f32 = mean.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return None;
    }
    for m in mean.iter_mut() {
        *m /= norm;
    }
    Some(mean)
}

// ============================================================================
// QUERY EMBEDDING CACHE
// ============================================================================

/// One cached embedding with its insertion generation
#[derive(Debug, Clone)]
pub struct CachedEmbedding {
    /// The embedding vector, shared read-mostly across workers
    pub vector: Arc<Vec<f32>>,
    /// Monotone counter identifying the insertion that produced this entry
    pub generation: u64,
}

/// Byte-bounded LRU cache for query embeddings
///
/// Bounded by an approximate byte budget rather than an entry count, since
/// entry size is dominated by the (constant) embedding dimension.
pub struct EmbeddingCache {
    entries: LruCache<String, CachedEmbedding>,
    budget_bytes: usize,
    used_bytes: usize,
    generation: u64,
}

impl EmbeddingCache {
    /// Create a cache with the given byte budget
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            // Entry cap is enforced by the byte budget; the LRU order alone
            // is what the inner cache provides.
            entries: LruCache::unbounded(),
            budget_bytes,
            used_bytes: 0,
            generation: 0,
        }
    }

    fn entry_bytes(key: &str, vector: &[f32]) -> usize {
        key.len() + vector.len() * 4 + 64
    }

    /// Look up a cached embedding, refreshing its recency
    pub fn get(&mut self, text: &str) -> Option<CachedEmbedding> {
        self.entries.get(text).cloned()
    }

    /// Insert an embedding, evicting least-recently-used entries to budget
    pub fn insert(&mut self, text: String, vector: Vec<f32>) -> CachedEmbedding {
        let bytes = Self::entry_bytes(&text, &vector);
        self.generation += 1;
        let entry = CachedEmbedding {
            vector: Arc::new(vector),
            generation: self.generation,
        };

        if let Some(old) = self.entries.put(text.clone(), entry.clone()) {
            self.used_bytes = self
                .used_bytes
                .saturating_sub(Self::entry_bytes(&text, &old.vector));
        }
        self.used_bytes += bytes;

        while self.used_bytes > self.budget_bytes {
            match self.entries.pop_lru() {
                Some((key, evicted)) => {
                    self.used_bytes = self
                        .used_bytes
                        .saturating_sub(Self::entry_bytes(&key, &evicted.vector));
                }
                None => break,
            }
        }
        entry
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate bytes in use
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_basics() {
        let a = [1.0, 0.0, 0.0];
        let b = [0.0, 1.0, 0.0];
        assert_eq!(cosine_similarity(&a, &a), 1.0);
        assert_eq!(cosine_similarity(&a, &b), 0.0);

        let neg = [-1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &neg), -1.0);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_relevance_mapping() {
        assert_eq!(relevance_from_cosine(1.0), 1.0);
        assert_eq!(relevance_from_cosine(-1.0), 0.0);
        assert_eq!(relevance_from_cosine(0.0), 0.5);
    }

    #[test]
    fn test_renormalized_mean_is_unit_length() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        let mean = renormalized_mean(&[&a, &b]).unwrap();
        let norm: f32 = mean.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((mean[0] - mean[1]).abs() < 1e-6);
    }

    #[test]
    fn test_renormalized_mean_rejects_mismatched_dims() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0, 0.0];
        assert!(renormalized_mean(&[&a, &b]).is_none());
        assert!(renormalized_mean(&[]).is_none());
    }

    #[test]
    fn test_cache_hit_and_generation() {
        let mut cache = EmbeddingCache::new(1024 * 1024);
        assert!(cache.get("q").is_none());

        let first = cache.insert("q".into(), vec![1.0, 2.0]);
        let hit = cache.get("q").unwrap();
        assert_eq!(hit.generation, first.generation);
        assert_eq!(*hit.vector, vec![1.0, 2.0]);

        let second = cache.insert("q".into(), vec![3.0, 4.0]);
        assert!(second.generation > first.generation);
        assert_eq!(*cache.get("q").unwrap().vector, vec![3.0, 4.0]);
    }

    #[test]
    fn test_cache_evicts_to_byte_budget() {
        // Each entry is ~1 + 4*4 + 64 bytes; a 300-byte budget holds three.
        let mut cache = EmbeddingCache::new(300);
        for i in 0..10 {
            cache.insert(format!("{i}"), vec![0.0; 4]);
        }
        assert!(cache.used_bytes() <= 300);
        assert!(cache.len() <= 4);
        // Most recent entry survives
        assert!(cache.get("9").is_some());
    }
}
