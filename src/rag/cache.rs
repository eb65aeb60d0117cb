//! Query embedding cache
//!
//! Repeated questions are common in chat, and embedding a query costs a model
//! round trip. This cache keeps the most recently used query vectors in memory.
//!
//! # Cache Key Strategy
//!
//! Keys are hex SHA-256 digests of `model_name | text`, so vectors from
//! different models never collide. The store still clears the cache whenever
//! the embedding model changes, which frees the old model's vectors.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: usize,
}

impl CacheStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// In-memory LRU cache for query embeddings.
///
/// A capacity of zero disables caching entirely.
pub struct QueryEmbeddingCache {
    cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryEmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache key for a query under a model
    pub fn compute_key(text: &str, model: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update(b"|");
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn get(&self, text: &str, model: &str) -> Option<Vec<f32>> {
        let cache = self.cache.as_ref()?;
        let key = Self::compute_key(text, model);

        match cache.lock().get(&key) {
            Some(vector) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(vector.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, text: &str, model: &str, vector: Vec<f32>) {
        if let Some(cache) = &self.cache {
            cache.lock().put(Self::compute_key(text, model), vector);
        }
    }

    pub fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.lock().clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.as_ref().map(|c| c.lock().len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_computation() {
        let key1 = QueryEmbeddingCache::compute_key("hello world", "bge-small-en-v1.5");
        let key2 = QueryEmbeddingCache::compute_key("hello world", "bge-small-en-v1.5");
        let key3 = QueryEmbeddingCache::compute_key("hello world", "nomic-embed-text");
        let key4 = QueryEmbeddingCache::compute_key("different text", "bge-small-en-v1.5");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
        assert_ne!(key1, key4);
        assert_eq!(key1.len(), 64);
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = QueryEmbeddingCache::new(8);

        assert!(cache.get("q", "m").is_none());
        cache.put("q", "m", vec![1.0, 2.0]);
        assert_eq!(cache.get("q", "m"), Some(vec![1.0, 2.0]));
        assert!(cache.get("q", "other-model").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_cache_lru_eviction() {
        let cache = QueryEmbeddingCache::new(2);

        cache.put("a", "m", vec![1.0]);
        cache.put("b", "m", vec![2.0]);
        // Touch "a" so "b" becomes least recently used
        assert!(cache.get("a", "m").is_some());
        cache.put("c", "m", vec![3.0]);

        assert!(cache.get("b", "m").is_none());
        assert!(cache.get("a", "m").is_some());
        assert!(cache.get("c", "m").is_some());
    }

    #[test]
    fn test_cache_clear() {
        let cache = QueryEmbeddingCache::new(4);
        cache.put("a", "m", vec![1.0]);
        cache.put("b", "m", vec![2.0]);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_disables() {
        let cache = QueryEmbeddingCache::new(0);
        cache.put("a", "m", vec![1.0]);

        assert!(!cache.is_enabled());
        assert!(cache.get("a", "m").is_none());
        assert_eq!(cache.stats().misses, 0);
    }

    #[test]
    fn test_cache_hit_rate() {
        let stats = CacheStats {
            hits: 75,
            misses: 25,
            entry_count: 0,
        };
        assert!((stats.hit_rate() - 75.0).abs() < 0.001);
    }
}
