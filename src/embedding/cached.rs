//! Content-hash LRU cache over an embedder.

use super::{Embedder, Embedding};
use crate::Result;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;

/// Caching decorator over any [`Embedder`].
///
/// Keys are SHA-256 digests of the input text, so the cache is content
/// addressed and immune to key-length pathologies. Degraded (zero-vector)
/// results are never cached; the next call retries the provider.
pub struct CachedEmbedder {
    inner: Box<dyn Embedder>,
    cache: Mutex<LruCache<String, Embedding>>,
}

impl CachedEmbedder {
    /// Wraps an embedder with a bounded LRU of `capacity` entries.
    #[must_use]
    pub fn new(inner: Box<dyn Embedder>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Drops all cached entries (used on reindex).
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    fn key(text: &str) -> String {
        hex::encode(Sha256::digest(text.as_bytes()))
    }
}

impl Embedder for CachedEmbedder {
    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn provider_version(&self) -> &str {
        self.inner.provider_version()
    }

    fn embed(&self, text: &str) -> Result<Embedding> {
        let key = Self::key(text);

        if let Some(hit) = self.cache.lock().get(&key) {
            return Ok(hit.clone());
        }

        let embedding = self.inner.embed(text)?;
        if !embedding.degraded {
            self.cache.lock().put(key, embedding.clone());
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls through to the inner embedder.
    struct CountingEmbedder {
        inner: HashedEmbedder,
        calls: AtomicUsize,
        degrade: bool,
    }

    impl Embedder for CountingEmbedder {
        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        fn provider_version(&self) -> &str {
            "counting-v1"
        }

        fn embed(&self, text: &str) -> Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.degrade {
                return Ok(Embedding {
                    vector: vec![0.0; self.dimensions()],
                    degraded: true,
                    provider_version: "counting-v1".to_string(),
                });
            }
            self.inner.embed(text)
        }
    }

    #[test]
    fn test_cache_hit_skips_inner() {
        let counting = CountingEmbedder {
            inner: HashedEmbedder::new(32),
            calls: AtomicUsize::new(0),
            degrade: false,
        };
        let cached = CachedEmbedder::new(Box::new(counting), 16);

        let a = cached.embed("same text").unwrap();
        let b = cached.embed("same text").unwrap();
        assert_eq!(a.vector, b.vector);
        assert_eq!(cached.len(), 1);
    }

    #[test]
    fn test_degraded_results_not_cached() {
        let counting = CountingEmbedder {
            inner: HashedEmbedder::new(32),
            calls: AtomicUsize::new(0),
            degrade: true,
        };
        let cached = CachedEmbedder::new(Box::new(counting), 16);

        let a = cached.embed("text").unwrap();
        assert!(a.degraded);
        assert!(cached.is_empty());

        let _ = cached.embed("text").unwrap();
        assert!(cached.is_empty());
    }

    #[test]
    fn test_capacity_bound() {
        let cached = CachedEmbedder::new(Box::new(HashedEmbedder::new(16)), 2);
        cached.embed("one").unwrap();
        cached.embed("two").unwrap();
        cached.embed("three").unwrap();
        assert_eq!(cached.len(), 2);
    }
}
