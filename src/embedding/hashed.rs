//! Deterministic feature-hashing embedder.
//!
//! Used when no provider endpoint is configured, and in tests. Tokens are
//! hashed into buckets with alternating sign and the result is
//! L2-normalized, so similar texts land near each other while the whole
//! pipeline stays dependency-free and reproducible.

use super::{Embedder, Embedding};
use crate::{Error, Result};

/// Version tag recorded with stored embeddings.
const PROVIDER_VERSION: &str = "hashed-v1";

/// FNV-1a 64-bit, kept local so hashes are stable across Rust releases.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Feature-hashing embedder.
pub struct HashedEmbedder {
    dimensions: usize,
}

impl HashedEmbedder {
    /// Creates an embedder producing vectors of the given dimension.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }
}

impl Embedder for HashedEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_version(&self) -> &str {
        PROVIDER_VERSION
    }

    fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(Error::Validation(
                "cannot embed empty text".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for token in Self::tokens(text) {
            let hash = fnv1a(token.as_bytes());
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (hash % self.dimensions as u64) as usize;
            // Second hash bit decides the sign, keeping buckets balanced.
            let sign = if (hash >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(Embedding {
            vector,
            degraded: false,
            provider_version: PROVIDER_VERSION.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_deterministic() {
        let embedder = HashedEmbedder::new(128);
        let a = embedder.embed("absolute path configuration").unwrap();
        let b = embedder.embed("absolute path configuration").unwrap();
        assert_eq!(a.vector, b.vector);
        assert!(!a.degraded);
    }

    #[test]
    fn test_dimension() {
        let embedder = HashedEmbedder::new(768);
        let e = embedder.embed("hello world").unwrap();
        assert_eq!(e.vector.len(), 768);
    }

    #[test]
    fn test_similar_texts_score_higher() {
        let embedder = HashedEmbedder::new(256);
        let base = embedder.embed("config must use absolute path").unwrap();
        let close = embedder.embed("absolute path configuration").unwrap();
        let far = embedder.embed("tokio runtime worker threads").unwrap();

        let close_sim = cosine_similarity(&base.vector, &close.vector);
        let far_sim = cosine_similarity(&base.vector, &far.vector);
        assert!(
            close_sim > far_sim,
            "expected {close_sim} > {far_sim}"
        );
    }

    #[test]
    fn test_empty_input_rejected() {
        let embedder = HashedEmbedder::new(64);
        assert!(embedder.embed("   ").is_err());
    }

    #[test]
    fn test_normalized() {
        let embedder = HashedEmbedder::new(64);
        let e = embedder.embed("some text to embed").unwrap();
        let norm: f32 = e.vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
