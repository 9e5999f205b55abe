//! Embedding generation.
//!
//! Provides embedding generation via an HTTP provider, with a
//! deterministic feature-hashing fallback and a content-hash LRU cache.
//! Provider failures never fail the caller: the gateway returns the zero
//! vector with a degraded flag, and callers treat those results as
//! lexical-only.

// Allow cast precision loss for hash-based embedding calculations.
#![allow(clippy::cast_precision_loss)]

mod cached;
mod hashed;
mod http;

pub use cached::CachedEmbedder;
pub use hashed::HashedEmbedder;
pub use http::HttpEmbedder;

use crate::Result;

/// An embedding result.
///
/// `degraded` is set when the provider was unavailable and the vector is
/// the zero vector; such results must be treated as lexical-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// The vector, always of the provider's dimension.
    pub vector: Vec<f32>,
    /// Whether the provider failed and the vector is a zero placeholder.
    pub degraded: bool,
    /// Provider version tag the vector was produced under.
    pub provider_version: String,
}

impl Embedding {
    /// Whether the vector is the zero vector.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.vector.iter().all(|v| *v == 0.0)
    }
}

/// Trait for embedding generators.
///
/// Identical input must produce identical output within one
/// `provider_version`; the version tag is stored alongside embeddings so
/// the corpus can be re-embedded after provider upgrades.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Returns the provider version tag.
    fn provider_version(&self) -> &str;

    /// Generates an embedding for the given text.
    ///
    /// Provider failures are reported in-band: the returned embedding is
    /// the zero vector with `degraded = true`.
    ///
    /// # Errors
    ///
    /// Returns an error only on caller mistakes (empty input), never on
    /// provider unavailability.
    fn embed(&self, text: &str) -> Result<Embedding>;
}

/// Computes cosine similarity between two equal-length vectors.
///
/// Returns 0.0 for mismatched lengths or zero-norm inputs.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_basics() {
        let v1 = vec![1.0, 0.0, 0.0];
        let v2 = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&v1, &v1) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&v1, &v2).abs() < 1e-6);
        assert!((cosine_similarity(&v1, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_zero_detection() {
        let embedding = Embedding {
            vector: vec![0.0; 8],
            degraded: true,
            provider_version: "test".to_string(),
        };
        assert!(embedding.is_zero());
    }
}
