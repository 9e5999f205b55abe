//! Hybrid retrieval.
//!
//! Combines cosine similarity over the vector index with FTS5 BM25 over
//! the lexical index, blending both with importance and recency into one
//! ranking. When the embedding provider or the vector index is down the
//! service degrades to lexical-only results instead of failing.

use crate::config::HybridWeights;
use crate::embedding::{CachedEmbedder, Embedder};
use crate::models::{KnowledgeId, SearchFilter, SearchHit, SearchMode};
use crate::storage::Store;
use crate::{Error, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

/// Over-fetch multiplier for both candidate pools.
const K_OVER: usize = 4;

/// Floor the relaxation loop never goes below; also the candidate-fetch
/// threshold for the vector pool.
const THRESHOLD_FLOOR: f64 = 0.25;

/// Relaxation step applied when too few hits clear the threshold.
const RELAX_STEP: f64 = 0.1;

/// Maximum relaxation retries.
const MAX_RELAX: usize = 3;

/// Recency decay time scale in seconds (30 days).
const RECENCY_SCALE_SECS: f64 = 30.0 * 86_400.0;

/// Result of one retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    /// Ranked hits, best first.
    pub hits: Vec<SearchHit>,
    /// Whether the vector path was unavailable (lexical-only results).
    pub degraded: bool,
    /// The mode that actually ran.
    pub mode: SearchMode,
    /// Wall time of the search.
    pub execution_time_ms: u64,
}

/// Hybrid search service.
pub struct RetrievalService {
    store: Arc<Store>,
    embedder: Arc<CachedEmbedder>,
    weights: HybridWeights,
    similarity_threshold: f64,
    min_results: usize,
}

impl RetrievalService {
    /// Creates a retrieval service.
    ///
    /// The weights are assumed validated by configuration loading.
    #[must_use]
    pub const fn new(
        store: Arc<Store>,
        embedder: Arc<CachedEmbedder>,
        weights: HybridWeights,
        similarity_threshold: f64,
        min_results: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            weights,
            similarity_threshold,
            min_results,
        }
    }

    /// Runs a hybrid search.
    ///
    /// # Errors
    ///
    /// `Validation` on an empty query; storage errors other than vector
    /// unavailability are propagated.
    pub fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
        k: usize,
    ) -> Result<RetrievalResult> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".to_string()));
        }
        let started = std::time::Instant::now();
        let fetch = (k * K_OVER).max(1);

        let embedding = self.embedder.embed(query)?;
        let mut degraded = embedding.degraded || embedding.is_zero();

        let vector_hits = if degraded {
            Vec::new()
        } else {
            match self.vector_candidates(&embedding.vector, fetch, filter) {
                Ok(hits) => hits,
                Err(Error::DependencyUnavailable { cause, .. }) => {
                    tracing::warn!(%cause, "vector search unavailable; lexical-only");
                    degraded = true;
                    Vec::new()
                },
                Err(e) => return Err(e),
            }
        };

        let lexical_hits = self.store.fulltext_search(query, fetch, filter)?;

        let mode = if degraded {
            SearchMode::Lexical
        } else {
            SearchMode::Hybrid
        };
        let hits = self.blend(vector_hits, lexical_hits, k);

        #[allow(clippy::cast_possible_truncation)]
        let execution_time_ms = started.elapsed().as_millis() as u64;
        Ok(RetrievalResult {
            hits,
            degraded,
            mode,
            execution_time_ms,
        })
    }

    /// Fetches vector candidates, relaxing the similarity threshold when
    /// too few clear it.
    fn vector_candidates(
        &self,
        query: &[f32],
        fetch: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<(crate::models::KnowledgeItem, f32)>> {
        let mut threshold = self.similarity_threshold;
        let mut hits = Vec::new();
        for _ in 0..=MAX_RELAX {
            #[allow(clippy::cast_possible_truncation)]
            let t = threshold as f32;
            hits = self.store.vector_search(query, fetch, filter, t)?;
            if hits.len() >= self.min_results || threshold <= THRESHOLD_FLOOR {
                break;
            }
            threshold = (threshold - RELAX_STEP).max(THRESHOLD_FLOOR);
        }
        Ok(hits)
    }

    /// Blends the two candidate pools into one ranking.
    fn blend(
        &self,
        vector_hits: Vec<(crate::models::KnowledgeItem, f32)>,
        lexical_hits: Vec<(crate::models::KnowledgeItem, f32)>,
        k: usize,
    ) -> Vec<SearchHit> {
        struct Partial {
            hit: SearchHit,
        }

        let max_lex = lexical_hits
            .iter()
            .map(|(_, s)| *s)
            .fold(0.0f32, f32::max);

        let mut merged: HashMap<KnowledgeId, Partial> = HashMap::new();

        for (item, sim) in vector_hits {
            merged.insert(
                item.id,
                Partial {
                    hit: SearchHit {
                        item,
                        score: 0.0,
                        vector_score: Some(sim),
                        lexical_score: None,
                    },
                },
            );
        }

        for (item, lex) in lexical_hits {
            let lex_norm = if max_lex > 0.0 { lex / max_lex } else { 0.0 };
            merged
                .entry(item.id)
                .and_modify(|p| p.hit.lexical_score = Some(lex_norm))
                .or_insert(Partial {
                    hit: SearchHit {
                        item,
                        score: 0.0,
                        vector_score: None,
                        lexical_score: Some(lex_norm),
                    },
                });
        }

        let now = Utc::now();
        let mut hits: Vec<SearchHit> = merged
            .into_values()
            .map(|mut p| {
                p.hit.score = self.final_score(&p.hit, now);
                p.hit
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        hits.truncate(k);
        hits
    }

    /// The blended ranking formula.
    #[allow(clippy::cast_possible_truncation)]
    fn final_score(&self, hit: &SearchHit, now: chrono::DateTime<chrono::Utc>) -> f32 {
        let sim = f64::from(hit.vector_score.unwrap_or(0.0)).clamp(0.0, 1.0);
        let lex = f64::from(hit.lexical_score.unwrap_or(0.0)).clamp(0.0, 1.0);
        let importance = hit.item.importance / 100.0;
        let age_secs = (now - hit.item.updated_at).num_seconds().max(0);
        #[allow(clippy::cast_precision_loss)]
        let recency = (-(age_secs as f64) / RECENCY_SCALE_SECS).exp();

        let w = &self.weights;
        (w.alpha * sim + w.beta * lex + w.gamma * importance + w.delta * recency) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngramConfig;
    use crate::embedding::HashedEmbedder;
    use crate::models::{KnowledgeItem, KnowledgeType};

    fn service() -> RetrievalService {
        let config = EngramConfig {
            embedding_dimension: 32,
            ..EngramConfig::default()
        };
        let store = Arc::new(Store::open_in_memory(&config).unwrap());
        let embedder = Arc::new(CachedEmbedder::new(Box::new(HashedEmbedder::new(32)), 128));
        RetrievalService::new(
            store,
            embedder,
            HybridWeights::default(),
            config.similarity_threshold,
            config.min_results,
        )
    }

    fn seed(service: &RetrievalService, title: &str, content: &str) -> KnowledgeItem {
        let mut item = KnowledgeItem::new(KnowledgeType::Technical, "test", title, content);
        let embedding = service.embedder.embed(&format!("{title}\n{content}")).unwrap();
        item.embedding = Some(embedding.vector);
        item.embedding_version = Some(embedding.provider_version);
        service.store.put_knowledge(&item).unwrap();
        item
    }

    #[test]
    fn test_empty_query_rejected() {
        let service = service();
        let err = service.search("  ", &SearchFilter::new(), 5).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_stored_item_is_top_hit() {
        let service = service();
        let target = seed(
            &service,
            "X requires absolute path",
            "Config must use absolute path to X",
        );
        seed(&service, "tokio runtime", "worker threads and blocking pool");
        seed(&service, "release checklist", "tag the build and push artifacts");

        let result = service
            .search("absolute path configuration", &SearchFilter::new(), 5)
            .unwrap();
        assert!(!result.degraded);
        assert_eq!(result.mode, SearchMode::Hybrid);
        assert!(!result.hits.is_empty());
        assert_eq!(result.hits[0].item.id, target.id);
    }

    #[test]
    fn test_ranking_is_non_increasing() {
        let service = service();
        for i in 0..8 {
            seed(
                &service,
                &format!("note {i} about paths"),
                &format!("content {i} mentioning path handling details"),
            );
        }
        let result = service.search("path handling", &SearchFilter::new(), 8).unwrap();
        for pair in result.hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_lexical_only_items_still_found() {
        let service = service();
        // No embedding stored: only the lexical path can find it.
        let mut item = KnowledgeItem::new(
            KnowledgeType::Technical,
            "test",
            "firewall rule ordering",
            "rules evaluate top to bottom",
        );
        item.embedding = None;
        service.store.put_knowledge(&item).unwrap();

        let result = service
            .search("firewall ordering", &SearchFilter::new(), 5)
            .unwrap();
        assert_eq!(result.hits[0].item.id, item.id);
        assert!(result.hits[0].vector_score.is_none());
        assert!(result.hits[0].lexical_score.is_some());
    }

    #[test]
    fn test_importance_breaks_near_ties() {
        let service = service();
        let mut low = KnowledgeItem::new(
            KnowledgeType::Technical,
            "test",
            "deploy steps minor",
            "deploy with the script",
        );
        low.importance = 10.0;
        service.store.put_knowledge(&low).unwrap();

        let mut high = KnowledgeItem::new(
            KnowledgeType::Technical,
            "test",
            "deploy steps major",
            "deploy with the script",
        );
        high.importance = 95.0;
        service.store.put_knowledge(&high).unwrap();

        let result = service.search("deploy script", &SearchFilter::new(), 2).unwrap();
        assert_eq!(result.hits[0].item.id, high.id);
    }
}
