//! Context assembly (cache-augmented generation).
//!
//! Produces the bounded context payload for a query within a session:
//! ensures the (project, situation) cache is warm, merges warmed entries
//! with live retrieval, and greedily packs the ranking into the token
//! budget. Warmed items get a small score bonus so pre-computed context
//! wins near-ties against live results.

use crate::cache::{CacheWarmer, Tier};
use crate::models::{
    KnowledgeId, PatternUsage, SearchFilter, Session, SessionId, UsageType, estimate_tokens,
};
use crate::retrieval::RetrievalService;
use crate::storage::Store;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Score bonus applied to warmed entries during the merge.
const WARMED_BONUS: f32 = 0.05;

/// Where a context item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// Selected by the cache warmer.
    Warmed,
    /// Selected by live retrieval.
    Live,
}

/// Options for one assembly call.
#[derive(Debug, Clone, Copy)]
pub struct AssembleOptions {
    /// Token budget override; `None` uses the configured default.
    pub budget_tokens: Option<usize>,
    /// Item cap override; `None` uses the configured default.
    pub max_items: Option<usize>,
    /// Live retrieval depth.
    pub k_live: usize,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            budget_tokens: None,
            max_items: None,
            k_live: 10,
        }
    }
}

/// One selected context item with provenance.
#[derive(Debug, Clone, Serialize)]
pub struct ContextItem {
    /// Underlying entity id.
    pub id: Uuid,
    /// Title.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Selection score after bonuses.
    pub score: f32,
    /// Tier, for warmed items.
    pub tier: Option<Tier>,
    /// Provenance.
    pub source: ContextSource,
    /// Estimated token cost.
    pub tokens_est: usize,
}

/// Metrics for one assembly.
#[derive(Debug, Clone, Serialize)]
pub struct ContextMetrics {
    /// Share of selected items that came from the warmed cache.
    pub cache_hit_ratio: f64,
    /// Wall time of the assembly.
    pub assembly_latency_ms: u64,
    /// Items selected into the payload.
    pub items_selected: usize,
    /// Ranked items left out because the budget was reached.
    pub items_rejected_over_budget: usize,
}

/// The assembled context payload.
#[derive(Debug, Clone, Serialize)]
pub struct ContextPayload {
    /// Session the payload was assembled for.
    pub session_id: SessionId,
    /// Warm execution that backed the payload.
    pub warm_id: Uuid,
    /// Ordered items, best first.
    pub items: Vec<ContextItem>,
    /// Sum of selected token estimates.
    pub total_tokens: usize,
    /// Whether retrieval ran lexical-only.
    pub degraded: bool,
    /// Assembly metrics.
    pub metrics: ContextMetrics,
}

/// The context assembler.
pub struct ContextAssembler {
    store: Arc<Store>,
    retrieval: Arc<RetrievalService>,
    warmer: Arc<CacheWarmer>,
    default_budget: usize,
    default_max_items: usize,
    situation_turns: usize,
}

impl ContextAssembler {
    /// Creates an assembler with the configured defaults.
    #[must_use]
    pub const fn new(
        store: Arc<Store>,
        retrieval: Arc<RetrievalService>,
        warmer: Arc<CacheWarmer>,
        default_budget: usize,
        default_max_items: usize,
        situation_turns: usize,
    ) -> Self {
        Self {
            store,
            retrieval,
            warmer,
            default_budget,
            default_max_items,
            situation_turns,
        }
    }

    /// Derives the situation text for a session: the last N user turns
    /// (the query being the latest), case-folded downstream by the
    /// warmer's key normalization.
    fn situation(&self, session: &Session, query: &str) -> String {
        let mut turns: Vec<String> = session
            .user_context
            .get("recent_turns")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        turns.push(query.to_string());
        let skip = turns.len().saturating_sub(self.situation_turns);
        turns[skip..].join(" ")
    }

    /// Assembles the context payload for a query within a session.
    ///
    /// Deterministic for fixed inputs and cache state; raising the budget
    /// only ever appends to the selection; never returns more than the
    /// item cap.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown session; storage errors are propagated.
    pub async fn assemble(
        &self,
        session_id: SessionId,
        query: &str,
        options: &AssembleOptions,
    ) -> Result<ContextPayload> {
        let started = std::time::Instant::now();
        let budget = options.budget_tokens.unwrap_or(self.default_budget);
        let max_items = options
            .max_items
            .unwrap_or(self.default_max_items)
            .min(self.default_max_items);

        let session = self.store.get_session(session_id)?;
        let project = self.store.get_project(session.project_id)?;
        let situation = self.situation(&session, query);

        let (packet, _cache_hit) = self
            .warmer
            .warm(&project, &situation, max_items, budget)
            .await?;

        let live = {
            let retrieval = Arc::clone(&self.retrieval);
            let query = query.to_string();
            let filter = SearchFilter::new().with_project(project.id);
            let k_live = options.k_live;
            tokio::task::spawn_blocking(move || retrieval.search(&query, &filter, k_live))
                .await
                .map_err(|e| Error::internal("assemble", e))??
        };

        // Merge warmed + live, de-duplicating by id. Warmed entries carry
        // the bonus; on a collision the higher-scored side wins.
        let mut candidates: Vec<(ContextItem, Option<crate::models::PatternId>)> = Vec::new();
        for entry in &packet.entries {
            candidates.push((
                ContextItem {
                    id: entry.item.id(),
                    title: entry.item.title().to_string(),
                    body: entry.item.body(),
                    score: entry.score + WARMED_BONUS,
                    tier: Some(entry.tier),
                    source: ContextSource::Warmed,
                    tokens_est: entry.tokens_est,
                },
                entry.item.pattern_id(),
            ));
        }
        for hit in live.hits {
            let id = *hit.item.id.as_uuid();
            if let Some(existing) = candidates.iter_mut().find(|(c, _)| c.id == id) {
                existing.0.score = existing.0.score.max(hit.score);
                continue;
            }
            candidates.push((
                ContextItem {
                    id,
                    title: hit.item.title.clone(),
                    body: hit.item.content.clone(),
                    score: hit.score,
                    tier: None,
                    source: ContextSource::Live,
                    tokens_est: estimate_tokens(&hit.item.title)
                        + estimate_tokens(&hit.item.content),
                },
                None,
            ));
        }

        candidates.sort_by(|a, b| {
            b.0.score
                .partial_cmp(&a.0.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });

        // Greedy packing in rank order; stops at the first overflow so a
        // larger budget can only extend the selection.
        let mut items = Vec::new();
        let mut used_patterns = Vec::new();
        let mut total_tokens = 0usize;
        let mut rejected = 0usize;
        let mut ranked = candidates.into_iter();
        for (item, pattern_id) in ranked.by_ref() {
            if items.len() >= max_items || total_tokens + item.tokens_est > budget {
                rejected = 1 + ranked.len();
                break;
            }
            total_tokens += item.tokens_est;
            if let Some(pid) = pattern_id {
                used_patterns.push(pid);
            }
            items.push(item);
        }

        {
            let store = Arc::clone(&self.store);
            let session_id = session.id;
            let selected: Vec<(Uuid, Option<Tier>)> =
                items.iter().map(|i| (i.id, i.tier)).collect();
            tokio::task::spawn_blocking(move || {
                record_usage(&store, session_id, &selected, &used_patterns)
            })
            .await
            .map_err(|e| Error::internal("assemble", e))??;
        }

        let warmed_selected = items
            .iter()
            .filter(|i| i.source == ContextSource::Warmed)
            .count();
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let metrics = ContextMetrics {
            cache_hit_ratio: if items.is_empty() {
                0.0
            } else {
                warmed_selected as f64 / items.len() as f64
            },
            assembly_latency_ms: started.elapsed().as_millis() as u64,
            items_selected: items.len(),
            items_rejected_over_budget: rejected,
        };

        Ok(ContextPayload {
            session_id,
            warm_id: packet.warm_id,
            total_tokens,
            degraded: live.degraded,
            metrics,
            items,
        })
    }

}

/// Records usage for a selection: a `PatternUsage` per pattern-backed
/// item and a usage-count bump per knowledge item.
fn record_usage(
    store: &Store,
    session_id: SessionId,
    selected: &[(Uuid, Option<Tier>)],
    used_patterns: &[crate::models::PatternId],
) -> Result<()> {
    for pattern_id in used_patterns {
        let mut usage =
            PatternUsage::new(*pattern_id, UsageType::QueryResponse, "context assembly");
        usage.session_id = Some(session_id);
        store.put_usage(&usage)?;
    }

    let knowledge_ids: Vec<KnowledgeId> = selected
        .iter()
        .filter(|(_, tier)| {
            tier.is_none_or(|t| t != Tier::Strategic && t != Tier::RecentPatterns)
        })
        .map(|(id, _)| KnowledgeId::from_uuid(*id))
        .filter(|id| store.get_knowledge(*id).is_ok())
        .collect();
    store.increment_knowledge_usage(&knowledge_ids)
}
