//! Cache warming.
//!
//! For a declared (project, situation) pair the warmer pre-loads the
//! highest-value items across five strategic tiers so that the first
//! context assembly pays no cold-start cost. Entries live in a bounded,
//! TTL-checked LRU; warming is single-flight per key.

use crate::models::{
    KnowledgeItem, KnowledgeType, Pattern, PatternId, Project, SearchFilter, SemanticType,
    StrategicInsight, ValidationStatus,
};
use crate::retrieval::RetrievalService;
use crate::storage::{PatternFilter, Store};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Importance floor for the core-domain tier.
const CORE_DOMAIN_MIN_IMPORTANCE: f64 = 70.0;

/// Strategic tiers, in fill order. Weights sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// High-importance technical and procedural knowledge of the project.
    CoreDomain,
    /// Lessons learned, ranked by quality.
    Experiential,
    /// Hybrid search hits against the situation text.
    Situational,
    /// Strategic insights applicable to the project type.
    Strategic,
    /// Recently validated patterns.
    RecentPatterns,
}

impl Tier {
    /// All tiers in fill order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::CoreDomain,
            Self::Experiential,
            Self::Situational,
            Self::Strategic,
            Self::RecentPatterns,
        ]
    }

    /// The tier's share of the item budget.
    #[must_use]
    pub const fn weight(&self) -> f64 {
        match self {
            Self::CoreDomain => 0.4,
            Self::Experiential => 0.2,
            Self::Situational => 0.25,
            Self::Strategic => 0.1,
            Self::RecentPatterns => 0.05,
        }
    }

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CoreDomain => "core_domain",
            Self::Experiential => "experiential",
            Self::Situational => "situational",
            Self::Strategic => "strategic",
            Self::RecentPatterns => "recent_patterns",
        }
    }
}

/// One warmed payload.
#[derive(Debug, Clone)]
pub enum WarmedItem {
    /// A knowledge item.
    Knowledge(KnowledgeItem),
    /// A pattern.
    Pattern(Pattern),
    /// A strategic insight.
    Insight(StrategicInsight),
}

impl WarmedItem {
    /// Uniform identifier across the three entity kinds.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        match self {
            Self::Knowledge(k) => *k.id.as_uuid(),
            Self::Pattern(p) => *p.id.as_uuid(),
            Self::Insight(i) => *i.id.as_uuid(),
        }
    }

    /// Title shown in assembled context.
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::Knowledge(k) => &k.title,
            Self::Pattern(p) => &p.title,
            Self::Insight(i) => &i.title,
        }
    }

    /// Body text packed into assembled context.
    #[must_use]
    pub fn body(&self) -> String {
        match self {
            Self::Knowledge(k) => k.content.clone(),
            Self::Pattern(p) => p.content.lexical_text(),
            Self::Insight(i) => i.lexical_text(),
        }
    }

    /// Estimated token cost.
    #[must_use]
    pub fn tokens_est(&self) -> usize {
        match self {
            Self::Knowledge(k) => k.tokens_est(),
            Self::Pattern(p) => p.tokens_est(),
            Self::Insight(i) => i.tokens_est(),
        }
    }

    /// The pattern id, when the payload is a pattern.
    #[must_use]
    pub const fn pattern_id(&self) -> Option<PatternId> {
        match self {
            Self::Pattern(p) => Some(p.id),
            _ => None,
        }
    }
}

/// One packet entry: a payload with its tier and score.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The warmed payload.
    pub item: WarmedItem,
    /// The tier that selected it.
    pub tier: Tier,
    /// Tier-local relevance score.
    pub score: f32,
    /// Estimated token cost.
    pub tokens_est: usize,
}

/// Per-warm metrics.
#[derive(Debug, Clone, Serialize)]
pub struct WarmMetrics {
    /// Items filled vs. targeted, per tier.
    pub tier_fill: Vec<(Tier, usize, usize)>,
    /// Wall time of the fill.
    pub wall_time_ms: u64,
}

/// A warmed (project, situation) packet.
#[derive(Debug)]
pub struct CachePacket {
    /// Unique id of this warm execution; shared by all single-flight
    /// callers.
    pub warm_id: Uuid,
    /// Cache key the packet is stored under.
    pub key: String,
    /// Ordered entries.
    pub entries: Vec<CacheEntry>,
    /// Sum of entry token estimates.
    pub total_tokens: usize,
    /// When the packet was built.
    pub created_at: DateTime<Utc>,
    /// Fill metrics.
    pub metrics: WarmMetrics,
}

/// Normalizes a situation string: case-folded, whitespace-collapsed.
#[must_use]
pub fn normalize_situation(situation: &str) -> String {
    situation
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Computes the cache key for a (project, situation) pair.
#[must_use]
pub fn cache_key(project: crate::models::ProjectId, situation: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project.to_string().as_bytes());
    hasher.update([0]);
    hasher.update(normalize_situation(situation).as_bytes());
    hex::encode(hasher.finalize())
}

/// The cache warmer.
///
/// Process-wide state with a defined lifecycle: created at serve start,
/// drained on shutdown, invalidated on reindex. All access goes through
/// this API.
pub struct CacheWarmer {
    store: Arc<Store>,
    retrieval: Arc<RetrievalService>,
    ttl: Duration,
    packets: Mutex<LruCache<String, Arc<CachePacket>>>,
    inflight: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CacheWarmer {
    /// Creates a warmer with the given TTL and key bound.
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        retrieval: Arc<RetrievalService>,
        ttl_seconds: u64,
        max_entries: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            retrieval,
            ttl: Duration::from_secs(ttl_seconds),
            packets: Mutex::new(LruCache::new(capacity)),
            inflight: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Looks up a fresh packet without warming.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<Arc<CachePacket>> {
        let mut packets = self.packets.lock();
        if let Some(packet) = packets.get(key) {
            let age = Utc::now() - packet.created_at;
            if age.to_std().map_or(true, |age| age <= self.ttl) {
                return Some(Arc::clone(packet));
            }
            packets.pop(key);
        }
        None
    }

    /// Drops every cached packet (shutdown and reindex).
    pub fn invalidate_all(&self) {
        self.packets.lock().clear();
    }

    /// Ensures a warm packet exists for the key, building it at most once
    /// concurrently.
    ///
    /// Returns the packet and whether it was served from cache.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the fill.
    pub async fn warm(
        &self,
        project: &Project,
        situation: &str,
        budget_items: usize,
        budget_tokens: usize,
    ) -> Result<(Arc<CachePacket>, bool)> {
        let key = cache_key(project.id, situation);

        if let Some(packet) = self.peek(&key) {
            return Ok((packet, true));
        }

        // Single-flight: all callers for one key serialize on its mutex;
        // whoever enters first fills the cache, the rest hit it on re-check.
        let key_lock = {
            let mut inflight = self.inflight.lock().await;
            Arc::clone(
                inflight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };
        let _guard = key_lock.lock().await;

        if let Some(packet) = self.peek(&key) {
            return Ok((packet, true));
        }

        let store = Arc::clone(&self.store);
        let retrieval = Arc::clone(&self.retrieval);
        let project = project.clone();
        let situation = situation.to_string();
        let fill_key = key.clone();
        let packet = tokio::task::spawn_blocking(move || {
            fill(&store, &retrieval, &project, &situation, &fill_key, budget_items, budget_tokens)
        })
        .await
        .map_err(|e| Error::internal("warm", e))??;

        tracing::debug!(
            warm_id = %packet.warm_id,
            entries = packet.entries.len(),
            total_tokens = packet.total_tokens,
            wall_time_ms = packet.metrics.wall_time_ms,
            "cache warmed"
        );
        let packet = Arc::new(packet);
        self.packets.lock().put(key.clone(), Arc::clone(&packet));

        let mut inflight = self.inflight.lock().await;
        inflight.remove(&key);
        drop(inflight);

        Ok((packet, false))
    }
}

/// Builds a packet by filling tiers proportionally until a budget runs out.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fill(
    store: &Store,
    retrieval: &RetrievalService,
    project: &Project,
    situation: &str,
    key: &str,
    budget_items: usize,
    budget_tokens: usize,
) -> Result<CachePacket> {
    let started = std::time::Instant::now();
    let mut entries: Vec<CacheEntry> = Vec::new();
    let mut seen: std::collections::HashSet<Uuid> = std::collections::HashSet::new();
    let mut total_tokens = 0usize;
    let mut tier_fill = Vec::new();

    'tiers: for tier in Tier::all() {
        let target = ((tier.weight() * budget_items as f64).ceil() as usize).max(1);
        let candidates = tier_candidates(store, retrieval, project, situation, *tier, target)?;

        let mut filled = 0usize;
        for (item, score) in candidates {
            if entries.len() >= budget_items {
                tier_fill.push((*tier, filled, target));
                break 'tiers;
            }
            if filled >= target || !seen.insert(item.id()) {
                continue;
            }
            let tokens = item.tokens_est();
            if total_tokens + tokens > budget_tokens {
                tier_fill.push((*tier, filled, target));
                break 'tiers;
            }
            total_tokens += tokens;
            filled += 1;
            entries.push(CacheEntry {
                tier: *tier,
                score,
                tokens_est: tokens,
                item,
            });
        }
        tier_fill.push((*tier, filled, target));
    }

    Ok(CachePacket {
        warm_id: Uuid::new_v4(),
        key: key.to_string(),
        entries,
        total_tokens,
        created_at: Utc::now(),
        metrics: WarmMetrics {
            tier_fill,
            wall_time_ms: started.elapsed().as_millis() as u64,
        },
    })
}

/// Produces the ranked candidate list for one tier.
#[allow(clippy::cast_possible_truncation)]
fn tier_candidates(
    store: &Store,
    retrieval: &RetrievalService,
    project: &Project,
    situation: &str,
    tier: Tier,
    target: usize,
) -> Result<Vec<(WarmedItem, f32)>> {
    match tier {
        Tier::CoreDomain => {
            let filter = SearchFilter::new()
                .with_project(project.id)
                .with_semantic_type(SemanticType::TechnicalDiscovery)
                .with_semantic_type(SemanticType::Procedural)
                .with_min_importance(CORE_DOMAIN_MIN_IMPORTANCE);
            let items = store.list_knowledge(&filter, target * 2)?;
            Ok(items
                .into_iter()
                .map(|i| {
                    let score = (i.importance / 100.0) as f32;
                    (WarmedItem::Knowledge(i), score)
                })
                .collect())
        },
        Tier::Experiential => {
            let by_semantic = store.list_knowledge(
                &SearchFilter::new()
                    .with_project(project.id)
                    .with_semantic_type(SemanticType::Experiential),
                target * 2,
            )?;
            let by_coarse = store.list_knowledge(
                &SearchFilter::new()
                    .with_project(project.id)
                    .with_knowledge_type(KnowledgeType::Experiential),
                target * 2,
            )?;
            let mut merged: Vec<KnowledgeItem> = by_semantic;
            for item in by_coarse {
                if !merged.iter().any(|m| m.id == item.id) {
                    merged.push(item);
                }
            }
            merged.sort_by(|a, b| {
                b.quality
                    .partial_cmp(&a.quality)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
            Ok(merged
                .into_iter()
                .map(|i| {
                    let score = (i.quality / 100.0) as f32;
                    (WarmedItem::Knowledge(i), score)
                })
                .collect())
        },
        Tier::Situational => {
            if situation.trim().is_empty() {
                return Ok(Vec::new());
            }
            let filter = SearchFilter::new().with_project(project.id);
            let result = retrieval.search(situation, &filter, target)?;
            Ok(result
                .hits
                .into_iter()
                .map(|h| (WarmedItem::Knowledge(h.item), h.score))
                .collect())
        },
        Tier::Strategic => {
            let insights = store.insights_for(project.project_type, target)?;
            Ok(insights
                .into_iter()
                .map(|i| {
                    let score = i.effectiveness as f32;
                    (WarmedItem::Insight(i), score)
                })
                .collect())
        },
        Tier::RecentPatterns => {
            let filter = PatternFilter {
                project: Some(project.id),
                validation_status: Some(ValidationStatus::Validated),
                pattern_type: None,
            };
            let patterns = store.list_patterns(&filter, target)?;
            Ok(patterns
                .into_iter()
                .map(|p| {
                    let score = p.confidence as f32;
                    (WarmedItem::Pattern(p), score)
                })
                .collect())
        },
    }
}
