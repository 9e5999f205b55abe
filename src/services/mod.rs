//! Service container.
//!
//! Owns the process-wide state (store, embedding cache, warm cache) and
//! wires the retrieval, warming, assembly, and analysis services over it.
//! Created at serve start, drained on shutdown, and the only place
//! allowed to replace the caches on reindex.

use crate::analyzer::{RedirectionAnalyzer, SessionReport, Turn};
use crate::cache::CacheWarmer;
use crate::config::EngramConfig;
use crate::context::ContextAssembler;
use crate::embedding::{CachedEmbedder, Embedder, HashedEmbedder, HttpEmbedder};
use crate::models::{
    HealthComponent, HealthLog, HealthStatus, Pattern, PatternContent, PatternType, SessionId,
};
use crate::retrieval::RetrievalService;
use crate::storage::Store;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Neighbors linked into a new meta-pattern's adjacency list.
const REPORT_NEIGHBORS: usize = 5;

/// The wired service graph.
pub struct ServiceContainer {
    config: EngramConfig,
    store: Arc<Store>,
    embedder: Arc<CachedEmbedder>,
    retrieval: Arc<RetrievalService>,
    warmer: Arc<CacheWarmer>,
    assembler: Arc<ContextAssembler>,
    analyzer: RedirectionAnalyzer,
}

impl ServiceContainer {
    /// Opens the store at the configured path and wires the services.
    ///
    /// # Errors
    ///
    /// `DependencyUnavailable` when the store cannot be opened.
    pub fn open(config: &EngramConfig) -> Result<Self> {
        let store = Arc::new(Store::open(config)?);
        Ok(Self::wire(config, store))
    }

    /// Wires the services over an in-memory store (tests, ephemeral runs).
    ///
    /// # Errors
    ///
    /// `DependencyUnavailable` when the store cannot be opened.
    pub fn open_in_memory(config: &EngramConfig) -> Result<Self> {
        let store = Arc::new(Store::open_in_memory(config)?);
        Ok(Self::wire(config, store))
    }

    fn wire(config: &EngramConfig, store: Arc<Store>) -> Self {
        let inner: Box<dyn Embedder> = match &config.embedding_endpoint {
            Some(endpoint) => {
                match HttpEmbedder::new(
                    endpoint.clone(),
                    config.embedding_api_key.clone(),
                    config.embedding_dimension,
                    config.embedding_timeout_ms,
                ) {
                    Ok(http) => Box::new(http),
                    Err(e) => {
                        tracing::warn!(error = %e, "embedding provider unusable; using hashed fallback");
                        Box::new(HashedEmbedder::new(config.embedding_dimension))
                    },
                }
            },
            None => Box::new(HashedEmbedder::new(config.embedding_dimension)),
        };
        let embedder = Arc::new(CachedEmbedder::new(inner, config.embedding_cache_entries));

        let retrieval = Arc::new(RetrievalService::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            config.hybrid_weights,
            config.similarity_threshold,
            config.min_results,
        ));
        let warmer = Arc::new(CacheWarmer::new(
            Arc::clone(&store),
            Arc::clone(&retrieval),
            config.cache_ttl_seconds,
            config.cache_max_entries,
        ));
        let assembler = Arc::new(ContextAssembler::new(
            Arc::clone(&store),
            Arc::clone(&retrieval),
            Arc::clone(&warmer),
            config.context_token_budget,
            config.max_items_per_context,
            config.situation_turns,
        ));

        Self {
            config: config.clone(),
            store,
            embedder,
            retrieval,
            warmer,
            assembler,
            analyzer: RedirectionAnalyzer::new(),
        }
    }

    /// The resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &EngramConfig {
        &self.config
    }

    /// The store.
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// The caching embedder.
    #[must_use]
    pub fn embedder(&self) -> &Arc<CachedEmbedder> {
        &self.embedder
    }

    /// The retrieval service.
    #[must_use]
    pub fn retrieval(&self) -> &Arc<RetrievalService> {
        &self.retrieval
    }

    /// The cache warmer.
    #[must_use]
    pub fn warmer(&self) -> &Arc<CacheWarmer> {
        &self.warmer
    }

    /// The context assembler.
    #[must_use]
    pub fn assembler(&self) -> &Arc<ContextAssembler> {
        &self.assembler
    }

    /// The redirection analyzer.
    #[must_use]
    pub const fn analyzer(&self) -> &RedirectionAnalyzer {
        &self.analyzer
    }

    /// Embeds a text, returning `(vector, provider_version)` or `None`
    /// when the provider is degraded (the item stays lexical-only).
    #[must_use]
    pub fn try_embed(&self, text: &str) -> Option<(Vec<f32>, String)> {
        match self.embedder.embed(text) {
            Ok(e) if !e.degraded && !e.is_zero() => Some((e.vector, e.provider_version)),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "embedding skipped");
                None
            },
        }
    }

    /// Rebuilds the vector indexes and drops both process caches.
    ///
    /// # Errors
    ///
    /// Propagates index rebuild errors.
    pub fn reindex(&self) -> Result<()> {
        self.store.rebuild_indexes()?;
        self.warmer.invalidate_all();
        self.embedder.clear();
        tracing::info!("reindex complete");
        Ok(())
    }

    /// Drains process caches ahead of shutdown.
    pub fn shutdown(&self) {
        self.warmer.invalidate_all();
        self.embedder.clear();
    }

    /// Analyzes a stored session's transcript and persists the report.
    ///
    /// The transcript is read from the session's `user_context` under the
    /// `transcript` key. The report lands as a `meta_pattern` row plus a
    /// `semantic_classifier` health observation; analyzer failures only
    /// produce a degraded health row.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown session, `Validation` when the session
    /// carries no transcript.
    pub fn analyze_session(&self, session_id: SessionId) -> Result<SessionReport> {
        let session = self.store.get_session(session_id)?;
        let turns: Vec<Turn> = match session.user_context.get("transcript") {
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| Error::Validation(format!("malformed transcript: {e}")))?,
            None => {
                return Err(Error::Validation(format!(
                    "session {session_id} has no transcript to analyze"
                )));
            },
        };

        let report = self.analyzer.analyze(&turns);

        if let Err(e) = self.persist_report(&session, &report) {
            // The analyzer must never block callers; failures become
            // health observations.
            tracing::error!(error = %e, "failed to persist analysis report");
            let log = HealthLog::new(HealthComponent::SemanticClassifier, HealthStatus::Degraded)
                .with_error(e.to_string());
            self.store.put_health(&log)?;
        }
        Ok(report)
    }

    fn persist_report(&self, session: &crate::models::Session, report: &SessionReport) -> Result<()> {
        let summary = format!(
            "{} redirections across {} user turns (rate {:.2})",
            report.redirection_count, report.user_turns, report.rate
        );

        let mut metrics = Map::new();
        metrics.insert(
            "redirection_count".to_string(),
            Value::from(report.redirection_count),
        );
        metrics.insert("user_turns".to_string(), Value::from(report.user_turns));
        metrics.insert("rate".to_string(), Value::from(report.rate));
        metrics.insert(
            "categories".to_string(),
            serde_json::to_value(&report.category_distribution)
                .map_err(|e| Error::internal("persist_report", e))?,
        );
        metrics.insert(
            "severities".to_string(),
            serde_json::to_value(&report.severity_distribution)
                .map_err(|e| Error::internal("persist_report", e))?,
        );
        metrics.insert(
            "effectiveness".to_string(),
            serde_json::to_value(&report.effectiveness_distribution)
                .map_err(|e| Error::internal("persist_report", e))?,
        );

        let mut extra = Map::new();
        extra.insert(
            "records".to_string(),
            serde_json::to_value(&report.records).map_err(|e| Error::internal("persist_report", e))?,
        );
        extra.insert(
            "suggestions".to_string(),
            Value::from(report.suggestions.clone()),
        );

        let mut pattern = Pattern::new(
            PatternType::MetaPattern,
            format!("redirection analysis: session {}", session.external_id),
            PatternContent::Report {
                summary: summary.clone(),
                metrics,
                extra,
            },
        );
        pattern.category = "session_quality".to_string();
        pattern.project_id = Some(session.project_id);
        pattern.session_id = Some(session.id);
        pattern.confidence = mean_confidence(report);
        pattern.pattern_strength = report.rate.clamp(0.0, 1.0);

        if let Some((vector, version)) = self.try_embed(&summary) {
            pattern.related_patterns = self
                .store
                .similar_patterns(&vector, REPORT_NEIGHBORS)?
                .into_iter()
                .map(|(id, _)| id)
                .collect();
            pattern.embedding = Some(vector);
            pattern.embedding_version = Some(version);
        }

        self.store.put_pattern(&pattern)?;

        let health = HealthLog::new(HealthComponent::SemanticClassifier, HealthStatus::Healthy)
            .with_metric("redirection_rate", Value::from(report.rate))
            .with_metric(
                "redirection_count",
                Value::from(report.redirection_count),
            );
        self.store.put_health(&health)
    }
}

fn mean_confidence(report: &SessionReport) -> f64 {
    if report.records.is_empty() {
        return 0.5;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = report.records.len() as f64;
    report
        .records
        .iter()
        .map(|r| r.detection_confidence)
        .sum::<f64>()
        / n
}
