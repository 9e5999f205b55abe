//! Search filters, modes, and hits.

use super::{KnowledgeItem, KnowledgeType, ProjectId, SemanticType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a search should combine its signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Vector + lexical with weighted ranking.
    #[default]
    Hybrid,
    /// Vector similarity only.
    Vector,
    /// Full-text only.
    Lexical,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Hybrid => "hybrid",
            Self::Vector => "vector",
            Self::Lexical => "lexical",
        };
        write!(f, "{s}")
    }
}

/// Filter applied to knowledge retrieval.
///
/// Builder-style construction:
///
/// ```
/// use engram::models::{SearchFilter, KnowledgeType};
///
/// let filter = SearchFilter::new()
///     .with_knowledge_type(KnowledgeType::Technical)
///     .with_min_confidence(0.6);
/// assert!(filter.active_only);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Restrict to one project.
    pub project: Option<ProjectId>,
    /// Restrict to these coarse types (empty = all).
    pub knowledge_types: Vec<KnowledgeType>,
    /// Restrict to these semantic types (empty = all).
    pub semantic_types: Vec<SemanticType>,
    /// Exclude inactive (superseded/curated-out) items.
    pub active_only: bool,
    /// Minimum semantic classification confidence.
    pub min_confidence: Option<f64>,
    /// Only items updated after this instant.
    pub updated_after: Option<DateTime<Utc>>,
    /// Minimum importance in `[0, 100]`.
    pub min_importance: Option<f64>,
}

impl SearchFilter {
    /// Creates a filter that matches all active items.
    #[must_use]
    pub fn new() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }

    /// Restricts to one project.
    #[must_use]
    pub const fn with_project(mut self, project: ProjectId) -> Self {
        self.project = Some(project);
        self
    }

    /// Adds a coarse type restriction.
    #[must_use]
    pub fn with_knowledge_type(mut self, ty: KnowledgeType) -> Self {
        self.knowledge_types.push(ty);
        self
    }

    /// Adds a semantic type restriction.
    #[must_use]
    pub fn with_semantic_type(mut self, ty: SemanticType) -> Self {
        self.semantic_types.push(ty);
        self
    }

    /// Includes inactive items in results.
    #[must_use]
    pub const fn include_inactive(mut self) -> Self {
        self.active_only = false;
        self
    }

    /// Sets the minimum semantic classification confidence.
    #[must_use]
    pub const fn with_min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(min);
        self
    }

    /// Sets the minimum importance.
    #[must_use]
    pub const fn with_min_importance(mut self, min: f64) -> Self {
        self.min_importance = Some(min);
        self
    }

    /// Only items updated after the given instant.
    #[must_use]
    pub const fn with_updated_after(mut self, after: DateTime<Utc>) -> Self {
        self.updated_after = Some(after);
        self
    }

    /// Checks an item against the in-memory parts of the filter.
    ///
    /// Used by the vector index, which holds ids only and post-filters
    /// hydrated rows.
    #[must_use]
    pub fn matches(&self, item: &KnowledgeItem) -> bool {
        if self.active_only && !item.is_active {
            return false;
        }
        if let Some(project) = self.project
            && item.project_id != Some(project)
            && !item.cross_project
        {
            return false;
        }
        if !self.knowledge_types.is_empty() && !self.knowledge_types.contains(&item.knowledge_type)
        {
            return false;
        }
        if !self.semantic_types.is_empty() {
            match item.semantic_type {
                Some(ty) if self.semantic_types.contains(&ty) => {},
                _ => return false,
            }
        }
        if let Some(min) = self.min_confidence
            && item.semantic_confidence.unwrap_or(0.0) < min
        {
            return false;
        }
        if let Some(min) = self.min_importance
            && item.importance < min
        {
            return false;
        }
        if let Some(after) = self.updated_after
            && item.updated_at <= after
        {
            return false;
        }
        true
    }
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matched item.
    pub item: KnowledgeItem,
    /// Final blended score.
    pub score: f32,
    /// Cosine similarity, when the vector path contributed.
    pub vector_score: Option<f32>,
    /// Normalized lexical score, when the full-text path contributed.
    pub lexical_score: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> KnowledgeItem {
        KnowledgeItem::new(
            KnowledgeType::Technical,
            "configuration",
            "X requires absolute path",
            "Config must use absolute path to X",
        )
    }

    #[test]
    fn test_filter_active_only() {
        let filter = SearchFilter::new();
        let mut it = item();
        assert!(filter.matches(&it));
        it.is_active = false;
        assert!(!filter.matches(&it));
        assert!(filter.clone().include_inactive().matches(&it));
    }

    #[test]
    fn test_filter_project_scope() {
        let project = ProjectId::new();
        let filter = SearchFilter::new().with_project(project);

        let mut it = item();
        assert!(!filter.matches(&it));

        it.project_id = Some(project);
        assert!(filter.matches(&it));

        // Cross-project items match any project scope.
        it.project_id = None;
        it.cross_project = true;
        assert!(filter.matches(&it));
    }

    #[test]
    fn test_filter_types() {
        let filter = SearchFilter::new().with_knowledge_type(KnowledgeType::Factual);
        assert!(!filter.matches(&item()));

        let filter = SearchFilter::new().with_semantic_type(SemanticType::TechnicalDiscovery);
        let mut it = item();
        assert!(!filter.matches(&it));
        it.semantic_type = Some(SemanticType::TechnicalDiscovery);
        assert!(filter.matches(&it));
    }

    #[test]
    fn test_filter_min_importance() {
        let filter = SearchFilter::new().with_min_importance(70.0);
        let mut it = item();
        it.importance = 50.0;
        assert!(!filter.matches(&it));
        it.importance = 85.0;
        assert!(filter.matches(&it));
    }
}
