//! Knowledge items and their two-level type vocabulary.
//!
//! `knowledge_type` is the coarse category a client supplies at capture
//! time; `semantic_type` is an optional refinement produced by
//! classification. The two vocabularies overlap but are not identical;
//! [`default_consistency_table`] documents the compatible pairs and ships
//! as configuration rather than code.

use super::{KnowledgeId, ProjectId, SessionId, validate_embedding, validate_percent, validate_unit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Maximum title length in characters.
pub const MAX_TITLE_CHARS: usize = 500;

/// Coarse category of a knowledge item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeType {
    /// A verifiable fact.
    Factual,
    /// A how-to or sequence of steps.
    Procedural,
    /// Background that frames other knowledge.
    Contextual,
    /// A relationship between entities.
    Relational,
    /// A lesson learned from experience.
    Experiential,
    /// A technical discovery or gotcha.
    Technical,
    /// A recognized recurring structure.
    Patterns,
    /// Cross-project strategic knowledge.
    Strategic,
}

impl KnowledgeType {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Procedural => "procedural",
            Self::Contextual => "contextual",
            Self::Relational => "relational",
            Self::Experiential => "experiential",
            Self::Technical => "technical",
            Self::Patterns => "patterns",
            Self::Strategic => "strategic",
        }
    }

    /// All variants, for schema enumeration.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Factual,
            Self::Procedural,
            Self::Contextual,
            Self::Relational,
            Self::Experiential,
            Self::Technical,
            Self::Patterns,
            Self::Strategic,
        ]
    }
}

impl FromStr for KnowledgeType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "factual" => Ok(Self::Factual),
            "procedural" => Ok(Self::Procedural),
            "contextual" => Ok(Self::Contextual),
            "relational" => Ok(Self::Relational),
            "experiential" => Ok(Self::Experiential),
            "technical" => Ok(Self::Technical),
            "patterns" => Ok(Self::Patterns),
            "strategic" => Ok(Self::Strategic),
            other => Err(crate::Error::Validation(format!(
                "unknown knowledge type: {other}"
            ))),
        }
    }
}

impl fmt::Display for KnowledgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Refined classification of a knowledge item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    /// A verifiable fact.
    Factual,
    /// A how-to or sequence of steps.
    Procedural,
    /// Background that frames other knowledge.
    Contextual,
    /// A relationship between entities.
    Relational,
    /// A lesson learned from experience.
    Experiential,
    /// A technical discovery or gotcha.
    TechnicalDiscovery,
    /// A recognized recurring structure.
    PatternRecognition,
    /// Cross-project strategic knowledge.
    StrategicInsight,
}

impl SemanticType {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Procedural => "procedural",
            Self::Contextual => "contextual",
            Self::Relational => "relational",
            Self::Experiential => "experiential",
            Self::TechnicalDiscovery => "technical_discovery",
            Self::PatternRecognition => "pattern_recognition",
            Self::StrategicInsight => "strategic_insight",
        }
    }
}

impl FromStr for SemanticType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "factual" => Ok(Self::Factual),
            "procedural" => Ok(Self::Procedural),
            "contextual" => Ok(Self::Contextual),
            "relational" => Ok(Self::Relational),
            "experiential" => Ok(Self::Experiential),
            "technical_discovery" => Ok(Self::TechnicalDiscovery),
            "pattern_recognition" => Ok(Self::PatternRecognition),
            "strategic_insight" => Ok(Self::StrategicInsight),
            other => Err(crate::Error::Validation(format!(
                "unknown semantic type: {other}"
            ))),
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a semantic type was assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    /// Supplied by the client at capture time.
    Declared,
    /// Inferred by keyword heuristics.
    Heuristic,
    /// Inferred by the semantic classifier.
    Classifier,
}

impl ClassificationMethod {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Declared => "declared",
            Self::Heuristic => "heuristic",
            Self::Classifier => "classifier",
        }
    }
}

impl FromStr for ClassificationMethod {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "declared" => Ok(Self::Declared),
            "heuristic" => Ok(Self::Heuristic),
            "classifier" => Ok(Self::Classifier),
            other => Err(crate::Error::Validation(format!(
                "unknown classification method: {other}"
            ))),
        }
    }
}

/// The default `knowledge_type` → compatible `semantic_type` table.
///
/// The five shared names map to themselves; the three divergent names map
/// to their refined forms. Deployments may override this via the
/// `[consistency]` config section.
#[must_use]
pub fn default_consistency_table() -> HashMap<KnowledgeType, SemanticType> {
    HashMap::from([
        (KnowledgeType::Factual, SemanticType::Factual),
        (KnowledgeType::Procedural, SemanticType::Procedural),
        (KnowledgeType::Contextual, SemanticType::Contextual),
        (KnowledgeType::Relational, SemanticType::Relational),
        (KnowledgeType::Experiential, SemanticType::Experiential),
        (KnowledgeType::Technical, SemanticType::TechnicalDiscovery),
        (KnowledgeType::Patterns, SemanticType::PatternRecognition),
        (KnowledgeType::Strategic, SemanticType::StrategicInsight),
    ])
}

/// A unit of retained knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// Unique identifier.
    pub id: KnowledgeId,
    /// Coarse category.
    pub knowledge_type: KnowledgeType,
    /// Optional refined classification.
    pub semantic_type: Option<SemanticType>,
    /// Confidence of the semantic classification.
    pub semantic_confidence: Option<f64>,
    /// How the semantic type was assigned.
    pub classification_method: Option<ClassificationMethod>,
    /// Short title (at most [`MAX_TITLE_CHARS`] characters).
    pub title: String,
    /// Full content.
    pub content: String,
    /// Free-form category label.
    pub category: String,
    /// Structured context captured with the item (forward-compatible
    /// escape hatch; not indexed).
    pub context_data: serde_json::Map<String, serde_json::Value>,
    /// Owning project, if scoped.
    pub project_id: Option<ProjectId>,
    /// Session that produced the item, if any.
    pub session_id: Option<SessionId>,
    /// Importance in `[0, 100]`.
    pub importance: f64,
    /// Quality in `[0, 100]`.
    pub quality: f64,
    /// Times the item was included in an assembled context.
    pub usage_count: u32,
    /// Times the item was validated.
    pub validation_count: u32,
    /// Times the item was contradicted.
    pub contradiction_count: u32,
    /// Embedding vector, absent when the provider was unavailable.
    pub embedding: Option<Vec<f32>>,
    /// Provider version tag the embedding was produced under.
    pub embedding_version: Option<String>,
    /// Caller-supplied retrieval triggers, merged into the lexical index.
    pub retrieval_triggers: Vec<String>,
    /// Whether the item is shared across projects.
    pub cross_project: bool,
    /// Projects the item was learned from, when cross-project.
    pub source_projects: Vec<ProjectId>,
    /// Monotonic version, bumped on supersession.
    pub version: u32,
    /// The item that replaced this one, if any.
    pub superseded_by: Option<KnowledgeId>,
    /// Items this one replaced.
    pub supersedes: Vec<KnowledgeId>,
    /// Whether the item participates in default retrieval.
    pub is_active: bool,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last update instant.
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeItem {
    /// Creates an active item with neutral importance and quality.
    #[must_use]
    pub fn new(
        knowledge_type: KnowledgeType,
        category: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: KnowledgeId::new(),
            knowledge_type,
            semantic_type: None,
            semantic_confidence: None,
            classification_method: None,
            title: title.into(),
            content: content.into(),
            category: category.into(),
            context_data: serde_json::Map::new(),
            project_id: None,
            session_id: None,
            importance: 50.0,
            quality: 50.0,
            usage_count: 0,
            validation_count: 0,
            contradiction_count: 0,
            embedding: None,
            embedding_version: None,
            retrieval_triggers: Vec::new(),
            cross_project: false,
            source_projects: Vec::new(),
            version: 1,
            superseded_by: None,
            supersedes: Vec::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Estimated token cost when packed into a context payload.
    #[must_use]
    pub fn tokens_est(&self) -> usize {
        super::estimate_tokens(&self.title) + super::estimate_tokens(&self.content)
    }

    /// The text stream fed to the lexical index: title, content, and any
    /// caller-supplied retrieval triggers.
    #[must_use]
    pub fn lexical_text(&self) -> String {
        if self.retrieval_triggers.is_empty() {
            self.content.clone()
        } else {
            format!("{}\n{}", self.content, self.retrieval_triggers.join(" "))
        }
    }

    /// Validates the item against the data-model invariants.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` on empty title/content, oversize title,
    /// out-of-range scores, embedding dimension mismatch, or a
    /// `semantic_type` incompatible with `knowledge_type` per `table`.
    pub fn validate(
        &self,
        dimensions: usize,
        table: &HashMap<KnowledgeType, SemanticType>,
    ) -> crate::Result<()> {
        if self.title.trim().is_empty() {
            return Err(crate::Error::Validation(
                "knowledge title must not be empty".to_string(),
            ));
        }
        if self.title.chars().count() > MAX_TITLE_CHARS {
            return Err(crate::Error::Validation(format!(
                "knowledge title exceeds {MAX_TITLE_CHARS} characters"
            )));
        }
        if self.content.trim().is_empty() {
            return Err(crate::Error::Validation(
                "knowledge content must not be empty".to_string(),
            ));
        }
        validate_percent("importance", self.importance)?;
        validate_percent("quality", self.quality)?;
        if let Some(c) = self.semantic_confidence {
            validate_unit("semantic_confidence", c)?;
        }
        validate_embedding(self.embedding.as_deref(), dimensions)?;

        if let Some(semantic) = self.semantic_type {
            let compatible = table.get(&self.knowledge_type).copied();
            if compatible != Some(semantic) {
                return Err(crate::Error::Validation(format!(
                    "semantic_type {semantic} is not compatible with knowledge_type {}",
                    self.knowledge_type
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn item() -> KnowledgeItem {
        KnowledgeItem::new(
            KnowledgeType::Technical,
            "configuration",
            "X requires absolute path",
            "Config must use absolute path to X",
        )
    }

    #[test]
    fn test_valid_item_passes() {
        let table = default_consistency_table();
        assert!(item().validate(768, &table).is_ok());
    }

    #[test]
    fn test_title_length_cap() {
        let table = default_consistency_table();
        let mut it = item();
        it.title = "x".repeat(MAX_TITLE_CHARS + 1);
        assert!(it.validate(768, &table).is_err());
    }

    #[test_case(-0.5, false ; "below range")]
    #[test_case(0.0, true ; "lower bound")]
    #[test_case(50.0, true ; "midpoint")]
    #[test_case(100.0, true ; "upper bound")]
    #[test_case(101.0, false ; "above range")]
    fn test_importance_range(importance: f64, valid: bool) {
        let table = default_consistency_table();
        let mut it = item();
        it.importance = importance;
        assert_eq!(it.validate(768, &table).is_ok(), valid);
    }

    #[test]
    fn test_embedding_dimension_checked() {
        let table = default_consistency_table();
        let mut it = item();
        it.embedding = Some(vec![0.5; 12]);
        assert!(it.validate(768, &table).is_err());
        it.embedding = Some(vec![0.5; 768]);
        assert!(it.validate(768, &table).is_ok());
    }

    #[test_case(KnowledgeType::Technical, SemanticType::TechnicalDiscovery, true ; "technical refines to discovery")]
    #[test_case(KnowledgeType::Technical, SemanticType::Factual, false ; "technical rejects factual")]
    #[test_case(KnowledgeType::Patterns, SemanticType::PatternRecognition, true ; "patterns refines to recognition")]
    #[test_case(KnowledgeType::Strategic, SemanticType::StrategicInsight, true ; "strategic refines to insight")]
    #[test_case(KnowledgeType::Factual, SemanticType::Factual, true ; "shared name maps to itself")]
    #[test_case(KnowledgeType::Factual, SemanticType::Procedural, false ; "factual rejects procedural")]
    fn test_semantic_type_consistency(
        knowledge_type: KnowledgeType,
        semantic_type: SemanticType,
        valid: bool,
    ) {
        let table = default_consistency_table();
        let mut it = KnowledgeItem::new(knowledge_type, "test", "some title", "some content");
        it.semantic_type = Some(semantic_type);
        assert_eq!(it.validate(768, &table).is_ok(), valid);
    }

    #[test]
    fn test_lexical_text_merges_triggers() {
        let mut it = item();
        assert_eq!(it.lexical_text(), it.content);
        it.retrieval_triggers = vec!["path".to_string(), "config".to_string()];
        assert!(it.lexical_text().ends_with("path config"));
    }

    #[test]
    fn test_tokens_est() {
        let it = item();
        let expected = it.title.chars().count().div_ceil(4) + it.content.chars().count().div_ceil(4);
        assert_eq!(it.tokens_est(), expected);
    }
}
