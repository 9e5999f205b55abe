//! Cross-project strategic insights.

use super::{InsightId, ProjectType, SemanticType, ValidationStatus, validate_embedding, validate_unit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Kind of strategic learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    /// A reusable way of working.
    Methodology,
    /// A cross-project pattern.
    Pattern,
    /// A problem-solving approach.
    Approach,
    /// A lesson learned.
    Lesson,
    /// A deliberate strategy.
    Strategy,
    /// An optimization opportunity.
    Optimization,
    /// A way to reduce risk.
    RiskMitigation,
    /// A confirmed best practice.
    BestPractice,
}

impl InsightType {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Methodology => "methodology",
            Self::Pattern => "pattern",
            Self::Approach => "approach",
            Self::Lesson => "lesson",
            Self::Strategy => "strategy",
            Self::Optimization => "optimization",
            Self::RiskMitigation => "risk_mitigation",
            Self::BestPractice => "best_practice",
        }
    }
}

impl FromStr for InsightType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "methodology" => Ok(Self::Methodology),
            "pattern" => Ok(Self::Pattern),
            "approach" => Ok(Self::Approach),
            "lesson" => Ok(Self::Lesson),
            "strategy" => Ok(Self::Strategy),
            "optimization" => Ok(Self::Optimization),
            "risk_mitigation" => Ok(Self::RiskMitigation),
            "best_practice" => Ok(Self::BestPractice),
            other => Err(crate::Error::Validation(format!(
                "unknown insight type: {other}"
            ))),
        }
    }
}

impl fmt::Display for InsightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A learning that transfers across projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategicInsight {
    /// Unique identifier.
    pub id: InsightId,
    /// Kind of learning.
    pub insight_type: InsightType,
    /// Short title.
    pub title: String,
    /// Structured content.
    pub content: Map<String, Value>,
    /// Project types this insight applies to; empty means all.
    pub applicable_project_types: Vec<ProjectType>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Observed effectiveness in `[0, 1]`.
    pub effectiveness: f64,
    /// Refined classification.
    pub semantic_type: Option<SemanticType>,
    /// Embedding vector.
    pub embedding: Option<Vec<f32>>,
    /// Provider version tag the embedding was produced under.
    pub embedding_version: Option<String>,
    /// Validation lifecycle state.
    pub validation_status: ValidationStatus,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last update instant.
    pub updated_at: DateTime<Utc>,
}

impl StrategicInsight {
    /// Creates a pending insight applicable to all project types.
    #[must_use]
    pub fn new(insight_type: InsightType, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: InsightId::new(),
            insight_type,
            title: title.into(),
            content: Map::new(),
            applicable_project_types: Vec::new(),
            confidence: 0.5,
            effectiveness: 0.0,
            semantic_type: Some(SemanticType::StrategicInsight),
            embedding: None,
            embedding_version: None,
            validation_status: ValidationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the insight applies to the given project type.
    #[must_use]
    pub fn applies_to(&self, project_type: ProjectType) -> bool {
        self.applicable_project_types.is_empty()
            || self.applicable_project_types.contains(&project_type)
    }

    /// The text stream fed to the lexical index.
    #[must_use]
    pub fn lexical_text(&self) -> String {
        self.content
            .values()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Estimated token cost when packed into a context payload.
    #[must_use]
    pub fn tokens_est(&self) -> usize {
        super::estimate_tokens(&self.title) + super::estimate_tokens(&self.lexical_text())
    }

    /// Validates the insight invariants.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` on an empty title, out-of-range scores,
    /// or an embedding dimension mismatch.
    pub fn validate(&self, dimensions: usize) -> crate::Result<()> {
        if self.title.trim().is_empty() {
            return Err(crate::Error::Validation(
                "insight title must not be empty".to_string(),
            ));
        }
        validate_unit("confidence", self.confidence)?;
        validate_unit("effectiveness", self.effectiveness)?;
        validate_embedding(self.embedding.as_deref(), dimensions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applies_to() {
        let mut insight = StrategicInsight::new(InsightType::Lesson, "ship smaller diffs");
        assert!(insight.applies_to(ProjectType::Software));
        assert!(insight.applies_to(ProjectType::Research));

        insight.applicable_project_types = vec![ProjectType::Software];
        assert!(insight.applies_to(ProjectType::Software));
        assert!(!insight.applies_to(ProjectType::Research));
    }

    #[test]
    fn test_validate_ranges() {
        let mut insight = StrategicInsight::new(InsightType::BestPractice, "pin dependencies");
        assert!(insight.validate(768).is_ok());
        insight.effectiveness = -0.1;
        assert!(insight.validate(768).is_err());
    }
}
