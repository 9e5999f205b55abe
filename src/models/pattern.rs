//! Recognized recurring structures and the edges between them.

use super::{PatternId, ProjectId, SessionId, validate_embedding, validate_unit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Kind of structure a pattern captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// An ordered sequence of steps that recurs.
    ProceduralSequence,
    /// A multi-actor process flow.
    ProcessFlow,
    /// A cause-and-effect relationship.
    CausalRelationship,
    /// A dependency between components or steps.
    DependencyRelationship,
    /// A structure that recurs without an obvious mechanism.
    RecurringPattern,
    /// A structure in stored content itself.
    ContentPattern,
    /// A pattern about the session or corpus (analyzer reports land here).
    MetaPattern,
    /// A pattern in strategic decision-making.
    StrategicPattern,
}

impl PatternType {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProceduralSequence => "procedural_sequence",
            Self::ProcessFlow => "process_flow",
            Self::CausalRelationship => "causal_relationship",
            Self::DependencyRelationship => "dependency_relationship",
            Self::RecurringPattern => "recurring_pattern",
            Self::ContentPattern => "content_pattern",
            Self::MetaPattern => "meta_pattern",
            Self::StrategicPattern => "strategic_pattern",
        }
    }
}

impl FromStr for PatternType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "procedural_sequence" => Ok(Self::ProceduralSequence),
            "process_flow" => Ok(Self::ProcessFlow),
            "causal_relationship" => Ok(Self::CausalRelationship),
            "dependency_relationship" => Ok(Self::DependencyRelationship),
            "recurring_pattern" => Ok(Self::RecurringPattern),
            "content_pattern" => Ok(Self::ContentPattern),
            "meta_pattern" => Ok(Self::MetaPattern),
            "strategic_pattern" => Ok(Self::StrategicPattern),
            other => Err(crate::Error::Validation(format!(
                "unknown pattern type: {other}"
            ))),
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validation lifecycle state of a pattern or insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Not yet validated.
    Pending,
    /// Confirmed by evidence.
    Validated,
    /// Contradicted by evidence.
    Contradicted,
    /// Replaced by a newer pattern.
    Superseded,
    /// Retired from active use.
    Archived,
}

impl ValidationStatus {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Contradicted => "contradicted",
            Self::Superseded => "superseded",
            Self::Archived => "archived",
        }
    }
}

impl FromStr for ValidationStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "validated" => Ok(Self::Validated),
            "contradicted" => Ok(Self::Contradicted),
            "superseded" => Ok(Self::Superseded),
            "archived" => Ok(Self::Archived),
            other => Err(crate::Error::Validation(format!(
                "unknown validation status: {other}"
            ))),
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured pattern content.
///
/// Shapes are tagged where known; `Freeform` is the forward-compatibility
/// escape hatch for content that fits no known shape. Every variant
/// carries an `extra` map for fields outside the declared shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternContent {
    /// An ordered sequence of steps.
    Sequence {
        /// The steps in order.
        steps: Vec<String>,
        /// Conditions required before the sequence applies.
        #[serde(default)]
        preconditions: Vec<String>,
        /// Fields outside the declared shape.
        #[serde(default)]
        extra: Map<String, Value>,
    },
    /// A cause-and-effect statement.
    Causal {
        /// The observed cause.
        cause: String,
        /// The observed effect.
        effect: String,
        /// The mechanism, when understood.
        #[serde(default)]
        mechanism: Option<String>,
        /// Fields outside the declared shape.
        #[serde(default)]
        extra: Map<String, Value>,
    },
    /// A recurring observation.
    Recurring {
        /// What recurs.
        description: String,
        /// How many times it has been seen.
        occurrences: u32,
        /// Fields outside the declared shape.
        #[serde(default)]
        extra: Map<String, Value>,
    },
    /// An analyzer or corpus report.
    Report {
        /// One-line summary.
        summary: String,
        /// Report metrics.
        #[serde(default)]
        metrics: Map<String, Value>,
        /// Fields outside the declared shape.
        #[serde(default)]
        extra: Map<String, Value>,
    },
    /// Content with no known shape.
    Freeform {
        /// The raw fields.
        fields: Map<String, Value>,
    },
}

impl PatternContent {
    /// Derives the text stream fed to the lexical index.
    #[must_use]
    pub fn lexical_text(&self) -> String {
        match self {
            Self::Sequence { steps, .. } => steps.join(" "),
            Self::Causal {
                cause,
                effect,
                mechanism,
                ..
            } => {
                let mut text = format!("{cause} {effect}");
                if let Some(m) = mechanism {
                    text.push(' ');
                    text.push_str(m);
                }
                text
            },
            Self::Recurring { description, .. } => description.clone(),
            Self::Report { summary, .. } => summary.clone(),
            Self::Freeform { fields } => fields
                .values()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// A recognized recurring structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    /// Unique identifier.
    pub id: PatternId,
    /// Kind of structure.
    pub pattern_type: PatternType,
    /// Short title.
    pub title: String,
    /// Structured content.
    pub content: PatternContent,
    /// Free-form category label.
    pub category: String,
    /// Owning project, if scoped.
    pub project_id: Option<ProjectId>,
    /// Session that produced the pattern, if any.
    pub session_id: Option<SessionId>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Observed success rate in `[0, 1]`.
    pub success_rate: f64,
    /// Strength of the recurrence signal in `[0, 1]`.
    pub pattern_strength: f64,
    /// Validation lifecycle state.
    pub validation_status: ValidationStatus,
    /// Embedding vector.
    pub embedding: Option<Vec<f32>>,
    /// Provider version tag the embedding was produced under.
    pub embedding_version: Option<String>,
    /// Denormalized neighbor ids for graph traversal.
    pub related_patterns: Vec<PatternId>,
    /// Whether the pattern participates in default retrieval.
    pub is_active: bool,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last update instant.
    pub updated_at: DateTime<Utc>,
}

impl Pattern {
    /// Creates a pending pattern with neutral scores.
    #[must_use]
    pub fn new(
        pattern_type: PatternType,
        title: impl Into<String>,
        content: PatternContent,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PatternId::new(),
            pattern_type,
            title: title.into(),
            content,
            category: String::new(),
            project_id: None,
            session_id: None,
            confidence: 0.5,
            success_rate: 0.0,
            pattern_strength: 0.5,
            validation_status: ValidationStatus::Pending,
            embedding: None,
            embedding_version: None,
            related_patterns: Vec::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Estimated token cost when packed into a context payload.
    #[must_use]
    pub fn tokens_est(&self) -> usize {
        super::estimate_tokens(&self.title) + super::estimate_tokens(&self.content.lexical_text())
    }

    /// Validates the pattern against the data-model invariants.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` on an empty title, out-of-range scores,
    /// or an embedding dimension mismatch.
    pub fn validate(&self, dimensions: usize) -> crate::Result<()> {
        if self.title.trim().is_empty() {
            return Err(crate::Error::Validation(
                "pattern title must not be empty".to_string(),
            ));
        }
        validate_unit("confidence", self.confidence)?;
        validate_unit("success_rate", self.success_rate)?;
        validate_unit("pattern_strength", self.pattern_strength)?;
        validate_embedding(self.embedding.as_deref(), dimensions)
    }
}

/// Directed edge kinds between patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    /// Source brings about target.
    Causes,
    /// Source requires target.
    DependsOn,
    /// Source happens after target.
    Follows,
    /// Source resembles target.
    SimilarTo,
    /// Source conflicts with target.
    Contradicts,
    /// Source amplifies target.
    Enhances,
    /// Source replaces target.
    Replaces,
    /// Source is a component of target.
    PartOf,
    /// Source is an instance of target.
    ExampleOf,
    /// Source must hold before target applies.
    PrerequisiteFor,
}

impl RelationshipType {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Causes => "causes",
            Self::DependsOn => "depends_on",
            Self::Follows => "follows",
            Self::SimilarTo => "similar_to",
            Self::Contradicts => "contradicts",
            Self::Enhances => "enhances",
            Self::Replaces => "replaces",
            Self::PartOf => "part_of",
            Self::ExampleOf => "example_of",
            Self::PrerequisiteFor => "prerequisite_for",
        }
    }
}

impl FromStr for RelationshipType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "causes" => Ok(Self::Causes),
            "depends_on" => Ok(Self::DependsOn),
            "follows" => Ok(Self::Follows),
            "similar_to" => Ok(Self::SimilarTo),
            "contradicts" => Ok(Self::Contradicts),
            "enhances" => Ok(Self::Enhances),
            "replaces" => Ok(Self::Replaces),
            "part_of" => Ok(Self::PartOf),
            "example_of" => Ok(Self::ExampleOf),
            "prerequisite_for" => Ok(Self::PrerequisiteFor),
            other => Err(crate::Error::Validation(format!(
                "unknown relationship type: {other}"
            ))),
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed edge between two distinct patterns.
///
/// `(source, target, relationship_type)` is unique across active rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRelationship {
    /// Unique identifier.
    pub id: uuid::Uuid,
    /// Edge source.
    pub source_pattern_id: PatternId,
    /// Edge target.
    pub target_pattern_id: PatternId,
    /// Edge kind.
    pub relationship_type: RelationshipType,
    /// Edge strength in `[0, 1]`.
    pub strength: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Supporting evidence.
    pub evidence: Map<String, Value>,
    /// Times the edge was validated.
    pub validation_count: u32,
    /// Times the edge was contradicted.
    pub contradiction_count: u32,
    /// How the edge was extracted.
    pub extraction_metadata: Map<String, Value>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last update instant.
    pub updated_at: DateTime<Utc>,
}

impl PatternRelationship {
    /// Creates an edge with default strength and confidence.
    #[must_use]
    pub fn new(
        source: PatternId,
        target: PatternId,
        relationship_type: RelationshipType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            source_pattern_id: source,
            target_pattern_id: target,
            relationship_type,
            strength: 0.5,
            confidence: 0.5,
            evidence: Map::new(),
            validation_count: 0,
            contradiction_count: 0,
            extraction_metadata: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Validates the edge invariants.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` when the edge is a self-loop or a score
    /// is out of range.
    pub fn validate(&self) -> crate::Result<()> {
        if self.source_pattern_id == self.target_pattern_id {
            return Err(crate::Error::Validation(
                "relationship source and target must differ".to_string(),
            ));
        }
        validate_unit("strength", self.strength)?;
        validate_unit("confidence", self.confidence)
    }
}
