//! Evidence and usage records for patterns.

use super::{PatternId, ProjectId, SessionId, validate_unit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Kind of validation evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationType {
    /// The pattern was used and the use succeeded.
    UsageSuccess,
    /// An outcome predicted by the pattern was verified.
    OutcomeVerification,
    /// A deliberate check for contradicting evidence.
    ContradictionCheck,
    /// Reviewed by a peer.
    PeerReview,
    /// Produced by an automated validator.
    AutomatedValidation,
    /// Direct user feedback.
    UserFeedback,
}

impl ValidationType {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UsageSuccess => "usage_success",
            Self::OutcomeVerification => "outcome_verification",
            Self::ContradictionCheck => "contradiction_check",
            Self::PeerReview => "peer_review",
            Self::AutomatedValidation => "automated_validation",
            Self::UserFeedback => "user_feedback",
        }
    }
}

impl FromStr for ValidationType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usage_success" => Ok(Self::UsageSuccess),
            "outcome_verification" => Ok(Self::OutcomeVerification),
            "contradiction_check" => Ok(Self::ContradictionCheck),
            "peer_review" => Ok(Self::PeerReview),
            "automated_validation" => Ok(Self::AutomatedValidation),
            "user_feedback" => Ok(Self::UserFeedback),
            other => Err(crate::Error::Validation(format!(
                "unknown validation type: {other}"
            ))),
        }
    }
}

impl fmt::Display for ValidationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who produced a validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatedBy {
    /// The system itself.
    System,
    /// A human user.
    User,
    /// An LLM judgment.
    Llm,
    /// The semantic classifier.
    SemanticClassifier,
    /// The pattern engine.
    PatternEngine,
    /// A peer-review process.
    PeerReview,
}

impl ValidatedBy {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Llm => "llm",
            Self::SemanticClassifier => "semantic_classifier",
            Self::PatternEngine => "pattern_engine",
            Self::PeerReview => "peer_review",
        }
    }
}

impl FromStr for ValidatedBy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "llm" => Ok(Self::Llm),
            "semantic_classifier" => Ok(Self::SemanticClassifier),
            "pattern_engine" => Ok(Self::PatternEngine),
            "peer_review" => Ok(Self::PeerReview),
            other => Err(crate::Error::Validation(format!(
                "unknown validator: {other}"
            ))),
        }
    }
}

/// One piece of validation evidence for a pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternValidation {
    /// Unique identifier.
    pub id: uuid::Uuid,
    /// The validated pattern.
    pub pattern_id: PatternId,
    /// Kind of evidence.
    pub validation_type: ValidationType,
    /// Whether the evidence supports the pattern.
    pub result: bool,
    /// Supporting details.
    pub evidence: Map<String, Value>,
    /// Who produced the validation.
    pub validated_by: ValidatedBy,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Session the evidence came from, if any.
    pub session_id: Option<SessionId>,
    /// Project the evidence came from, if any.
    pub project_id: Option<ProjectId>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

impl PatternValidation {
    /// Creates a validation record.
    #[must_use]
    pub fn new(
        pattern_id: PatternId,
        validation_type: ValidationType,
        result: bool,
        validated_by: ValidatedBy,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            pattern_id,
            validation_type,
            result,
            evidence: Map::new(),
            validated_by,
            confidence: 0.5,
            session_id: None,
            project_id: None,
            created_at: Utc::now(),
        }
    }

    /// Validates the record invariants.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` when confidence is out of range.
    pub fn validate(&self) -> crate::Result<()> {
        validate_unit("confidence", self.confidence)
    }
}

/// Outcome of one pattern use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageOutcome {
    /// The use achieved its goal.
    Successful,
    /// The use failed.
    Failed,
    /// The use partly achieved its goal.
    Partial,
    /// The pattern turned out not to apply.
    NotApplicable,
    /// The pattern applied but needs refinement.
    NeedsRefinement,
}

impl UsageOutcome {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Partial => "partial",
            Self::NotApplicable => "not_applicable",
            Self::NeedsRefinement => "needs_refinement",
        }
    }
}

impl FromStr for UsageOutcome {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "successful" => Ok(Self::Successful),
            "failed" => Ok(Self::Failed),
            "partial" => Ok(Self::Partial),
            "not_applicable" => Ok(Self::NotApplicable),
            "needs_refinement" => Ok(Self::NeedsRefinement),
            other => Err(crate::Error::Validation(format!(
                "unknown usage outcome: {other}"
            ))),
        }
    }
}

/// How a pattern came to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    /// Included in an assembled context for a query.
    QueryResponse,
    /// Surfaced proactively.
    ProactiveSuggestion,
    /// Used while recovering from an error.
    ErrorRecovery,
    /// Matched during pattern extraction.
    PatternMatching,
}

impl UsageType {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::QueryResponse => "query_response",
            Self::ProactiveSuggestion => "proactive_suggestion",
            Self::ErrorRecovery => "error_recovery",
            Self::PatternMatching => "pattern_matching",
        }
    }
}

impl FromStr for UsageType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query_response" => Ok(Self::QueryResponse),
            "proactive_suggestion" => Ok(Self::ProactiveSuggestion),
            "error_recovery" => Ok(Self::ErrorRecovery),
            "pattern_matching" => Ok(Self::PatternMatching),
            other => Err(crate::Error::Validation(format!(
                "unknown usage type: {other}"
            ))),
        }
    }
}

/// One invocation of a pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternUsage {
    /// Unique identifier.
    pub id: uuid::Uuid,
    /// The used pattern.
    pub pattern_id: PatternId,
    /// Session the use happened in.
    pub session_id: Option<SessionId>,
    /// What the pattern was used for.
    pub usage_context: String,
    /// How the use turned out; absent until feedback arrives.
    pub usage_outcome: Option<UsageOutcome>,
    /// How the pattern came to be used.
    pub usage_type: UsageType,
    /// Observed effectiveness in `[0, 1]`, when known.
    pub effectiveness: Option<f64>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

impl PatternUsage {
    /// Creates a usage record with the outcome still pending.
    #[must_use]
    pub fn new(pattern_id: PatternId, usage_type: UsageType, usage_context: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            pattern_id,
            session_id: None,
            usage_context: usage_context.into(),
            usage_outcome: None,
            usage_type,
            effectiveness: None,
            created_at: Utc::now(),
        }
    }

    /// Validates the record invariants.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` when effectiveness is out of range.
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(e) = self.effectiveness {
            validate_unit("effectiveness", e)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_confidence_range() {
        let mut v = PatternValidation::new(
            PatternId::new(),
            ValidationType::UsageSuccess,
            true,
            ValidatedBy::System,
        );
        assert!(v.validate().is_ok());
        v.confidence = 2.0;
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_usage_effectiveness_optional() {
        let mut u = PatternUsage::new(PatternId::new(), UsageType::QueryResponse, "assembled");
        assert!(u.validate().is_ok());
        u.effectiveness = Some(0.9);
        assert!(u.validate().is_ok());
        u.effectiveness = Some(1.2);
        assert!(u.validate().is_err());
    }

    #[test]
    fn test_enum_strings() {
        assert_eq!(UsageType::QueryResponse.as_str(), "query_response");
        assert_eq!(
            "needs_refinement".parse::<UsageOutcome>().unwrap(),
            UsageOutcome::NeedsRefinement
        );
        assert_eq!(
            "semantic_classifier".parse::<ValidatedBy>().unwrap(),
            ValidatedBy::SemanticClassifier
        );
    }
}
