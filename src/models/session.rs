//! AI session tracking.

use super::{ProjectId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One AI assistant session within a project.
///
/// Counters are updated atomically with interaction writes; a failed
/// interaction increments `failed_interactions` but leaves the session
/// open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier.
    pub id: SessionId,
    /// Client-supplied session id, unique within the project.
    pub external_id: String,
    /// Owning project.
    pub project_id: ProjectId,
    /// Session kind (default "interactive").
    pub session_type: String,
    /// Free-form client context supplied at start.
    pub user_context: Map<String, Value>,
    /// Start instant.
    pub started_at: DateTime<Utc>,
    /// End instant, set by `end_session` or the idle timeout.
    pub ended_at: Option<DateTime<Utc>>,
    /// Total interactions observed.
    pub total_interactions: u32,
    /// Interactions that completed successfully.
    pub successful_interactions: u32,
    /// Interactions that failed.
    pub failed_interactions: u32,
    /// Rolling mean response time in milliseconds.
    pub avg_response_time_ms: f64,
    /// Whether pattern extraction runs for this session.
    pub pattern_extraction_enabled: bool,
    /// Whether the semantic classifier runs for this session.
    pub semantic_classification_enabled: bool,
    /// Whether error-recovery suggestions are produced.
    pub error_recovery_enabled: bool,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last update instant.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new interactive session.
    #[must_use]
    pub fn new(external_id: impl Into<String>, project_id: ProjectId) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            external_id: external_id.into(),
            project_id,
            session_type: "interactive".to_string(),
            user_context: Map::new(),
            started_at: now,
            ended_at: None,
            total_interactions: 0,
            successful_interactions: 0,
            failed_interactions: 0,
            avg_response_time_ms: 0.0,
            pattern_extraction_enabled: true,
            semantic_classification_enabled: true,
            error_recovery_enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the session is still open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Duration of the session so far (or total, once ended).
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.ended_at.unwrap_or_else(Utc::now) - self.started_at
    }

    /// Records one interaction outcome into the counters.
    pub fn record_interaction(&mut self, success: bool, response_time_ms: f64) {
        self.total_interactions += 1;
        if success {
            self.successful_interactions += 1;
        } else {
            self.failed_interactions += 1;
        }
        // Incremental mean over all interactions.
        let n = f64::from(self.total_interactions);
        self.avg_response_time_ms += (response_time_ms - self.avg_response_time_ms) / n;
        self.updated_at = Utc::now();
    }

    /// Ratio of successful interactions, or 1.0 for an untouched session.
    #[must_use]
    pub fn quality_score(&self) -> f64 {
        if self.total_interactions == 0 {
            return 1.0;
        }
        f64::from(self.successful_interactions) / f64::from(self.total_interactions)
    }

    /// Validates the session counters.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the external id is empty or the
    /// counters are inconsistent (`successful + failed > total`).
    pub fn validate(&self) -> crate::Result<()> {
        if self.external_id.trim().is_empty() {
            return Err(crate::Error::Validation(
                "session external_id must not be empty".to_string(),
            ));
        }
        if self.successful_interactions + self.failed_interactions > self.total_interactions {
            return Err(crate::Error::Validation(format!(
                "session counters inconsistent: {} successful + {} failed > {} total",
                self.successful_interactions, self.failed_interactions, self.total_interactions
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_interaction_updates_counters() {
        let mut session = Session::new("ext-1", ProjectId::new());
        session.record_interaction(true, 100.0);
        session.record_interaction(false, 300.0);

        assert_eq!(session.total_interactions, 2);
        assert_eq!(session.successful_interactions, 1);
        assert_eq!(session.failed_interactions, 1);
        assert!((session.avg_response_time_ms - 200.0).abs() < f64::EPSILON);
        assert!(session.validate().is_ok());
    }

    #[test]
    fn test_counter_invariant() {
        let mut session = Session::new("ext-1", ProjectId::new());
        session.successful_interactions = 2;
        session.failed_interactions = 1;
        session.total_interactions = 2;
        assert!(session.validate().is_err());
    }

    #[test]
    fn test_quality_score() {
        let mut session = Session::new("ext-1", ProjectId::new());
        assert!((session.quality_score() - 1.0).abs() < f64::EPSILON);
        session.record_interaction(true, 10.0);
        session.record_interaction(true, 10.0);
        session.record_interaction(false, 10.0);
        assert!((session.quality_score() - 2.0 / 3.0).abs() < 1e-9);
    }
}
