//! Project scope.

use super::ProjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Kind of work a project represents.
///
/// Strategic insights declare the project types they apply to, so the
/// vocabulary is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    /// Software engineering work.
    Software,
    /// Research or analysis work.
    Research,
    /// Genealogy research.
    Genealogy,
    /// Uncategorized work.
    General,
    /// AI/ML engineering work.
    Ai,
    /// Meta-work on the pattern corpus itself.
    PatternIntelligence,
}

impl ProjectType {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Software => "software",
            Self::Research => "research",
            Self::Genealogy => "genealogy",
            Self::General => "general",
            Self::Ai => "ai",
            Self::PatternIntelligence => "pattern_intelligence",
        }
    }
}

impl FromStr for ProjectType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "software" => Ok(Self::Software),
            "research" => Ok(Self::Research),
            "genealogy" => Ok(Self::Genealogy),
            "general" => Ok(Self::General),
            "ai" => Ok(Self::Ai),
            "pattern_intelligence" => Ok(Self::PatternIntelligence),
            other => Err(crate::Error::Validation(format!(
                "unknown project type: {other}"
            ))),
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named scope that owns sessions and knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier.
    pub id: ProjectId,
    /// Unique machine name.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Kind of work this project represents.
    pub project_type: ProjectType,
    /// Free-form settings.
    pub settings: Map<String, Value>,
    /// Whether the project accepts new sessions.
    pub active: bool,
    /// Schema version the project rows were written under.
    pub schema_version: u32,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last update instant.
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Creates an active project with empty settings.
    #[must_use]
    pub fn new(name: impl Into<String>, project_type: ProjectType) -> Self {
        let now = Utc::now();
        let name = name.into();
        Self {
            id: ProjectId::new(),
            display_name: name.clone(),
            name,
            project_type,
            settings: Map::new(),
            active: true,
            schema_version: crate::storage::SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validates the project invariants.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if the name is empty.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::Validation(
                "project name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_type_roundtrip() {
        for ty in [
            ProjectType::Software,
            ProjectType::Research,
            ProjectType::Genealogy,
            ProjectType::General,
            ProjectType::Ai,
            ProjectType::PatternIntelligence,
        ] {
            assert_eq!(ty.as_str().parse::<ProjectType>().unwrap(), ty);
        }
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut project = Project::new("api", ProjectType::Software);
        assert!(project.validate().is_ok());
        project.name = "  ".to_string();
        assert!(project.validate().is_err());
    }
}
