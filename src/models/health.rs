//! Component health reporting and the external tool registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// System components that report health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthComponent {
    /// The SQLite store and its indexes.
    Database,
    /// The warm cache.
    Cache,
    /// The tool surface.
    McpIntegration,
    /// The pattern engine.
    PatternEngine,
    /// The redirection/semantic classifier.
    SemanticClassifier,
    /// The context assembler.
    ContextManager,
    /// Aggregate system health.
    OverallSystem,
}

impl HealthComponent {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Cache => "cache",
            Self::McpIntegration => "mcp_integration",
            Self::PatternEngine => "pattern_engine",
            Self::SemanticClassifier => "semantic_classifier",
            Self::ContextManager => "context_manager",
            Self::OverallSystem => "overall_system",
        }
    }
}

impl FromStr for HealthComponent {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "database" => Ok(Self::Database),
            "cache" => Ok(Self::Cache),
            "mcp_integration" => Ok(Self::McpIntegration),
            "pattern_engine" => Ok(Self::PatternEngine),
            "semantic_classifier" => Ok(Self::SemanticClassifier),
            "context_manager" => Ok(Self::ContextManager),
            "overall_system" => Ok(Self::OverallSystem),
            other => Err(crate::Error::Validation(format!(
                "unknown health component: {other}"
            ))),
        }
    }
}

impl fmt::Display for HealthComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Health state of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operating in a reduced mode.
    Degraded,
    /// Barely operational.
    Critical,
    /// Not operational.
    Offline,
    /// Returning to service.
    Recovering,
}

impl HealthStatus {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Critical => "critical",
            Self::Offline => "offline",
            Self::Recovering => "recovering",
        }
    }
}

impl FromStr for HealthStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(Self::Healthy),
            "degraded" => Ok(Self::Degraded),
            "critical" => Ok(Self::Critical),
            "offline" => Ok(Self::Offline),
            "recovering" => Ok(Self::Recovering),
            other => Err(crate::Error::Validation(format!(
                "unknown health status: {other}"
            ))),
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One health observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthLog {
    /// Unique identifier.
    pub id: uuid::Uuid,
    /// The component observed.
    pub component: HealthComponent,
    /// Observed status.
    pub status: HealthStatus,
    /// Component metrics at observation time.
    pub metrics: Map<String, Value>,
    /// Error details, when unhealthy.
    pub error_details: Option<String>,
    /// Recovery actions taken or recommended.
    pub recovery_actions: Vec<String>,
    /// Observation instant.
    pub created_at: DateTime<Utc>,
}

impl HealthLog {
    /// Creates a health observation.
    #[must_use]
    pub fn new(component: HealthComponent, status: HealthStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            component,
            status,
            metrics: Map::new(),
            error_details: None,
            recovery_actions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Attaches error details.
    #[must_use]
    pub fn with_error(mut self, details: impl Into<String>) -> Self {
        self.error_details = Some(details.into());
        self
    }

    /// Attaches a metric value.
    #[must_use]
    pub fn with_metric(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }
}

/// A registered external tool and its observed service quality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRegistryEntry {
    /// Tool name (unique).
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema of the tool input.
    pub input_schema: Value,
    /// Last observed health.
    pub health_status: HealthStatus,
    /// Rolling mean response time in milliseconds.
    pub avg_response_time_ms: f64,
    /// Rolling success rate in `[0, 1]`.
    pub success_rate: f64,
    /// Last update instant.
    pub updated_at: DateTime<Utc>,
}

impl ToolRegistryEntry {
    /// Creates a healthy entry with no observations yet.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            health_status: HealthStatus::Healthy,
            avg_response_time_ms: 0.0,
            success_rate: 1.0,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_log_builder() {
        let log = HealthLog::new(HealthComponent::Database, HealthStatus::Degraded)
            .with_error("vector index corrupt")
            .with_metric("rows", Value::from(42));
        assert_eq!(log.component, HealthComponent::Database);
        assert_eq!(log.status, HealthStatus::Degraded);
        assert_eq!(log.error_details.as_deref(), Some("vector index corrupt"));
        assert_eq!(log.metrics["rows"], Value::from(42));
    }

    #[test]
    fn test_status_ordering() {
        // Healthy sorts first; useful for picking the worst status.
        assert!(HealthStatus::Healthy < HealthStatus::Degraded);
        assert!(HealthStatus::Degraded < HealthStatus::Offline);
    }
}
