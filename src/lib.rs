//! # Engram
//!
//! Knowledge persistence and context assembly engine for AI assistants.
//!
//! Engram preserves assistant knowledge across sessions so that each new
//! session starts with accumulated expertise rather than from zero. It
//! stores typed knowledge items, patterns, and strategic insights with
//! both vector and full-text indexes, pre-warms a per-(project, situation)
//! cache of the most relevant items, and assembles bounded context
//! payloads for AI clients over a JSON-RPC tool surface.
//!
//! ## Features
//!
//! - Typed multi-modal store (SQLite + FTS5 + in-process ANN index)
//! - Hybrid semantic + lexical retrieval with weighted ranking
//! - Cache-augmented context assembly with a strict token budget
//! - Single-flight cache warming keyed by project and situation
//! - Redirection analyzer that classifies corrective user turns
//!
//! ## Example
//!
//! ```rust,ignore
//! use engram::{EngramConfig, ServiceContainer};
//!
//! let config = EngramConfig::load()?;
//! let services = ServiceContainer::open(&config)?;
//! let payload = services
//!     .assembler()
//!     .assemble(&session_id, "how do we deploy?", &AssembleOptions::default())
//!     .await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod analyzer;
pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod embedding;
pub mod mcp;
pub mod models;
pub mod retrieval;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::EngramConfig;
pub use embedding::Embedder;
pub use models::{
    HealthComponent, HealthStatus, KnowledgeId, KnowledgeItem, KnowledgeType, Pattern, PatternId,
    PatternType, SearchFilter, SearchHit, SemanticType, SessionId, StrategicInsight,
};
pub use services::ServiceContainer;
pub use storage::Store;

/// Error type for engram operations.
///
/// Variant names are stable and surfaced to tool clients as machine codes
/// (see [`Error::code`]).
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Validation` | Input violates the schema or a data-model invariant |
/// | `NotFound` | A referenced id is absent from the store |
/// | `Conflict` | A unique constraint is violated (e.g. duplicate relationship) |
/// | `DependencyUnavailable` | Storage or the embedding provider is offline |
/// | `Degraded` | A subsystem is running reduced and strict output was requested |
/// | `Timeout` | A per-call deadline was exceeded |
/// | `Cancelled` | The caller abandoned the request mid-flight |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Input violates the schema or an invariant.
    ///
    /// Raised when:
    /// - A range field is out of bounds (confidence outside `[0, 1]`,
    ///   importance outside `[0, 100]`)
    /// - An embedding does not match the configured dimension
    /// - A relationship links a pattern to itself
    /// - A tool request fails JSON schema validation
    ///
    /// Not retryable.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The entity kind (e.g. "session", "pattern").
        entity: &'static str,
        /// The missing identifier.
        id: String,
    },

    /// A unique constraint was violated.
    ///
    /// Raised when:
    /// - A `(source, target, type)` relationship already exists
    /// - A project name or session external id is already taken
    #[error("conflict: {0}")]
    Conflict(String),

    /// An external dependency is offline.
    ///
    /// Retryable; responses carry `retry_after_ms`.
    #[error("dependency unavailable: {dependency}: {cause}")]
    DependencyUnavailable {
        /// Which dependency failed ("storage" or "embedding_provider").
        dependency: &'static str,
        /// The underlying cause.
        cause: String,
    },

    /// A subsystem is degraded and the caller demanded full fidelity.
    ///
    /// Most degraded paths return results with a `degraded = true` flag
    /// instead of this error; the variant exists for callers that opt out
    /// of partial results.
    #[error("degraded: {0}")]
    Degraded(String),

    /// A per-call deadline was exceeded.
    #[error("operation '{operation}' timed out after {deadline_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that was exceeded.
        deadline_ms: u64,
    },

    /// The caller cancelled the request.
    #[error("operation '{operation}' cancelled")]
    Cancelled {
        /// The operation that was cancelled.
        operation: String,
    },

    /// An internal operation failed.
    ///
    /// Raised for unexpected storage, serialization, or I/O failures that
    /// do not map onto a more specific variant. Translated to
    /// `DependencyUnavailable` at component boundaries when the cause is
    /// an offline backend.
    #[error("operation '{operation}' failed: {cause}")]
    Internal {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns the stable machine code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::DependencyUnavailable { .. } => "DEPENDENCY_UNAVAILABLE",
            Self::Degraded(_) => "DEGRADED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Cancelled { .. } => "CANCELLED",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    /// Returns whether a client may retry the failed call.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DependencyUnavailable { .. } | Self::Timeout { .. }
        )
    }

    /// Suggested retry delay for retryable errors.
    #[must_use]
    pub const fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::DependencyUnavailable { .. } => Some(1_000),
            Self::Timeout { .. } => Some(5_000),
            _ => None,
        }
    }

    /// Builds an internal error from an operation name and a cause.
    pub fn internal(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Internal {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Builds a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Result type alias for engram operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Validation("importance out of range".to_string());
        assert_eq!(
            err.to_string(),
            "validation failed: importance out of range"
        );

        let err = Error::not_found("pattern", "abc");
        assert_eq!(err.to_string(), "pattern not found: abc");

        let err = Error::Timeout {
            operation: "assemble".to_string(),
            deadline_ms: 60_000,
        };
        assert_eq!(
            err.to_string(),
            "operation 'assemble' timed out after 60000ms"
        );
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(Error::Validation(String::new()).code(), "VALIDATION_ERROR");
        assert_eq!(Error::not_found("session", "x").code(), "NOT_FOUND");
        assert_eq!(Error::Conflict(String::new()).code(), "CONFLICT");
        assert_eq!(
            Error::DependencyUnavailable {
                dependency: "storage",
                cause: String::new(),
            }
            .code(),
            "DEPENDENCY_UNAVAILABLE"
        );
    }

    #[test]
    fn test_retryability() {
        let dep = Error::DependencyUnavailable {
            dependency: "embedding_provider",
            cause: "connection refused".to_string(),
        };
        assert!(dep.is_retryable());
        assert_eq!(dep.retry_after_ms(), Some(1_000));

        assert!(!Error::Validation(String::new()).is_retryable());
        assert_eq!(Error::Conflict(String::new()).retry_after_ms(), None);
    }
}
