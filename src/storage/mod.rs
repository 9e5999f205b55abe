//! Persistent storage.
//!
//! A single SQLite database (bundled, WAL mode) holds every entity;
//! FTS5 virtual tables carry the lexical indexes and are maintained in
//! the same transaction as each write. An in-process IVF index serves
//! cosine-similarity search and is rebuilt from the database on startup
//! and on `reindex`.

mod knowledge;
mod migrations;
mod patterns;
mod rows;
mod schema;
mod sessions;
mod sql;
mod vector;

pub use migrations::{MIGRATIONS, SCHEMA_VERSION, current_version};
pub use patterns::PatternFilter;
pub use vector::IvfIndex;

use crate::config::EngramConfig;
use crate::models::{
    HealthComponent, HealthLog, HealthStatus, KnowledgeType, SemanticType,
};
use crate::{Error, Result};
use parking_lot::{Mutex, RwLock};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// The typed persistent store.
///
/// All writes are transactional; readers share one connection behind a
/// mutex. The vector index is process-local state owned by the store and
/// is replaced wholesale by [`Store::rebuild_indexes`].
pub struct Store {
    conn: Mutex<Connection>,
    dimensions: usize,
    ann_probes: usize,
    consistency: HashMap<KnowledgeType, SemanticType>,
    health_log_level: HealthStatus,
    knowledge_index: RwLock<IvfIndex>,
    pattern_index: RwLock<IvfIndex>,
    vector_ok: AtomicBool,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Number of projects.
    pub projects: u64,
    /// Number of sessions.
    pub sessions: u64,
    /// Number of knowledge items (active and inactive).
    pub knowledge_items: u64,
    /// Number of patterns.
    pub patterns: u64,
    /// Number of pattern relationships.
    pub relationships: u64,
    /// Number of validation records.
    pub validations: u64,
    /// Number of strategic insights.
    pub insights: u64,
    /// Pattern count per `pattern_type`.
    pub pattern_type_counts: HashMap<String, u64>,
    /// Mean pattern confidence.
    pub avg_confidence: f64,
    /// Mean pattern success rate.
    pub avg_success_rate: f64,
}

impl Store {
    /// Opens (and migrates) the store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns `DependencyUnavailable` when the database cannot be
    /// opened, and migration errors verbatim.
    pub fn open(config: &EngramConfig) -> Result<Self> {
        if let Some(parent) = config.database_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::DependencyUnavailable {
                dependency: "storage",
                cause: format!("create {}: {e}", parent.display()),
            })?;
        }
        let conn = Connection::open(&config.database_path).map_err(|e| {
            Error::DependencyUnavailable {
                dependency: "storage",
                cause: e.to_string(),
            }
        })?;
        Self::from_connection(conn, config)
    }

    /// Opens an in-memory store (tests and ephemeral runs).
    ///
    /// # Errors
    ///
    /// Returns migration errors verbatim.
    pub fn open_in_memory(config: &EngramConfig) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::DependencyUnavailable {
            dependency: "storage",
            cause: e.to_string(),
        })?;
        Self::from_connection(conn, config)
    }

    fn from_connection(mut conn: Connection, config: &EngramConfig) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| Error::internal("set_pragmas", e))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| Error::internal("set_pragmas", e))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| Error::internal("set_pragmas", e))?;

        migrations::migrate_to(&mut conn, SCHEMA_VERSION)?;

        let store = Self {
            conn: Mutex::new(conn),
            dimensions: config.embedding_dimension,
            ann_probes: config.ann_probes,
            consistency: config.consistency.clone(),
            health_log_level: config.health_log_level,
            knowledge_index: RwLock::new(IvfIndex::new(config.embedding_dimension)),
            pattern_index: RwLock::new(IvfIndex::new(config.embedding_dimension)),
            vector_ok: AtomicBool::new(true),
        };
        store.rebuild_indexes()?;
        Ok(store)
    }

    /// The embedding dimension this store validates against.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Whether vector search is currently available.
    #[must_use]
    pub fn vector_search_available(&self) -> bool {
        self.vector_ok.load(Ordering::Acquire)
    }

    /// Applies migrations up to `target`. Idempotent.
    ///
    /// # Errors
    ///
    /// See [`migrations::migrate_to`].
    pub fn migrate_to(&self, target: u32) -> Result<()> {
        let mut conn = self.conn.lock();
        migrations::migrate_to(&mut conn, target)
    }

    /// Rebuilds the vector indexes from stored embeddings.
    ///
    /// On corrupt embedding rows the store stays usable but marks vector
    /// search unavailable and publishes a degraded health observation;
    /// retrieval then falls back to the lexical path.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` only when the rows themselves cannot be
    /// read; decode failures degrade instead of failing.
    pub fn rebuild_indexes(&self) -> Result<()> {
        let result = self.try_rebuild_indexes();
        match result {
            Ok(()) => {
                self.vector_ok.store(true, Ordering::Release);
                Ok(())
            },
            Err(Error::Validation(cause) | Error::Internal { cause, .. }) => {
                self.vector_ok.store(false, Ordering::Release);
                tracing::error!(%cause, "vector index rebuild failed; falling back to lexical");
                let log = HealthLog::new(HealthComponent::Database, HealthStatus::Degraded)
                    .with_error(format!("vector index rebuild failed: {cause}"));
                self.put_health(&log)?;
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    fn try_rebuild_indexes(&self) -> Result<()> {
        let knowledge = self.load_embeddings("knowledge_items")?;
        let patterns = self.load_embeddings("patterns")?;

        self.knowledge_index.write().rebuild(knowledge)?;
        self.pattern_index.write().rebuild(patterns)?;
        tracing::debug!(
            knowledge = self.knowledge_index.read().len(),
            patterns = self.pattern_index.read().len(),
            "vector indexes rebuilt"
        );
        Ok(())
    }

    fn load_embeddings(&self, table: &str) -> Result<Vec<(uuid::Uuid, Vec<f32>)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, embedding FROM {table} WHERE embedding IS NOT NULL"
            ))
            .map_err(|e| Error::internal("load_embeddings", e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(|e| Error::internal("load_embeddings", e))?;

        let mut out = Vec::new();
        for row in rows {
            let (id, blob) = row.map_err(|e| Error::internal("load_embeddings", e))?;
            let vector = rows::blob_to_embedding(&blob)?;
            if vector.iter().any(|v| *v != 0.0) {
                out.push((rows::parse_uuid(&id)?, vector));
            }
        }
        Ok(out)
    }

    /// Runs a read-only closure against the connection.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Runs a closure inside a transaction; commits on `Ok`.
    pub(crate) fn with_tx<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::internal(op, e))?;
        let value = f(&tx)?;
        tx.commit().map_err(|e| Error::internal(op, e))?;
        Ok(value)
    }

    /// Translates a rusqlite error on a write path.
    pub(crate) fn write_err(op: &'static str, e: &rusqlite::Error) -> Error {
        if let rusqlite::Error::SqliteFailure(code, _) = e
            && code.code == rusqlite::ErrorCode::ConstraintViolation
        {
            return Error::Conflict(format!("{op}: {e}"));
        }
        Error::internal(op, e)
    }

    pub(crate) fn knowledge_index(&self) -> &RwLock<IvfIndex> {
        &self.knowledge_index
    }

    pub(crate) fn pattern_index(&self) -> &RwLock<IvfIndex> {
        &self.pattern_index
    }

    pub(crate) const fn ann_probes(&self) -> usize {
        self.ann_probes
    }

    pub(crate) const fn consistency_table(&self) -> &HashMap<KnowledgeType, SemanticType> {
        &self.consistency
    }

    pub(crate) const fn min_health_severity(&self) -> u8 {
        severity(self.health_log_level)
    }

    /// Collects aggregate statistics, optionally scoped to one project.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on SQL failures.
    pub fn stats(&self, project: Option<crate::models::ProjectId>) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let scope = project.map(|p| p.to_string());
            let count = |table: &str, column: Option<&str>| -> Result<u64> {
                let (sql, has_param) = column.map_or_else(
                    || (format!("SELECT COUNT(*) FROM {table}"), false),
                    |col| {
                        if scope.is_some() {
                            (format!("SELECT COUNT(*) FROM {table} WHERE {col} = ?1"), true)
                        } else {
                            (format!("SELECT COUNT(*) FROM {table}"), false)
                        }
                    },
                );
                let result = if has_param {
                    conn.query_row(&sql, [scope.as_deref()], |r| r.get::<_, i64>(0))
                } else {
                    conn.query_row(&sql, [], |r| r.get::<_, i64>(0))
                };
                result.map(|n| n as u64).map_err(|e| Error::internal("stats", e))
            };

            let mut pattern_type_counts = HashMap::new();
            {
                let mut stmt = conn
                    .prepare("SELECT pattern_type, COUNT(*) FROM patterns GROUP BY pattern_type")
                    .map_err(|e| Error::internal("stats", e))?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                    })
                    .map_err(|e| Error::internal("stats", e))?;
                for row in rows {
                    let (ty, n) = row.map_err(|e| Error::internal("stats", e))?;
                    pattern_type_counts.insert(ty, n as u64);
                }
            }

            let (avg_confidence, avg_success_rate) = conn
                .query_row(
                    "SELECT COALESCE(AVG(confidence), 0), COALESCE(AVG(success_rate), 0)
                     FROM patterns",
                    [],
                    |row| Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?)),
                )
                .map_err(|e| Error::internal("stats", e))?;

            Ok(StoreStats {
                projects: count("projects", None)?,
                sessions: count("sessions", Some("project_id"))?,
                knowledge_items: count("knowledge_items", Some("project_id"))?,
                patterns: count("patterns", Some("project_id"))?,
                relationships: count("pattern_relationships", None)?,
                validations: count("pattern_validations", Some("project_id"))?,
                insights: count("strategic_insights", None)?,
                pattern_type_counts,
                avg_confidence,
                avg_success_rate,
            })
        })
    }
}

/// Severity rank used for health-log level filtering.
pub(crate) const fn severity(status: HealthStatus) -> u8 {
    match status {
        HealthStatus::Healthy => 0,
        HealthStatus::Recovering => 1,
        HealthStatus::Degraded => 2,
        HealthStatus::Critical => 3,
        HealthStatus::Offline => 4,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Store;
    use crate::config::EngramConfig;

    /// Opens an in-memory store with a small embedding dimension.
    pub fn small_store() -> Store {
        let config = EngramConfig {
            embedding_dimension: 32,
            ..EngramConfig::default()
        };
        Store::open_in_memory(&config).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_migrates() {
        let store = test_support::small_store();
        assert!(store.vector_search_available());
        let stats = store.stats(None).unwrap();
        assert_eq!(stats.knowledge_items, 0);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(severity(HealthStatus::Healthy) < severity(HealthStatus::Degraded));
        assert!(severity(HealthStatus::Degraded) < severity(HealthStatus::Critical));
        assert!(severity(HealthStatus::Critical) < severity(HealthStatus::Offline));
    }
}
