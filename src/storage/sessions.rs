//! Project, session, health-log, and tool-registry storage.

use super::rows::{format_ts, parse_json_map, parse_ts, parse_uuid, to_json};
use super::{Error, Result, Store, severity};
use crate::models::{
    HealthComponent, HealthLog, HealthStatus, Project, ProjectId, ProjectType, Session, SessionId,
    ToolRegistryEntry,
};
use chrono::Utc;
use rusqlite::Row;
use std::str::FromStr;

const SESSION_COLUMNS: &str = "s.id, s.external_id, s.project_id, s.session_type, \
     s.user_context, s.started_at, s.ended_at, s.total_interactions, \
     s.successful_interactions, s.failed_interactions, s.avg_response_time_ms, \
     s.pattern_extraction_enabled, s.semantic_classification_enabled, \
     s.error_recovery_enabled, s.created_at, s.updated_at";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<(
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    u32,
    u32,
    u32,
    f64,
    bool,
    bool,
    bool,
    String,
    String,
)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
        row.get(14)?,
        row.get(15)?,
    ))
}

#[allow(clippy::type_complexity)]
fn into_session(
    raw: (
        String,
        String,
        String,
        String,
        String,
        String,
        Option<String>,
        u32,
        u32,
        u32,
        f64,
        bool,
        bool,
        bool,
        String,
        String,
    ),
) -> Result<Session> {
    let (
        id,
        external_id,
        project_id,
        session_type,
        user_context,
        started_at,
        ended_at,
        total,
        successful,
        failed,
        avg_rt,
        pattern_extraction,
        semantic_classification,
        error_recovery,
        created_at,
        updated_at,
    ) = raw;
    Ok(Session {
        id: SessionId::from_uuid(parse_uuid(&id)?),
        external_id,
        project_id: ProjectId::from_uuid(parse_uuid(&project_id)?),
        session_type,
        user_context: parse_json_map(&user_context)?,
        started_at: parse_ts(&started_at)?,
        ended_at: ended_at.as_deref().map(parse_ts).transpose()?,
        total_interactions: total,
        successful_interactions: successful,
        failed_interactions: failed,
        avg_response_time_ms: avg_rt,
        pattern_extraction_enabled: pattern_extraction,
        semantic_classification_enabled: semantic_classification,
        error_recovery_enabled: error_recovery,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

impl Store {
    /// Stores a project.
    ///
    /// # Errors
    ///
    /// `Conflict` when the name is taken, `Validation` on invariant
    /// violations.
    pub fn put_project(&self, project: &Project) -> Result<ProjectId> {
        project.validate()?;
        self.with_tx("put_project", |tx| {
            tx.execute(
                "INSERT INTO projects
                     (id, name, display_name, project_type, settings, active,
                      schema_version, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     display_name = excluded.display_name,
                     project_type = excluded.project_type,
                     settings = excluded.settings,
                     active = excluded.active,
                     schema_version = excluded.schema_version,
                     updated_at = excluded.updated_at",
                rusqlite::params![
                    project.id.to_string(),
                    project.name,
                    project.display_name,
                    project.project_type.as_str(),
                    to_json(&project.settings)?,
                    project.active,
                    project.schema_version,
                    format_ts(project.created_at),
                    format_ts(Utc::now()),
                ],
            )
            .map_err(|e| Self::write_err("put_project", &e))?;
            Ok(())
        })?;
        Ok(project.id)
    }

    /// Fetches a project by id.
    ///
    /// # Errors
    ///
    /// `NotFound` when absent.
    pub fn get_project(&self, id: ProjectId) -> Result<Project> {
        self.project_query(
            "SELECT id, name, display_name, project_type, settings, active,
                    schema_version, created_at, updated_at
             FROM projects WHERE id = ?1",
            &id.to_string(),
        )
    }

    /// Fetches a project by unique name.
    ///
    /// # Errors
    ///
    /// `NotFound` when absent.
    pub fn get_project_by_name(&self, name: &str) -> Result<Project> {
        self.project_query(
            "SELECT id, name, display_name, project_type, settings, active,
                    schema_version, created_at, updated_at
             FROM projects WHERE name = ?1",
            name,
        )
    }

    fn project_query(&self, sql: &str, param: &str) -> Result<Project> {
        self.with_conn(|conn| {
            let raw = conn
                .query_row(sql, [param], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, bool>(5)?,
                        row.get::<_, u32>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                })
                .map_err(|e| {
                    if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                        Error::not_found("project", param.to_string())
                    } else {
                        Error::internal("get_project", e)
                    }
                })?;
            let (id, name, display_name, ty, settings, active, schema_version, created, updated) =
                raw;
            Ok(Project {
                id: ProjectId::from_uuid(parse_uuid(&id)?),
                name,
                display_name,
                project_type: ProjectType::from_str(&ty)?,
                settings: parse_json_map(&settings)?,
                active,
                schema_version,
                created_at: parse_ts(&created)?,
                updated_at: parse_ts(&updated)?,
            })
        })
    }

    /// Stores a session.
    ///
    /// # Errors
    ///
    /// `Conflict` when `(project, external_id)` is taken, `Validation` on
    /// counter inconsistencies.
    pub fn put_session(&self, session: &Session) -> Result<SessionId> {
        session.validate()?;
        self.with_tx("put_session", |tx| {
            tx.execute(
                "INSERT INTO sessions
                     (id, external_id, project_id, session_type, user_context, started_at,
                      ended_at, total_interactions, successful_interactions,
                      failed_interactions, avg_response_time_ms, pattern_extraction_enabled,
                      semantic_classification_enabled, error_recovery_enabled,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                 ON CONFLICT(id) DO UPDATE SET
                     session_type = excluded.session_type,
                     user_context = excluded.user_context,
                     ended_at = excluded.ended_at,
                     total_interactions = excluded.total_interactions,
                     successful_interactions = excluded.successful_interactions,
                     failed_interactions = excluded.failed_interactions,
                     avg_response_time_ms = excluded.avg_response_time_ms,
                     updated_at = excluded.updated_at",
                rusqlite::params![
                    session.id.to_string(),
                    session.external_id,
                    session.project_id.to_string(),
                    session.session_type,
                    to_json(&session.user_context)?,
                    format_ts(session.started_at),
                    session.ended_at.map(format_ts),
                    session.total_interactions,
                    session.successful_interactions,
                    session.failed_interactions,
                    session.avg_response_time_ms,
                    session.pattern_extraction_enabled,
                    session.semantic_classification_enabled,
                    session.error_recovery_enabled,
                    format_ts(session.created_at),
                    format_ts(Utc::now()),
                ],
            )
            .map_err(|e| Self::write_err("put_session", &e))?;
            Ok(())
        })?;
        Ok(session.id)
    }

    /// Fetches a session by id.
    ///
    /// # Errors
    ///
    /// `NotFound` when absent.
    pub fn get_session(&self, id: SessionId) -> Result<Session> {
        self.with_conn(|conn| {
            let raw = conn
                .query_row(
                    &format!("SELECT {SESSION_COLUMNS} FROM sessions s WHERE s.id = ?1"),
                    [id.to_string()],
                    session_from_row,
                )
                .map_err(|e| {
                    if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                        Error::not_found("session", id.to_string())
                    } else {
                        Error::internal("get_session", e)
                    }
                })?;
            into_session(raw)
        })
    }

    /// Fetches a session by its client-supplied id within a project.
    ///
    /// # Errors
    ///
    /// `NotFound` when absent.
    pub fn get_session_by_external(
        &self,
        project: ProjectId,
        external_id: &str,
    ) -> Result<Session> {
        self.with_conn(|conn| {
            let raw = conn
                .query_row(
                    &format!(
                        "SELECT {SESSION_COLUMNS} FROM sessions s
                         WHERE s.project_id = ?1 AND s.external_id = ?2"
                    ),
                    rusqlite::params![project.to_string(), external_id],
                    session_from_row,
                )
                .map_err(|e| {
                    if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                        Error::not_found("session", external_id.to_string())
                    } else {
                        Error::internal("get_session_by_external", e)
                    }
                })?;
            into_session(raw)
        })
    }

    /// Marks a session ended and returns its final state.
    ///
    /// # Errors
    ///
    /// `NotFound` when absent.
    pub fn end_session(&self, id: SessionId) -> Result<Session> {
        let now = Utc::now();
        self.with_tx("end_session", |tx| {
            let changed = tx
                .execute(
                    "UPDATE sessions SET ended_at = ?1, updated_at = ?1 WHERE id = ?2",
                    rusqlite::params![format_ts(now), id.to_string()],
                )
                .map_err(|e| Error::internal("end_session", e))?;
            if changed == 0 {
                return Err(Error::not_found("session", id.to_string()));
            }
            Ok(())
        })?;
        self.get_session(id)
    }

    /// Atomically records one interaction outcome on a session.
    ///
    /// # Errors
    ///
    /// `NotFound` when absent.
    pub fn record_interaction(
        &self,
        id: SessionId,
        success: bool,
        response_time_ms: f64,
    ) -> Result<()> {
        self.with_tx("record_interaction", |tx| {
            let changed = tx
                .execute(
                    "UPDATE sessions SET
                         total_interactions = total_interactions + 1,
                         successful_interactions = successful_interactions + ?1,
                         failed_interactions = failed_interactions + ?2,
                         avg_response_time_ms = avg_response_time_ms
                             + (?3 - avg_response_time_ms) / (total_interactions + 1),
                         updated_at = ?4
                     WHERE id = ?5",
                    rusqlite::params![
                        u32::from(success),
                        u32::from(!success),
                        response_time_ms,
                        format_ts(Utc::now()),
                        id.to_string()
                    ],
                )
                .map_err(|e| Error::internal("record_interaction", e))?;
            if changed == 0 {
                return Err(Error::not_found("session", id.to_string()));
            }
            Ok(())
        })
    }

    /// Writes a health observation, honoring the configured log level.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on SQL failures.
    pub fn put_health(&self, log: &HealthLog) -> Result<()> {
        if severity(log.status) < self.min_health_severity() {
            return Ok(());
        }
        self.with_tx("put_health", |tx| {
            tx.execute(
                "INSERT INTO health_log
                     (id, component, status, metrics, error_details, recovery_actions, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    log.id.to_string(),
                    log.component.as_str(),
                    log.status.as_str(),
                    to_json(&log.metrics)?,
                    log.error_details,
                    to_json(&log.recovery_actions)?,
                    format_ts(log.created_at),
                ],
            )
            .map_err(|e| Error::internal("put_health", e))?;
            Ok(())
        })
    }

    /// Recent health observations for one component, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on SQL failures.
    pub fn recent_health(
        &self,
        component: HealthComponent,
        limit: usize,
    ) -> Result<Vec<HealthLog>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, component, status, metrics, error_details,
                            recovery_actions, created_at
                     FROM health_log
                     WHERE component = ?1
                     ORDER BY created_at DESC
                     LIMIT ?2",
                )
                .map_err(|e| Error::internal("recent_health", e))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![component.as_str(), limit.to_string()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, String>(6)?,
                        ))
                    },
                )
                .map_err(|e| Error::internal("recent_health", e))?;

            let mut logs = Vec::new();
            for row in rows {
                let (id, comp, status, metrics, error_details, recovery, created) =
                    row.map_err(|e| Error::internal("recent_health", e))?;
                logs.push(HealthLog {
                    id: parse_uuid(&id)?,
                    component: HealthComponent::from_str(&comp)?,
                    status: HealthStatus::from_str(&status)?,
                    metrics: parse_json_map(&metrics)?,
                    error_details,
                    recovery_actions: super::rows::parse_json(&recovery)?,
                    created_at: parse_ts(&created)?,
                });
            }
            Ok(logs)
        })
    }

    /// Registers or refreshes an external tool entry.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on SQL failures.
    pub fn put_tool_entry(&self, entry: &ToolRegistryEntry) -> Result<()> {
        self.with_tx("put_tool_entry", |tx| {
            tx.execute(
                "INSERT OR REPLACE INTO tool_registry
                     (name, description, input_schema, health_status,
                      avg_response_time_ms, success_rate, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    entry.name,
                    entry.description,
                    to_json(&entry.input_schema)?,
                    entry.health_status.as_str(),
                    entry.avg_response_time_ms,
                    entry.success_rate,
                    format_ts(Utc::now()),
                ],
            )
            .map_err(|e| Error::internal("put_tool_entry", e))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::small_store;

    fn seeded_project(store: &Store) -> Project {
        let project = Project::new("api-service", ProjectType::Software);
        store.put_project(&project).unwrap();
        project
    }

    #[test]
    fn test_project_roundtrip() {
        let store = small_store();
        let project = seeded_project(&store);

        let by_id = store.get_project(project.id).unwrap();
        assert_eq!(by_id.name, "api-service");
        let by_name = store.get_project_by_name("api-service").unwrap();
        assert_eq!(by_name.id, project.id);

        assert_eq!(
            store.get_project_by_name("missing").unwrap_err().code(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn test_duplicate_project_name_conflicts() {
        let store = small_store();
        seeded_project(&store);
        let dup = Project::new("api-service", ProjectType::Software);
        assert_eq!(store.put_project(&dup).unwrap_err().code(), "CONFLICT");
    }

    #[test]
    fn test_session_lifecycle() {
        let store = small_store();
        let project = seeded_project(&store);
        let session = Session::new("ext-42", project.id);
        store.put_session(&session).unwrap();

        store.record_interaction(session.id, true, 120.0).unwrap();
        store.record_interaction(session.id, false, 80.0).unwrap();

        let fetched = store.get_session(session.id).unwrap();
        assert_eq!(fetched.total_interactions, 2);
        assert_eq!(fetched.successful_interactions, 1);
        assert_eq!(fetched.failed_interactions, 1);
        assert!((fetched.avg_response_time_ms - 100.0).abs() < 1e-9);
        assert!(fetched.is_open());

        let ended = store.end_session(session.id).unwrap();
        assert!(!ended.is_open());
    }

    #[test]
    fn test_session_external_lookup() {
        let store = small_store();
        let project = seeded_project(&store);
        let session = Session::new("ext-42", project.id);
        store.put_session(&session).unwrap();

        let found = store.get_session_by_external(project.id, "ext-42").unwrap();
        assert_eq!(found.id, session.id);

        let dup = Session::new("ext-42", project.id);
        assert_eq!(store.put_session(&dup).unwrap_err().code(), "CONFLICT");
    }

    #[test]
    fn test_unknown_session_not_found() {
        let store = small_store();
        assert_eq!(
            store.end_session(SessionId::new()).unwrap_err().code(),
            "NOT_FOUND"
        );
        assert_eq!(
            store
                .record_interaction(SessionId::new(), true, 1.0)
                .unwrap_err()
                .code(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn test_health_log_roundtrip() {
        let store = small_store();
        let log = HealthLog::new(HealthComponent::SemanticClassifier, HealthStatus::Degraded)
            .with_error("analyzer failed");
        store.put_health(&log).unwrap();

        let logs = store
            .recent_health(HealthComponent::SemanticClassifier, 5)
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, HealthStatus::Degraded);
        assert_eq!(logs[0].error_details.as_deref(), Some("analyzer failed"));
    }

    #[test]
    fn test_tool_registry_upsert() {
        let store = small_store();
        let entry = ToolRegistryEntry::new(
            "store_knowledge",
            "Persist a knowledge item",
            serde_json::json!({"type": "object"}),
        );
        store.put_tool_entry(&entry).unwrap();
        store.put_tool_entry(&entry).unwrap();
    }
}
