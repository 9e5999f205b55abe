//! Schema migrations.
//!
//! Migrations append, never rewrite: each applied version leaves a
//! checksummed row in `schema_versions`, and re-applying a version is a
//! no-op as long as its checksum still matches the shipped script.

use super::schema;
use crate::{Error, Result};
use chrono::Utc;
use rusqlite::Connection;
use sha2::{Digest, Sha256};

/// One shipped migration.
pub struct Migration {
    /// Monotonic version number.
    pub version: u32,
    /// What the migration does.
    pub description: &'static str,
    /// Forward DDL.
    pub script: &'static str,
    /// Reverse DDL, kept for operator reference.
    pub rollback: &'static str,
}

/// All shipped migrations, ordered by version.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "core tables: projects, sessions, knowledge, patterns, insights, health",
        script: schema::MIGRATION_V1,
        rollback: "-- drop all core tables",
    },
    Migration {
        version: 2,
        description: "tool registry and session-scoped indexes",
        script: schema::MIGRATION_V2,
        rollback: "DROP TABLE IF EXISTS tool_registry;",
    },
];

/// The schema version a fresh store is created at.
pub const SCHEMA_VERSION: u32 = MIGRATIONS[MIGRATIONS.len() - 1].version;

fn checksum(script: &str) -> String {
    hex::encode(Sha256::digest(script.as_bytes()))
}

fn applied_checksum(conn: &Connection, version: u32) -> Result<Option<String>> {
    conn.query_row(
        "SELECT checksum FROM schema_versions WHERE version = ?1",
        [version],
        |row| row.get::<_, String>(0),
    )
    .map(Some)
    .or_else(|e| {
        if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            Ok(None)
        } else {
            Err(Error::internal("read_schema_version", e))
        }
    })
}

/// Applies all migrations up to and including `target`.
///
/// Idempotent: already-applied versions are verified against their
/// recorded checksum and skipped.
///
/// # Errors
///
/// Returns `Error::Validation` for an unknown target version or a
/// checksum mismatch, and `Error::Internal` on SQL failures.
pub fn migrate_to(conn: &mut Connection, target: u32) -> Result<()> {
    if !MIGRATIONS.iter().any(|m| m.version == target) {
        return Err(Error::Validation(format!(
            "unknown schema version: {target} (latest is {SCHEMA_VERSION})"
        )));
    }

    // The schema_versions table must exist before we can ask what is applied.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_versions (
            version           INTEGER PRIMARY KEY,
            description       TEXT NOT NULL,
            applied_at        TEXT NOT NULL,
            applied_by        TEXT NOT NULL,
            migration_script  TEXT NOT NULL,
            rollback_script   TEXT NOT NULL DEFAULT '',
            checksum          TEXT NOT NULL
        );",
    )
    .map_err(|e| Error::internal("init_schema_versions", e))?;

    for migration in MIGRATIONS.iter().filter(|m| m.version <= target) {
        let expected = checksum(migration.script);
        match applied_checksum(conn, migration.version)? {
            Some(found) if found == expected => continue,
            Some(found) => {
                return Err(Error::Validation(format!(
                    "schema version {} checksum mismatch: recorded {found}, shipped {expected}",
                    migration.version
                )));
            },
            None => {},
        }

        let tx = conn
            .transaction()
            .map_err(|e| Error::internal("begin_migration", e))?;
        tx.execute_batch(migration.script)
            .map_err(|e| Error::internal("apply_migration", e))?;
        tx.execute(
            "INSERT INTO schema_versions
                 (version, description, applied_at, applied_by,
                  migration_script, rollback_script, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                migration.version,
                migration.description,
                Utc::now().to_rfc3339(),
                format!("engram {}", env!("CARGO_PKG_VERSION")),
                migration.script,
                migration.rollback,
                expected,
            ],
        )
        .map_err(|e| Error::internal("record_migration", e))?;
        tx.commit()
            .map_err(|e| Error::internal("commit_migration", e))?;

        tracing::info!(version = migration.version, "applied schema migration");
    }

    Ok(())
}

/// Returns the highest applied schema version, if any.
///
/// # Errors
///
/// Returns `Error::Internal` on SQL failures.
pub fn current_version(conn: &Connection) -> Result<Option<u32>> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'schema_versions'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::internal("probe_schema_versions", e))?;
    if !exists {
        return Ok(None);
    }
    conn.query_row("SELECT MAX(version) FROM schema_versions", [], |row| {
        row.get::<_, Option<u32>>(0)
    })
    .map_err(|e| Error::internal("read_schema_versions", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrate_to_latest() {
        let mut conn = open();
        migrate_to(&mut conn, SCHEMA_VERSION).unwrap();
        assert_eq!(current_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let mut conn = open();
        migrate_to(&mut conn, SCHEMA_VERSION).unwrap();
        migrate_to(&mut conn, SCHEMA_VERSION).unwrap();

        let rows: u32 = conn
            .query_row("SELECT COUNT(*) FROM schema_versions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, u32::try_from(MIGRATIONS.len()).unwrap());
    }

    #[test]
    fn test_partial_then_full() {
        let mut conn = open();
        migrate_to(&mut conn, 1).unwrap();
        assert_eq!(current_version(&conn).unwrap(), Some(1));

        migrate_to(&mut conn, SCHEMA_VERSION).unwrap();
        assert_eq!(current_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut conn = open();
        assert!(migrate_to(&mut conn, 99).is_err());
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut conn = open();
        migrate_to(&mut conn, 1).unwrap();
        conn.execute("UPDATE schema_versions SET checksum = 'tampered'", [])
            .unwrap();
        assert!(migrate_to(&mut conn, 1).is_err());
    }
}
