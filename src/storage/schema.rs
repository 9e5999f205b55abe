//! SQLite schema DDL.
//!
//! The schema evolves through [`super::migrations`]; statements here are
//! the bodies of those migrations and never run outside one.

/// Migration 1: core tables and indexes.
pub const MIGRATION_V1: &str = r"
CREATE TABLE IF NOT EXISTS projects (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL UNIQUE,
    display_name    TEXT NOT NULL,
    project_type    TEXT NOT NULL,
    settings        TEXT NOT NULL DEFAULT '{}',
    active          INTEGER NOT NULL DEFAULT 1,
    schema_version  INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id                              TEXT PRIMARY KEY,
    external_id                     TEXT NOT NULL,
    project_id                      TEXT NOT NULL REFERENCES projects(id),
    session_type                    TEXT NOT NULL DEFAULT 'interactive',
    user_context                    TEXT NOT NULL DEFAULT '{}',
    started_at                      TEXT NOT NULL,
    ended_at                        TEXT,
    total_interactions              INTEGER NOT NULL DEFAULT 0,
    successful_interactions         INTEGER NOT NULL DEFAULT 0,
    failed_interactions             INTEGER NOT NULL DEFAULT 0,
    avg_response_time_ms            REAL NOT NULL DEFAULT 0,
    pattern_extraction_enabled      INTEGER NOT NULL DEFAULT 1,
    semantic_classification_enabled INTEGER NOT NULL DEFAULT 1,
    error_recovery_enabled          INTEGER NOT NULL DEFAULT 1,
    created_at                      TEXT NOT NULL,
    updated_at                      TEXT NOT NULL,
    UNIQUE (project_id, external_id)
);

CREATE TABLE IF NOT EXISTS knowledge_items (
    id                    TEXT PRIMARY KEY,
    knowledge_type        TEXT NOT NULL,
    semantic_type         TEXT,
    semantic_confidence   REAL,
    classification_method TEXT,
    title                 TEXT NOT NULL,
    content               TEXT NOT NULL,
    category              TEXT NOT NULL DEFAULT '',
    context_data          TEXT NOT NULL DEFAULT '{}',
    project_id            TEXT REFERENCES projects(id),
    session_id            TEXT REFERENCES sessions(id),
    importance            REAL NOT NULL DEFAULT 50,
    quality               REAL NOT NULL DEFAULT 50,
    usage_count           INTEGER NOT NULL DEFAULT 0,
    validation_count      INTEGER NOT NULL DEFAULT 0,
    contradiction_count   INTEGER NOT NULL DEFAULT 0,
    embedding             BLOB,
    embedding_version     TEXT,
    retrieval_triggers    TEXT NOT NULL DEFAULT '[]',
    cross_project         INTEGER NOT NULL DEFAULT 0,
    source_projects       TEXT NOT NULL DEFAULT '[]',
    version               INTEGER NOT NULL DEFAULT 1,
    superseded_by         TEXT,
    supersedes            TEXT NOT NULL DEFAULT '[]',
    is_active             INTEGER NOT NULL DEFAULT 1,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_knowledge_project ON knowledge_items(project_id);
CREATE INDEX IF NOT EXISTS idx_knowledge_semantic ON knowledge_items(semantic_type);
CREATE INDEX IF NOT EXISTS idx_knowledge_active ON knowledge_items(is_active);
CREATE INDEX IF NOT EXISTS idx_knowledge_updated ON knowledge_items(updated_at);

CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_fts USING fts5(
    item_id UNINDEXED,
    title,
    content,
    tokenize = 'porter unicode61'
);

CREATE TABLE IF NOT EXISTS patterns (
    id                 TEXT PRIMARY KEY,
    pattern_type       TEXT NOT NULL,
    title              TEXT NOT NULL,
    content            TEXT NOT NULL,
    category           TEXT NOT NULL DEFAULT '',
    project_id         TEXT REFERENCES projects(id),
    session_id         TEXT REFERENCES sessions(id),
    confidence         REAL NOT NULL DEFAULT 0.5,
    success_rate       REAL NOT NULL DEFAULT 0,
    pattern_strength   REAL NOT NULL DEFAULT 0.5,
    validation_status  TEXT NOT NULL DEFAULT 'pending',
    embedding          BLOB,
    embedding_version  TEXT,
    related_patterns   TEXT NOT NULL DEFAULT '[]',
    is_active          INTEGER NOT NULL DEFAULT 1,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patterns_project ON patterns(project_id);
CREATE INDEX IF NOT EXISTS idx_patterns_status ON patterns(validation_status);
CREATE INDEX IF NOT EXISTS idx_patterns_updated ON patterns(updated_at);

CREATE VIRTUAL TABLE IF NOT EXISTS patterns_fts USING fts5(
    pattern_id UNINDEXED,
    title,
    content,
    tokenize = 'porter unicode61'
);

CREATE TABLE IF NOT EXISTS pattern_relationships (
    id                   TEXT PRIMARY KEY,
    source_pattern_id    TEXT NOT NULL REFERENCES patterns(id),
    target_pattern_id    TEXT NOT NULL REFERENCES patterns(id),
    relationship_type    TEXT NOT NULL,
    strength             REAL NOT NULL DEFAULT 0.5,
    confidence           REAL NOT NULL DEFAULT 0.5,
    evidence             TEXT NOT NULL DEFAULT '{}',
    validation_count     INTEGER NOT NULL DEFAULT 0,
    contradiction_count  INTEGER NOT NULL DEFAULT 0,
    extraction_metadata  TEXT NOT NULL DEFAULT '{}',
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL,
    UNIQUE (source_pattern_id, target_pattern_id, relationship_type),
    CHECK (source_pattern_id <> target_pattern_id)
);

CREATE TABLE IF NOT EXISTS strategic_insights (
    id                        TEXT PRIMARY KEY,
    insight_type              TEXT NOT NULL,
    title                     TEXT NOT NULL,
    content                   TEXT NOT NULL DEFAULT '{}',
    applicable_project_types  TEXT NOT NULL DEFAULT '[]',
    confidence                REAL NOT NULL DEFAULT 0.5,
    effectiveness             REAL NOT NULL DEFAULT 0,
    semantic_type             TEXT,
    embedding                 BLOB,
    embedding_version         TEXT,
    validation_status         TEXT NOT NULL DEFAULT 'pending',
    created_at                TEXT NOT NULL,
    updated_at                TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS insights_fts USING fts5(
    insight_id UNINDEXED,
    title,
    content,
    tokenize = 'porter unicode61'
);

CREATE TABLE IF NOT EXISTS pattern_validations (
    id               TEXT PRIMARY KEY,
    pattern_id       TEXT NOT NULL REFERENCES patterns(id),
    validation_type  TEXT NOT NULL,
    result           INTEGER NOT NULL,
    evidence         TEXT NOT NULL DEFAULT '{}',
    validated_by     TEXT NOT NULL,
    confidence       REAL NOT NULL DEFAULT 0.5,
    session_id       TEXT,
    project_id       TEXT,
    created_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_validations_pattern
    ON pattern_validations(pattern_id, created_at);

CREATE TABLE IF NOT EXISTS pattern_usage (
    id             TEXT PRIMARY KEY,
    pattern_id     TEXT NOT NULL REFERENCES patterns(id),
    session_id     TEXT,
    usage_context  TEXT NOT NULL DEFAULT '',
    usage_outcome  TEXT,
    usage_type     TEXT NOT NULL,
    effectiveness  REAL,
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_usage_pattern ON pattern_usage(pattern_id, created_at);

CREATE TABLE IF NOT EXISTS health_log (
    id                TEXT PRIMARY KEY,
    component         TEXT NOT NULL,
    status            TEXT NOT NULL,
    metrics           TEXT NOT NULL DEFAULT '{}',
    error_details     TEXT,
    recovery_actions  TEXT NOT NULL DEFAULT '[]',
    created_at        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_versions (
    version           INTEGER PRIMARY KEY,
    description       TEXT NOT NULL,
    applied_at        TEXT NOT NULL,
    applied_by        TEXT NOT NULL,
    migration_script  TEXT NOT NULL,
    rollback_script   TEXT NOT NULL DEFAULT '',
    checksum          TEXT NOT NULL
);
";

/// Migration 2: external tool registry and a session-items index.
pub const MIGRATION_V2: &str = r"
CREATE TABLE IF NOT EXISTS tool_registry (
    name                  TEXT PRIMARY KEY,
    description           TEXT NOT NULL,
    input_schema          TEXT NOT NULL DEFAULT '{}',
    health_status         TEXT NOT NULL DEFAULT 'healthy',
    avg_response_time_ms  REAL NOT NULL DEFAULT 0,
    success_rate          REAL NOT NULL DEFAULT 1,
    updated_at            TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_knowledge_session ON knowledge_items(session_id);
CREATE INDEX IF NOT EXISTS idx_usage_session ON pattern_usage(session_id, created_at);
";
