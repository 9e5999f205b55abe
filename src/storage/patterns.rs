//! Pattern, relationship, validation, usage, and insight storage.

use super::rows::{
    blob_to_embedding, embedding_to_blob, format_ts, parse_json, parse_json_map, parse_ts,
    parse_uuid, to_json,
};
use super::{Error, Result, Store};
use crate::models::{
    InsightId, InsightType, Pattern, PatternContent, PatternId, PatternRelationship,
    PatternUsage, PatternValidation, PatternType, ProjectId, ProjectType, RelationshipType,
    SemanticType, SessionId, StrategicInsight, UsageOutcome, UsageType, ValidatedBy,
    ValidationStatus, ValidationType,
};
use chrono::Utc;
use rusqlite::Row;
use std::str::FromStr;
use uuid::Uuid;

const PATTERN_COLUMNS: &str = "p.id, p.pattern_type, p.title, p.content, p.category, \
     p.project_id, p.session_id, p.confidence, p.success_rate, p.pattern_strength, \
     p.validation_status, p.embedding, p.embedding_version, p.related_patterns, p.is_active, \
     p.created_at, p.updated_at";

struct PatternRow {
    id: String,
    pattern_type: String,
    title: String,
    content: String,
    category: String,
    project_id: Option<String>,
    session_id: Option<String>,
    confidence: f64,
    success_rate: f64,
    pattern_strength: f64,
    validation_status: String,
    embedding: Option<Vec<u8>>,
    embedding_version: Option<String>,
    related_patterns: String,
    is_active: bool,
    created_at: String,
    updated_at: String,
}

impl PatternRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            pattern_type: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            category: row.get(4)?,
            project_id: row.get(5)?,
            session_id: row.get(6)?,
            confidence: row.get(7)?,
            success_rate: row.get(8)?,
            pattern_strength: row.get(9)?,
            validation_status: row.get(10)?,
            embedding: row.get(11)?,
            embedding_version: row.get(12)?,
            related_patterns: row.get(13)?,
            is_active: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    fn into_pattern(self) -> Result<Pattern> {
        Ok(Pattern {
            id: PatternId::from_uuid(parse_uuid(&self.id)?),
            pattern_type: PatternType::from_str(&self.pattern_type)?,
            title: self.title,
            content: parse_json::<PatternContent>(&self.content)?,
            category: self.category,
            project_id: self
                .project_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(Into::into),
            session_id: self
                .session_id
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(Into::into),
            confidence: self.confidence,
            success_rate: self.success_rate,
            pattern_strength: self.pattern_strength,
            validation_status: ValidationStatus::from_str(&self.validation_status)?,
            embedding: self
                .embedding
                .as_deref()
                .map(blob_to_embedding)
                .transpose()?,
            embedding_version: self.embedding_version,
            related_patterns: parse_json(&self.related_patterns)?,
            is_active: self.is_active,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

/// Filter for pattern listing.
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    /// Restrict to one project.
    pub project: Option<ProjectId>,
    /// Restrict to one lifecycle state.
    pub validation_status: Option<ValidationStatus>,
    /// Restrict to one pattern type.
    pub pattern_type: Option<PatternType>,
}

impl Store {
    /// Stores a pattern with its FTS row in one transaction.
    ///
    /// # Errors
    ///
    /// `Validation` on invariant violations.
    pub fn put_pattern(&self, pattern: &Pattern) -> Result<PatternId> {
        pattern.validate(self.dimensions())?;

        let mut stored = pattern.clone();
        stored.updated_at = Utc::now();

        self.with_tx("put_pattern", |tx| {
            tx.execute(
                "INSERT OR REPLACE INTO patterns
                     (id, pattern_type, title, content, category, project_id, session_id,
                      confidence, success_rate, pattern_strength, validation_status,
                      embedding, embedding_version, related_patterns, is_active,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17)",
                rusqlite::params![
                    stored.id.to_string(),
                    stored.pattern_type.as_str(),
                    stored.title,
                    to_json(&stored.content)?,
                    stored.category,
                    stored.project_id.map(|p| p.to_string()),
                    stored.session_id.map(|s| s.to_string()),
                    stored.confidence,
                    stored.success_rate,
                    stored.pattern_strength,
                    stored.validation_status.as_str(),
                    stored.embedding.as_deref().map(embedding_to_blob),
                    stored.embedding_version,
                    to_json(&stored.related_patterns)?,
                    stored.is_active,
                    format_ts(stored.created_at),
                    format_ts(stored.updated_at),
                ],
            )
            .map_err(|e| Self::write_err("put_pattern", &e))?;

            tx.execute(
                "DELETE FROM patterns_fts WHERE pattern_id = ?1",
                [stored.id.to_string()],
            )
            .map_err(|e| Error::internal("put_pattern", e))?;
            tx.execute(
                "INSERT INTO patterns_fts (pattern_id, title, content) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    stored.id.to_string(),
                    stored.title,
                    stored.content.lexical_text()
                ],
            )
            .map_err(|e| Error::internal("put_pattern", e))?;
            Ok(())
        })?;

        if let Some(embedding) = &stored.embedding {
            if embedding.iter().any(|v| *v != 0.0) {
                self.pattern_index()
                    .write()
                    .upsert(*stored.id.as_uuid(), embedding.clone())?;
            }
        }
        Ok(stored.id)
    }

    /// Fetches one pattern.
    ///
    /// # Errors
    ///
    /// `NotFound` when the id is absent.
    pub fn get_pattern(&self, id: PatternId) -> Result<Pattern> {
        self.with_conn(|conn| {
            let raw = conn
                .query_row(
                    &format!("SELECT {PATTERN_COLUMNS} FROM patterns p WHERE p.id = ?1"),
                    [id.to_string()],
                    PatternRow::from_row,
                )
                .map_err(|e| {
                    if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                        Error::not_found("pattern", id.to_string())
                    } else {
                        Error::internal("get_pattern", e)
                    }
                })?;
            raw.into_pattern()
        })
    }

    /// Lists patterns, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on SQL failures.
    pub fn list_patterns(&self, filter: &PatternFilter, limit: usize) -> Result<Vec<Pattern>> {
        self.with_conn(|conn| {
            let mut conditions = vec!["p.is_active = 1".to_string()];
            let mut params: Vec<String> = Vec::new();
            let mut idx = 1;
            if let Some(project) = filter.project {
                conditions.push(format!("p.project_id = ?{idx}"));
                params.push(project.to_string());
                idx += 1;
            }
            if let Some(status) = filter.validation_status {
                conditions.push(format!("p.validation_status = ?{idx}"));
                params.push(status.as_str().to_string());
                idx += 1;
            }
            if let Some(ty) = filter.pattern_type {
                conditions.push(format!("p.pattern_type = ?{idx}"));
                params.push(ty.as_str().to_string());
                idx += 1;
            }
            params.push(limit.to_string());

            let sql = format!(
                "SELECT {PATTERN_COLUMNS} FROM patterns p
                 WHERE {}
                 ORDER BY p.updated_at DESC, p.id ASC
                 LIMIT ?{idx}",
                conditions.join(" AND ")
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| Error::internal("list_patterns", e))?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), PatternRow::from_row)
                .map_err(|e| Error::internal("list_patterns", e))?;

            let mut patterns = Vec::new();
            for row in rows {
                patterns.push(row.map_err(|e| Error::internal("list_patterns", e))?.into_pattern()?);
            }
            Ok(patterns)
        })
    }

    /// Finds patterns whose embeddings are nearest to the given vector.
    ///
    /// Used to populate the denormalized adjacency list when a new
    /// pattern is persisted.
    ///
    /// # Errors
    ///
    /// `Validation` on dimension mismatch.
    pub fn similar_patterns(&self, embedding: &[f32], k: usize) -> Result<Vec<(PatternId, f32)>> {
        if !self.vector_search_available() {
            return Ok(Vec::new());
        }
        let hits = self
            .pattern_index()
            .read()
            .search(embedding, k, self.ann_probes())?;
        Ok(hits
            .into_iter()
            .map(|(id, score)| (PatternId::from_uuid(id), score))
            .collect())
    }

    /// Stores a directed relationship between two patterns.
    ///
    /// # Errors
    ///
    /// `Validation` on a self-loop, `NotFound` when either endpoint is
    /// absent, `Conflict` when the `(source, target, type)` edge already
    /// exists.
    pub fn put_relationship(&self, rel: &PatternRelationship) -> Result<Uuid> {
        rel.validate()?;
        // Both endpoints must exist; surfaces NotFound rather than a
        // foreign-key Conflict.
        self.get_pattern(rel.source_pattern_id)?;
        self.get_pattern(rel.target_pattern_id)?;

        self.with_tx("put_relationship", |tx| {
            tx.execute(
                "INSERT INTO pattern_relationships
                     (id, source_pattern_id, target_pattern_id, relationship_type,
                      strength, confidence, evidence, validation_count,
                      contradiction_count, extraction_metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    rel.id.to_string(),
                    rel.source_pattern_id.to_string(),
                    rel.target_pattern_id.to_string(),
                    rel.relationship_type.as_str(),
                    rel.strength,
                    rel.confidence,
                    to_json(&rel.evidence)?,
                    rel.validation_count,
                    rel.contradiction_count,
                    to_json(&rel.extraction_metadata)?,
                    format_ts(rel.created_at),
                    format_ts(Utc::now()),
                ],
            )
            .map_err(|e| Self::write_err("put_relationship", &e))?;
            Ok(())
        })?;
        Ok(rel.id)
    }

    /// Lists the outgoing relationships of a pattern.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on SQL failures.
    pub fn relationships_from(&self, source: PatternId) -> Result<Vec<PatternRelationship>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, source_pattern_id, target_pattern_id, relationship_type,
                            strength, confidence, evidence, validation_count,
                            contradiction_count, extraction_metadata, created_at, updated_at
                     FROM pattern_relationships
                     WHERE source_pattern_id = ?1
                     ORDER BY created_at ASC",
                )
                .map_err(|e| Error::internal("relationships_from", e))?;
            let rows = stmt
                .query_map([source.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, u32>(7)?,
                        row.get::<_, u32>(8)?,
                        row.get::<_, String>(9)?,
                        row.get::<_, String>(10)?,
                        row.get::<_, String>(11)?,
                    ))
                })
                .map_err(|e| Error::internal("relationships_from", e))?;

            let mut edges = Vec::new();
            for row in rows {
                let (id, src, tgt, ty, strength, confidence, evidence, vc, cc, meta, created, updated) =
                    row.map_err(|e| Error::internal("relationships_from", e))?;
                edges.push(PatternRelationship {
                    id: parse_uuid(&id)?,
                    source_pattern_id: PatternId::from_uuid(parse_uuid(&src)?),
                    target_pattern_id: PatternId::from_uuid(parse_uuid(&tgt)?),
                    relationship_type: RelationshipType::from_str(&ty)?,
                    strength,
                    confidence,
                    evidence: parse_json_map(&evidence)?,
                    validation_count: vc,
                    contradiction_count: cc,
                    extraction_metadata: parse_json_map(&meta)?,
                    created_at: parse_ts(&created)?,
                    updated_at: parse_ts(&updated)?,
                });
            }
            Ok(edges)
        })
    }

    /// Records validation evidence and advances the pattern's lifecycle.
    ///
    /// A supporting result moves a pending pattern to `validated`; a
    /// contradicting result moves it to `contradicted`. Archived and
    /// superseded patterns keep their state.
    ///
    /// # Errors
    ///
    /// `NotFound` when the pattern is absent; nothing is written in that
    /// case.
    pub fn put_validation(&self, validation: &PatternValidation) -> Result<Uuid> {
        validation.validate()?;
        let pattern = self.get_pattern(validation.pattern_id)?;

        self.with_tx("put_validation", |tx| {
            tx.execute(
                "INSERT INTO pattern_validations
                     (id, pattern_id, validation_type, result, evidence, validated_by,
                      confidence, session_id, project_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    validation.id.to_string(),
                    validation.pattern_id.to_string(),
                    validation.validation_type.as_str(),
                    validation.result,
                    to_json(&validation.evidence)?,
                    validation.validated_by.as_str(),
                    validation.confidence,
                    validation.session_id.map(|s| s.to_string()),
                    validation.project_id.map(|p| p.to_string()),
                    format_ts(validation.created_at),
                ],
            )
            .map_err(|e| Self::write_err("put_validation", &e))?;

            let next_status = match (pattern.validation_status, validation.result) {
                (ValidationStatus::Archived | ValidationStatus::Superseded, _) => None,
                (_, true) => Some(ValidationStatus::Validated),
                (_, false) => Some(ValidationStatus::Contradicted),
            };
            if let Some(status) = next_status {
                tx.execute(
                    "UPDATE patterns SET validation_status = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![
                        status.as_str(),
                        format_ts(Utc::now()),
                        validation.pattern_id.to_string()
                    ],
                )
                .map_err(|e| Error::internal("put_validation", e))?;
            }
            Ok(())
        })?;
        Ok(validation.id)
    }

    /// Records one pattern use.
    ///
    /// # Errors
    ///
    /// `NotFound` when the pattern is absent.
    pub fn put_usage(&self, usage: &PatternUsage) -> Result<Uuid> {
        usage.validate()?;
        self.get_pattern(usage.pattern_id)?;

        self.with_tx("put_usage", |tx| {
            tx.execute(
                "INSERT INTO pattern_usage
                     (id, pattern_id, session_id, usage_context, usage_outcome,
                      usage_type, effectiveness, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    usage.id.to_string(),
                    usage.pattern_id.to_string(),
                    usage.session_id.map(|s| s.to_string()),
                    usage.usage_context,
                    usage.usage_outcome.map(|o| o.as_str()),
                    usage.usage_type.as_str(),
                    usage.effectiveness,
                    format_ts(usage.created_at),
                ],
            )
            .map_err(|e| Self::write_err("put_usage", &e))?;
            Ok(())
        })?;
        Ok(usage.id)
    }

    /// Usage rows for one session, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on SQL failures.
    pub fn usage_for_session(&self, session_id: SessionId, limit: usize) -> Result<Vec<PatternUsage>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, pattern_id, session_id, usage_context, usage_outcome,
                            usage_type, effectiveness, created_at
                     FROM pattern_usage
                     WHERE session_id = ?1
                     ORDER BY created_at DESC
                     LIMIT ?2",
                )
                .map_err(|e| Error::internal("usage_for_session", e))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![session_id.to_string(), limit.to_string()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, Option<f64>>(6)?,
                            row.get::<_, String>(7)?,
                        ))
                    },
                )
                .map_err(|e| Error::internal("usage_for_session", e))?;

            let mut usages = Vec::new();
            for row in rows {
                let (id, pattern_id, session, context, outcome, ty, effectiveness, created) =
                    row.map_err(|e| Error::internal("usage_for_session", e))?;
                usages.push(PatternUsage {
                    id: parse_uuid(&id)?,
                    pattern_id: PatternId::from_uuid(parse_uuid(&pattern_id)?),
                    session_id: session
                        .as_deref()
                        .map(parse_uuid)
                        .transpose()?
                        .map(Into::into),
                    usage_context: context,
                    usage_outcome: outcome.as_deref().map(UsageOutcome::from_str).transpose()?,
                    usage_type: UsageType::from_str(&ty)?,
                    effectiveness,
                    created_at: parse_ts(&created)?,
                });
            }
            Ok(usages)
        })
    }

    /// Stores a strategic insight with its FTS row.
    ///
    /// # Errors
    ///
    /// `Validation` on invariant violations.
    pub fn put_insight(&self, insight: &StrategicInsight) -> Result<InsightId> {
        insight.validate(self.dimensions())?;

        let mut stored = insight.clone();
        stored.updated_at = Utc::now();

        self.with_tx("put_insight", |tx| {
            tx.execute(
                "INSERT OR REPLACE INTO strategic_insights
                     (id, insight_type, title, content, applicable_project_types,
                      confidence, effectiveness, semantic_type, embedding,
                      embedding_version, validation_status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    stored.id.to_string(),
                    stored.insight_type.as_str(),
                    stored.title,
                    to_json(&stored.content)?,
                    to_json(&stored.applicable_project_types)?,
                    stored.confidence,
                    stored.effectiveness,
                    stored.semantic_type.map(|t| t.as_str()),
                    stored.embedding.as_deref().map(embedding_to_blob),
                    stored.embedding_version,
                    stored.validation_status.as_str(),
                    format_ts(stored.created_at),
                    format_ts(stored.updated_at),
                ],
            )
            .map_err(|e| Self::write_err("put_insight", &e))?;

            tx.execute(
                "DELETE FROM insights_fts WHERE insight_id = ?1",
                [stored.id.to_string()],
            )
            .map_err(|e| Error::internal("put_insight", e))?;
            tx.execute(
                "INSERT INTO insights_fts (insight_id, title, content) VALUES (?1, ?2, ?3)",
                rusqlite::params![stored.id.to_string(), stored.title, stored.lexical_text()],
            )
            .map_err(|e| Error::internal("put_insight", e))?;
            Ok(())
        })?;
        Ok(stored.id)
    }

    /// Insights applicable to a project type, most effective first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on SQL failures.
    pub fn insights_for(
        &self,
        project_type: ProjectType,
        limit: usize,
    ) -> Result<Vec<StrategicInsight>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, insight_type, title, content, applicable_project_types,
                            confidence, effectiveness, semantic_type, embedding,
                            embedding_version, validation_status, created_at, updated_at
                     FROM strategic_insights
                     ORDER BY effectiveness DESC, confidence DESC, id ASC",
                )
                .map_err(|e| Error::internal("insights_for", e))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, f64>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<Vec<u8>>>(8)?,
                        row.get::<_, Option<String>>(9)?,
                        row.get::<_, String>(10)?,
                        row.get::<_, String>(11)?,
                        row.get::<_, String>(12)?,
                    ))
                })
                .map_err(|e| Error::internal("insights_for", e))?;

            let mut insights = Vec::new();
            for row in rows {
                let (id, ty, title, content, applicable, confidence, effectiveness, semantic,
                    embedding, embedding_version, status, created, updated) =
                    row.map_err(|e| Error::internal("insights_for", e))?;
                let insight = StrategicInsight {
                    id: InsightId::from_uuid(parse_uuid(&id)?),
                    insight_type: InsightType::from_str(&ty)?,
                    title,
                    content: parse_json_map(&content)?,
                    applicable_project_types: parse_json(&applicable)?,
                    confidence,
                    effectiveness,
                    semantic_type: semantic.as_deref().map(SemanticType::from_str).transpose()?,
                    embedding: embedding.as_deref().map(blob_to_embedding).transpose()?,
                    embedding_version,
                    validation_status: ValidationStatus::from_str(&status)?,
                    created_at: parse_ts(&created)?,
                    updated_at: parse_ts(&updated)?,
                };
                if insight.applies_to(project_type) {
                    insights.push(insight);
                    if insights.len() == limit {
                        break;
                    }
                }
            }
            Ok(insights)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::small_store;
    use serde_json::Map;

    fn pattern(title: &str) -> Pattern {
        Pattern::new(
            PatternType::RecurringPattern,
            title,
            PatternContent::Recurring {
                description: format!("{title} happens repeatedly"),
                occurrences: 3,
                extra: Map::new(),
            },
        )
    }

    #[test]
    fn test_pattern_roundtrip() {
        let store = small_store();
        let p = pattern("flaky friday tests");
        store.put_pattern(&p).unwrap();

        let fetched = store.get_pattern(p.id).unwrap();
        assert_eq!(fetched.title, p.title);
        assert_eq!(fetched.pattern_type, PatternType::RecurringPattern);
        assert!(matches!(
            fetched.content,
            PatternContent::Recurring { occurrences: 3, .. }
        ));
    }

    #[test]
    fn test_relationship_unique_constraint() {
        let store = small_store();
        let a = pattern("a");
        let b = pattern("b");
        store.put_pattern(&a).unwrap();
        store.put_pattern(&b).unwrap();

        let edge = PatternRelationship::new(a.id, b.id, RelationshipType::Causes);
        store.put_relationship(&edge).unwrap();

        let dup = PatternRelationship::new(a.id, b.id, RelationshipType::Causes);
        let err = store.put_relationship(&dup).unwrap_err();
        assert_eq!(err.code(), "CONFLICT");

        // A different type between the same endpoints is fine.
        let other = PatternRelationship::new(a.id, b.id, RelationshipType::Enhances);
        store.put_relationship(&other).unwrap();
        assert_eq!(store.relationships_from(a.id).unwrap().len(), 2);
    }

    #[test]
    fn test_relationship_missing_endpoint() {
        let store = small_store();
        let a = pattern("a");
        store.put_pattern(&a).unwrap();

        let edge = PatternRelationship::new(a.id, PatternId::new(), RelationshipType::Causes);
        let err = store.put_relationship(&edge).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_validation_advances_lifecycle() {
        let store = small_store();
        let p = pattern("validated pattern");
        store.put_pattern(&p).unwrap();

        let v = PatternValidation::new(
            p.id,
            ValidationType::UsageSuccess,
            true,
            ValidatedBy::System,
        );
        store.put_validation(&v).unwrap();
        assert_eq!(
            store.get_pattern(p.id).unwrap().validation_status,
            ValidationStatus::Validated
        );

        let contradiction = PatternValidation::new(
            p.id,
            ValidationType::ContradictionCheck,
            false,
            ValidatedBy::User,
        );
        store.put_validation(&contradiction).unwrap();
        assert_eq!(
            store.get_pattern(p.id).unwrap().validation_status,
            ValidationStatus::Contradicted
        );
    }

    #[test]
    fn test_validation_unknown_pattern_writes_nothing() {
        let store = small_store();
        let v = PatternValidation::new(
            PatternId::new(),
            ValidationType::UserFeedback,
            true,
            ValidatedBy::User,
        );
        let err = store.put_validation(&v).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(store.stats(None).unwrap().validations, 0);
    }

    #[test]
    fn test_usage_and_session_lookup() {
        let store = small_store();
        let p = pattern("used pattern");
        store.put_pattern(&p).unwrap();

        let session = SessionId::new();
        let mut usage = PatternUsage::new(p.id, UsageType::QueryResponse, "context assembly");
        usage.session_id = Some(session);
        store.put_usage(&usage).unwrap();

        let found = store.usage_for_session(session, 10).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pattern_id, p.id);
        assert!(found[0].usage_outcome.is_none());
    }

    #[test]
    fn test_insights_for_project_type() {
        let store = small_store();
        let mut software = StrategicInsight::new(InsightType::Lesson, "ship smaller diffs");
        software.applicable_project_types = vec![ProjectType::Software];
        software.effectiveness = 0.9;
        store.put_insight(&software).unwrap();

        let mut research = StrategicInsight::new(InsightType::Methodology, "pre-register analyses");
        research.applicable_project_types = vec![ProjectType::Research];
        store.put_insight(&research).unwrap();

        let universal = StrategicInsight::new(InsightType::BestPractice, "write things down");
        store.put_insight(&universal).unwrap();

        let hits = store.insights_for(ProjectType::Software, 10).unwrap();
        let titles: Vec<&str> = hits.iter().map(|i| i.title.as_str()).collect();
        assert!(titles.contains(&"ship smaller diffs"));
        assert!(titles.contains(&"write things down"));
        assert!(!titles.contains(&"pre-register analyses"));
        // Most effective first.
        assert_eq!(hits[0].title, "ship smaller diffs");
    }

    #[test]
    fn test_stats_distribution() {
        let store = small_store();
        store.put_pattern(&pattern("one")).unwrap();
        store.put_pattern(&pattern("two")).unwrap();

        let stats = store.stats(None).unwrap();
        assert_eq!(stats.patterns, 2);
        assert_eq!(stats.pattern_type_counts["recurring_pattern"], 2);
        assert!(stats.avg_confidence > 0.0);
    }
}
