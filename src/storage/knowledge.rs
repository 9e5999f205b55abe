//! Knowledge item storage operations.

use super::rows::{
    blob_to_embedding, embedding_to_blob, format_ts, parse_json, parse_json_map, parse_ts,
    parse_uuid, to_json,
};
use super::sql::{fts_match_expression, knowledge_filter_clause};
use super::{Error, Result, Store};
use crate::models::{
    ClassificationMethod, KnowledgeId, KnowledgeItem, KnowledgeType, SearchFilter, SemanticType,
};
use chrono::Utc;
use rusqlite::Row;
use std::str::FromStr;

/// Candidate multiplier when post-filtering vector hits.
const VECTOR_OVERFETCH: usize = 8;

const KNOWLEDGE_COLUMNS: &str = "k.id, k.knowledge_type, k.semantic_type, k.semantic_confidence, \
     k.classification_method, k.title, k.content, k.category, k.project_id, k.session_id, \
     k.importance, k.quality, k.usage_count, k.validation_count, k.contradiction_count, \
     k.embedding, k.embedding_version, k.retrieval_triggers, k.cross_project, k.source_projects, \
     k.version, k.superseded_by, k.supersedes, k.is_active, k.created_at, k.updated_at, \
     k.context_data";

/// Raw row image; converted to the typed entity outside the rusqlite
/// closure so parse failures surface as engram errors.
struct KnowledgeRow {
    id: String,
    knowledge_type: String,
    semantic_type: Option<String>,
    semantic_confidence: Option<f64>,
    classification_method: Option<String>,
    title: String,
    content: String,
    category: String,
    project_id: Option<String>,
    session_id: Option<String>,
    importance: f64,
    quality: f64,
    usage_count: u32,
    validation_count: u32,
    contradiction_count: u32,
    embedding: Option<Vec<u8>>,
    embedding_version: Option<String>,
    retrieval_triggers: String,
    cross_project: bool,
    source_projects: String,
    version: u32,
    superseded_by: Option<String>,
    supersedes: String,
    is_active: bool,
    created_at: String,
    updated_at: String,
    context_data: String,
}

impl KnowledgeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            knowledge_type: row.get(1)?,
            semantic_type: row.get(2)?,
            semantic_confidence: row.get(3)?,
            classification_method: row.get(4)?,
            title: row.get(5)?,
            content: row.get(6)?,
            category: row.get(7)?,
            project_id: row.get(8)?,
            session_id: row.get(9)?,
            importance: row.get(10)?,
            quality: row.get(11)?,
            usage_count: row.get(12)?,
            validation_count: row.get(13)?,
            contradiction_count: row.get(14)?,
            embedding: row.get(15)?,
            embedding_version: row.get(16)?,
            retrieval_triggers: row.get(17)?,
            cross_project: row.get(18)?,
            source_projects: row.get(19)?,
            version: row.get(20)?,
            superseded_by: row.get(21)?,
            supersedes: row.get(22)?,
            is_active: row.get(23)?,
            created_at: row.get(24)?,
            updated_at: row.get(25)?,
            context_data: row.get(26)?,
        })
    }

    fn into_item(self) -> Result<KnowledgeItem> {
        Ok(KnowledgeItem {
            id: KnowledgeId::from_uuid(parse_uuid(&self.id)?),
            knowledge_type: KnowledgeType::from_str(&self.knowledge_type)?,
            semantic_type: self
                .semantic_type
                .as_deref()
                .map(SemanticType::from_str)
                .transpose()?,
            semantic_confidence: self.semantic_confidence,
            classification_method: self
                .classification_method
                .as_deref()
                .map(ClassificationMethod::from_str)
                .transpose()?,
            title: self.title,
            content: self.content,
            category: self.category,
            context_data: parse_json_map(&self.context_data)?,
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
            importance: self.importance,
            quality: self.quality,
            usage_count: self.usage_count,
            validation_count: self.validation_count,
            contradiction_count: self.contradiction_count,
            embedding: self
                .embedding
                .as_deref()
                .map(blob_to_embedding)
                .transpose()?,
            embedding_version: self.embedding_version,
            retrieval_triggers: parse_json(&self.retrieval_triggers)?,
            cross_project: self.cross_project,
            source_projects: parse_json(&self.source_projects)?,
            version: self.version,
            superseded_by: self
                .superseded_by
                .as_deref()
                .map(parse_uuid)
                .transpose()?
                .map(Into::into),
            supersedes: parse_json(&self.supersedes)?,
            is_active: self.is_active,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

impl Store {
    /// Stores a knowledge item.
    ///
    /// The write, its FTS row, and any supersession updates land in one
    /// transaction; `updated_at` is stamped by the store. When the item
    /// names `supersedes` targets, those rows are deactivated and the new
    /// item's version is bumped past the highest superseded version.
    ///
    /// # Errors
    ///
    /// `Validation` on invariant violations, `NotFound` when a
    /// superseded id does not exist.
    pub fn put_knowledge(&self, item: &KnowledgeItem) -> Result<KnowledgeId> {
        item.validate(self.dimensions(), self.consistency_table())?;

        let mut stored = item.clone();
        stored.updated_at = Utc::now();

        self.with_tx("put_knowledge", |tx| {
            if !stored.supersedes.is_empty() {
                let mut max_version = stored.version;
                for old_id in &stored.supersedes {
                    let old_version: u32 = tx
                        .query_row(
                            "SELECT version FROM knowledge_items WHERE id = ?1",
                            [old_id.to_string()],
                            |row| row.get(0),
                        )
                        .map_err(|e| {
                            if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                                Error::not_found("knowledge_item", old_id.to_string())
                            } else {
                                Error::internal("put_knowledge", e)
                            }
                        })?;
                    max_version = max_version.max(old_version + 1);
                    // The old row stays indexed; `is_active` filtering is
                    // what hides it from default retrieval.
                    tx.execute(
                        "UPDATE knowledge_items
                         SET superseded_by = ?1, is_active = 0, updated_at = ?2
                         WHERE id = ?3",
                        rusqlite::params![
                            stored.id.to_string(),
                            format_ts(stored.updated_at),
                            old_id.to_string()
                        ],
                    )
                    .map_err(|e| Error::internal("put_knowledge", e))?;
                }
                stored.version = max_version;
            }

            tx.execute(
                "INSERT OR REPLACE INTO knowledge_items
                     (id, knowledge_type, semantic_type, semantic_confidence,
                      classification_method, title, content, category, project_id, session_id,
                      importance, quality, usage_count, validation_count, contradiction_count,
                      embedding, embedding_version, retrieval_triggers, cross_project,
                      source_projects, version, superseded_by, supersedes, is_active,
                      created_at, updated_at, context_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
                rusqlite::params![
                    stored.id.to_string(),
                    stored.knowledge_type.as_str(),
                    stored.semantic_type.map(|t| t.as_str()),
                    stored.semantic_confidence,
                    stored.classification_method.map(|m| m.as_str()),
                    stored.title,
                    stored.content,
                    stored.category,
                    stored.project_id.map(|p| p.to_string()),
                    stored.session_id.map(|s| s.to_string()),
                    stored.importance,
                    stored.quality,
                    stored.usage_count,
                    stored.validation_count,
                    stored.contradiction_count,
                    stored.embedding.as_deref().map(embedding_to_blob),
                    stored.embedding_version,
                    to_json(&stored.retrieval_triggers)?,
                    stored.cross_project,
                    to_json(&stored.source_projects)?,
                    stored.version,
                    stored.superseded_by.map(|s| s.to_string()),
                    to_json(&stored.supersedes)?,
                    stored.is_active,
                    format_ts(stored.created_at),
                    format_ts(stored.updated_at),
                    to_json(&stored.context_data)?,
                ],
            )
            .map_err(|e| Self::write_err("put_knowledge", &e))?;

            // Lexical index row, regenerated atomically with the write.
            tx.execute(
                "DELETE FROM knowledge_fts WHERE item_id = ?1",
                [stored.id.to_string()],
            )
            .map_err(|e| Error::internal("put_knowledge", e))?;
            tx.execute(
                "INSERT INTO knowledge_fts (item_id, title, content) VALUES (?1, ?2, ?3)",
                rusqlite::params![stored.id.to_string(), stored.title, stored.lexical_text()],
            )
            .map_err(|e| Error::internal("put_knowledge", e))?;

            Ok(())
        })?;

        // Vector index mirrors committed state; zero vectors stay lexical-only.
        if let Some(embedding) = &stored.embedding {
            if embedding.iter().any(|v| *v != 0.0) {
                self.knowledge_index()
                    .write()
                    .upsert(*stored.id.as_uuid(), embedding.clone())?;
            }
        }

        Ok(stored.id)
    }

    /// Fetches one knowledge item.
    ///
    /// # Errors
    ///
    /// `NotFound` when the id is absent.
    pub fn get_knowledge(&self, id: KnowledgeId) -> Result<KnowledgeItem> {
        self.with_conn(|conn| {
            let raw = conn
                .query_row(
                    &format!(
                        "SELECT {KNOWLEDGE_COLUMNS} FROM knowledge_items k WHERE k.id = ?1"
                    ),
                    [id.to_string()],
                    KnowledgeRow::from_row,
                )
                .map_err(|e| {
                    if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
                        Error::not_found("knowledge_item", id.to_string())
                    } else {
                        Error::internal("get_knowledge", e)
                    }
                })?;
            raw.into_item()
        })
    }

    /// Lists knowledge items matching a filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on SQL failures.
    pub fn list_knowledge(&self, filter: &SearchFilter, limit: usize) -> Result<Vec<KnowledgeItem>> {
        self.with_conn(|conn| {
            let (clause, params, next) = knowledge_filter_clause(filter, 1);
            let sql = format!(
                "SELECT {KNOWLEDGE_COLUMNS} FROM knowledge_items k
                 WHERE 1 = 1{clause}
                 ORDER BY k.updated_at DESC, k.id ASC
                 LIMIT ?{next}"
            );
            let mut bound: Vec<String> = params;
            bound.push(limit.to_string());

            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| Error::internal("list_knowledge", e))?;
            let rows = stmt
                .query_map(
                    rusqlite::params_from_iter(bound.iter()),
                    KnowledgeRow::from_row,
                )
                .map_err(|e| Error::internal("list_knowledge", e))?;

            let mut items = Vec::new();
            for row in rows {
                items.push(row.map_err(|e| Error::internal("list_knowledge", e))?.into_item()?);
            }
            Ok(items)
        })
    }

    /// Searches by cosine similarity against the vector index.
    ///
    /// Hits below `threshold` are dropped; survivors are ordered by
    /// similarity desc, then importance desc, then recency desc, then id.
    ///
    /// # Errors
    ///
    /// `DependencyUnavailable` when the vector index is offline (callers
    /// fall back to the lexical path), `Validation` on dimension
    /// mismatches.
    pub fn vector_search(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &SearchFilter,
        threshold: f32,
    ) -> Result<Vec<(KnowledgeItem, f32)>> {
        if !self.vector_search_available() {
            return Err(Error::DependencyUnavailable {
                dependency: "vector_index",
                cause: "index marked corrupt; run reindex".to_string(),
            });
        }

        let candidates = {
            let index = self.knowledge_index().read();
            index.search(embedding, (k * VECTOR_OVERFETCH).max(64), self.ann_probes())?
        };

        let mut hits = Vec::new();
        for (uuid, similarity) in candidates {
            if similarity < threshold {
                // Candidates arrive ordered by similarity; the rest are below too.
                break;
            }
            let item = self.get_knowledge(KnowledgeId::from_uuid(uuid))?;
            if filter.matches(&item) {
                hits.push((item, similarity));
            }
        }

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.0.importance
                        .partial_cmp(&a.0.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.0.updated_at.cmp(&a.0.updated_at))
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Full-text search over titles, content, and retrieval triggers.
    ///
    /// Scores are positive (negated FTS5 BM25), larger is better.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on SQL failures.
    pub fn fulltext_search(
        &self,
        query: &str,
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<(KnowledgeItem, f32)>> {
        let Some(match_expr) = fts_match_expression(query) else {
            return Ok(Vec::new());
        };

        self.with_conn(|conn| {
            let (clause, params, next) = knowledge_filter_clause(filter, 2);
            let sql = format!(
                "SELECT {KNOWLEDGE_COLUMNS}, -bm25(knowledge_fts) AS lex
                 FROM knowledge_fts
                 JOIN knowledge_items k ON k.id = knowledge_fts.item_id
                 WHERE knowledge_fts MATCH ?1{clause}
                 ORDER BY lex DESC, k.id ASC
                 LIMIT ?{next}"
            );

            let mut bound: Vec<String> = vec![match_expr];
            bound.extend(params);
            bound.push(k.to_string());

            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| Error::internal("fulltext_search", e))?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(bound.iter()), |row| {
                    let raw = KnowledgeRow::from_row(row)?;
                    let lex: f64 = row.get(27)?;
                    Ok((raw, lex))
                })
                .map_err(|e| Error::internal("fulltext_search", e))?;

            let mut hits = Vec::new();
            for row in rows {
                let (raw, lex) = row.map_err(|e| Error::internal("fulltext_search", e))?;
                #[allow(clippy::cast_possible_truncation)]
                hits.push((raw.into_item()?, lex as f32));
            }
            Ok(hits)
        })
    }

    /// Bumps `usage_count` for the given items.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on SQL failures.
    pub fn increment_knowledge_usage(&self, ids: &[KnowledgeId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.with_tx("increment_knowledge_usage", |tx| {
            let now = format_ts(Utc::now());
            for id in ids {
                tx.execute(
                    "UPDATE knowledge_items
                     SET usage_count = usage_count + 1, updated_at = ?1
                     WHERE id = ?2",
                    rusqlite::params![now, id.to_string()],
                )
                .map_err(|e| Error::internal("increment_knowledge_usage", e))?;
            }
            Ok(())
        })
    }

    /// Items stored by one session, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` on SQL failures.
    pub fn knowledge_for_session(
        &self,
        session_id: crate::models::SessionId,
        limit: usize,
    ) -> Result<Vec<KnowledgeItem>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {KNOWLEDGE_COLUMNS} FROM knowledge_items k
                 WHERE k.session_id = ?1
                 ORDER BY k.updated_at DESC, k.id ASC
                 LIMIT ?2"
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| Error::internal("knowledge_for_session", e))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![session_id.to_string(), limit.to_string()],
                    KnowledgeRow::from_row,
                )
                .map_err(|e| Error::internal("knowledge_for_session", e))?;

            let mut items = Vec::new();
            for row in rows {
                items.push(
                    row.map_err(|e| Error::internal("knowledge_for_session", e))?
                        .into_item()?,
                );
            }
            Ok(items)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::small_store;

    fn embedded_item(title: &str, content: &str, seed: f32) -> KnowledgeItem {
        let mut item = KnowledgeItem::new(KnowledgeType::Technical, "test", title, content);
        let raw: Vec<f32> = (0..32).map(|i| (seed + i as f32).sin()).collect();
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        item.embedding = Some(raw.into_iter().map(|x| x / norm).collect());
        item
    }

    #[test]
    fn test_put_get_roundtrip() {
        let store = small_store();
        let item = embedded_item("X requires absolute path", "Config must use absolute path", 1.0);
        let id = store.put_knowledge(&item).unwrap();
        assert_eq!(id, item.id);

        let fetched = store.get_knowledge(id).unwrap();
        assert_eq!(fetched.title, item.title);
        assert_eq!(fetched.content, item.content);
        assert_eq!(fetched.embedding, item.embedding);
        assert_eq!(fetched.knowledge_type, KnowledgeType::Technical);
        // Server stamps updated_at on write.
        assert!(fetched.updated_at >= item.created_at);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = small_store();
        let err = store.get_knowledge(KnowledgeId::new()).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let store = small_store();
        let mut item = embedded_item("t", "c", 1.0);
        item.embedding = Some(vec![0.1; 16]);
        let err = store.put_knowledge(&item).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_vector_search_finds_stored_item() {
        let store = small_store();
        let item = embedded_item("path config", "Config must use absolute path", 1.0);
        let query = item.embedding.clone().unwrap();
        store.put_knowledge(&item).unwrap();
        store
            .put_knowledge(&embedded_item("other", "unrelated content", 9.0))
            .unwrap();

        let hits = store
            .vector_search(&query, 5, &SearchFilter::new(), 0.25)
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].0.id, item.id);
        assert!(hits[0].1 > 0.99);
    }

    #[test]
    fn test_vector_search_threshold_one_empty_not_error() {
        let store = small_store();
        store
            .put_knowledge(&embedded_item("a", "some content here", 3.0))
            .unwrap();
        let query: Vec<f32> = {
            let raw: Vec<f32> = (0..32).map(|i| ((i * 17 + 5) as f32).cos()).collect();
            let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
            raw.into_iter().map(|x| x / norm).collect()
        };
        let hits = store
            .vector_search(&query, 5, &SearchFilter::new(), 1.0)
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_fulltext_search() {
        let store = small_store();
        let item = embedded_item(
            "X requires absolute path",
            "Config must use absolute path to X",
            1.0,
        );
        store.put_knowledge(&item).unwrap();
        store
            .put_knowledge(&embedded_item("tokio", "runtime worker threads", 5.0))
            .unwrap();

        let hits = store
            .fulltext_search("absolute path configuration", 5, &SearchFilter::new())
            .unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].0.id, item.id);
        assert!(hits[0].1 > 0.0);
    }

    #[test]
    fn test_retrieval_triggers_are_indexed() {
        let store = small_store();
        let mut item = embedded_item("deploy notes", "use the blue slot first", 2.0);
        item.retrieval_triggers = vec!["kubernetes".to_string(), "rollout".to_string()];
        store.put_knowledge(&item).unwrap();

        let hits = store
            .fulltext_search("kubernetes", 5, &SearchFilter::new())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, item.id);
    }

    #[test]
    fn test_supersession() {
        let store = small_store();
        let a = embedded_item("old fact", "the old way of doing things", 1.0);
        store.put_knowledge(&a).unwrap();

        let mut b = embedded_item("new fact", "the new way of doing things", 2.0);
        b.supersedes = vec![a.id];
        store.put_knowledge(&b).unwrap();

        let old = store.get_knowledge(a.id).unwrap();
        assert!(!old.is_active);
        assert_eq!(old.superseded_by, Some(b.id));

        let new = store.get_knowledge(b.id).unwrap();
        assert!(new.is_active);
        assert_eq!(new.version, old.version + 1);

        // Active listing excludes A, includes B.
        let active = store.list_knowledge(&SearchFilter::new(), 10).unwrap();
        assert!(active.iter().any(|i| i.id == b.id));
        assert!(!active.iter().any(|i| i.id == a.id));

        // Inactive items come back only with include_inactive.
        let all = store
            .list_knowledge(&SearchFilter::new().include_inactive(), 10)
            .unwrap();
        assert!(all.iter().any(|i| i.id == a.id));
    }

    #[test]
    fn test_supersede_missing_item_fails_whole_write() {
        let store = small_store();
        let mut b = embedded_item("new", "content", 2.0);
        b.supersedes = vec![KnowledgeId::new()];
        let err = store.put_knowledge(&b).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        // Nothing was written.
        assert!(store.get_knowledge(b.id).is_err());
    }

    #[test]
    fn test_usage_counter() {
        let store = small_store();
        let item = embedded_item("t", "counted content", 1.0);
        store.put_knowledge(&item).unwrap();
        store.increment_knowledge_usage(&[item.id]).unwrap();
        store.increment_knowledge_usage(&[item.id]).unwrap();
        assert_eq!(store.get_knowledge(item.id).unwrap().usage_count, 2);
    }
}
