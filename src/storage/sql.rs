//! SQL construction helpers.
//!
//! Filter clauses are built with numbered parameters so the same builder
//! serves plain listing, full-text joins, and count queries.

use crate::models::SearchFilter;
use crate::storage::rows::format_ts;

/// Builds a WHERE fragment for `knowledge_items` (aliased `k`) from a
/// search filter.
///
/// Returns the clause (prefixed with " AND " if non-empty), the parameter
/// values in order, and the next free parameter index.
#[must_use]
pub fn knowledge_filter_clause(
    filter: &SearchFilter,
    start_param: usize,
) -> (String, Vec<String>, usize) {
    let mut conditions = Vec::new();
    let mut params = Vec::new();
    let mut param_idx = start_param;

    if filter.active_only {
        conditions.push("k.is_active = 1".to_string());
    }

    if let Some(project) = filter.project {
        conditions.push(format!(
            "(k.project_id = ?{param_idx} OR k.cross_project = 1)"
        ));
        params.push(project.to_string());
        param_idx += 1;
    }

    if !filter.knowledge_types.is_empty() {
        let placeholders: Vec<String> = filter
            .knowledge_types
            .iter()
            .map(|_| {
                let p = format!("?{param_idx}");
                param_idx += 1;
                p
            })
            .collect();
        conditions.push(format!("k.knowledge_type IN ({})", placeholders.join(",")));
        for ty in &filter.knowledge_types {
            params.push(ty.as_str().to_string());
        }
    }

    if !filter.semantic_types.is_empty() {
        let placeholders: Vec<String> = filter
            .semantic_types
            .iter()
            .map(|_| {
                let p = format!("?{param_idx}");
                param_idx += 1;
                p
            })
            .collect();
        conditions.push(format!("k.semantic_type IN ({})", placeholders.join(",")));
        for ty in &filter.semantic_types {
            params.push(ty.as_str().to_string());
        }
    }

    if let Some(min) = filter.min_confidence {
        conditions.push(format!("k.semantic_confidence >= ?{param_idx}"));
        params.push(min.to_string());
        param_idx += 1;
    }

    if let Some(min) = filter.min_importance {
        conditions.push(format!("k.importance >= ?{param_idx}"));
        params.push(min.to_string());
        param_idx += 1;
    }

    if let Some(after) = filter.updated_after {
        conditions.push(format!("k.updated_at > ?{param_idx}"));
        params.push(format_ts(after));
        param_idx += 1;
    }

    if conditions.is_empty() {
        (String::new(), params, param_idx)
    } else {
        (format!(" AND {}", conditions.join(" AND ")), params, param_idx)
    }
}

/// Reduces free-form query text to an FTS5 MATCH expression.
///
/// Tokens are double-quoted so user input can never inject FTS5 query
/// syntax; tokens are OR-ed to favor recall (ranking handles precision).
/// Returns `None` when the text contains no indexable tokens.
#[must_use]
pub fn fts_match_expression(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KnowledgeType, ProjectId};

    #[test]
    fn test_empty_filter_no_clause() {
        let filter = SearchFilter {
            active_only: false,
            ..SearchFilter::default()
        };
        let (clause, params, next) = knowledge_filter_clause(&filter, 1);
        assert!(clause.is_empty());
        assert!(params.is_empty());
        assert_eq!(next, 1);
    }

    #[test]
    fn test_filter_clause_numbering() {
        let filter = SearchFilter::new()
            .with_project(ProjectId::new())
            .with_knowledge_type(KnowledgeType::Technical)
            .with_knowledge_type(KnowledgeType::Factual)
            .with_min_importance(70.0);
        let (clause, params, next) = knowledge_filter_clause(&filter, 2);

        assert!(clause.contains("k.is_active = 1"));
        assert!(clause.contains("?2"));
        assert!(clause.contains("IN (?3,?4)"));
        assert!(clause.contains("k.importance >= ?5"));
        assert_eq!(params.len(), 4);
        assert_eq!(next, 6);
    }

    #[test]
    fn test_fts_expression_quotes_tokens() {
        assert_eq!(
            fts_match_expression("absolute path-config").as_deref(),
            Some("\"absolute\" OR \"path\" OR \"config\"")
        );
        assert!(fts_match_expression("  --  ").is_none());
    }

    #[test]
    fn test_fts_expression_neutralizes_syntax() {
        // NEAR/AND/OR and column syntax must come out quoted.
        let expr = fts_match_expression("title:foo NEAR bar*").unwrap();
        assert!(!expr.contains("title:"));
        assert!(expr.contains("\"NEAR\""));
    }
}
