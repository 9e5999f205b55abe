//! Tool execution handlers.
//!
//! Each handler deserializes its typed argument struct (schema
//! validation before any store access), calls into the service graph,
//! and returns a JSON result. Blocking store work runs on the worker
//! pool so the serve loop never stalls.

use crate::models::{
    KnowledgeItem, KnowledgeType, PatternId, PatternValidation, Project, ProjectType,
    SearchFilter, SemanticType, Session, SessionId, ValidatedBy, ValidationStatus, ValidationType,
};
use crate::retrieval::RetrievalResult;
use crate::services::ServiceContainer;
use crate::storage::PatternFilter;
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::str::FromStr;
use std::sync::Arc;

/// Maximum accepted query/signature length in bytes.
const MAX_QUERY_LENGTH: usize = 10_240;

/// Maximum accepted content length in bytes.
const MAX_CONTENT_LENGTH: usize = 1_048_576;

/// Default confidence for auto-derived semantic types.
const HEURISTIC_CONFIDENCE: f64 = 0.55;

fn parse_args<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T> {
    serde_json::from_value(params.unwrap_or_else(|| Value::Object(Map::new())))
        .map_err(|e| Error::Validation(e.to_string()))
}

fn validate_length(input: &str, field: &str, max: usize) -> Result<()> {
    if input.len() > max {
        return Err(Error::Validation(format!(
            "{field} exceeds maximum length ({} > {max} bytes)",
            input.len()
        )));
    }
    Ok(())
}

fn parse_session_id(raw: &str) -> Result<SessionId> {
    SessionId::from_str(raw).map_err(|_| Error::Validation(format!("invalid session id: {raw}")))
}

fn knowledge_summary(item: &KnowledgeItem) -> Value {
    json!({
        "knowledge_id": item.id,
        "knowledge_type": item.knowledge_type,
        "semantic_type": item.semantic_type,
        "title": item.title,
        "content": item.content,
        "category": item.category,
        "importance": item.importance,
        "active": item.is_active,
    })
}

fn search_result_json(result: &RetrievalResult) -> Value {
    let hits: Vec<Value> = result
        .hits
        .iter()
        .map(|hit| {
            json!({
                "knowledge_id": hit.item.id,
                "title": hit.item.title,
                "content": hit.item.content,
                "knowledge_type": hit.item.knowledge_type,
                "semantic_type": hit.item.semantic_type,
                "score": hit.score,
                "vector_score": hit.vector_score,
                "lexical_score": hit.lexical_score,
                "active": hit.item.is_active,
            })
        })
        .collect();
    json!({
        "results": hits,
        "degraded": result.degraded,
        "mode": result.mode,
        "execution_time_ms": result.execution_time_ms,
    })
}

// ---------------------------------------------------------------------------
// start_session / end_session

#[derive(Deserialize)]
struct StartSessionArgs {
    project_context: ProjectContextArgs,
    #[serde(default)]
    session_metadata: Option<SessionMetadataArgs>,
}

#[derive(Deserialize)]
struct ProjectContextArgs {
    name: String,
    display_name: Option<String>,
    project_type: Option<String>,
}

#[derive(Deserialize, Default)]
struct SessionMetadataArgs {
    session_id: Option<String>,
    session_type: Option<String>,
    user_context: Option<Map<String, Value>>,
}

/// Starts a session and returns startup knowledge for it.
pub async fn start_session(services: Arc<ServiceContainer>, params: Option<Value>) -> Result<Value> {
    let args: StartSessionArgs = parse_args(params)?;

    tokio::task::spawn_blocking(move || {
        let store = services.store();
        let project = match store.get_project_by_name(&args.project_context.name) {
            Ok(project) => project,
            Err(Error::NotFound { .. }) => {
                // Only a declared project_type may create a new project.
                let Some(raw_type) = &args.project_context.project_type else {
                    return Err(Error::not_found("project", args.project_context.name.clone()));
                };
                let mut project =
                    Project::new(&args.project_context.name, ProjectType::from_str(raw_type)?);
                if let Some(display) = &args.project_context.display_name {
                    project.display_name = display.clone();
                }
                store.put_project(&project)?;
                project
            },
            Err(e) => return Err(e),
        };

        let metadata = args.session_metadata.unwrap_or_default();
        let external_id = metadata
            .session_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut session = Session::new(external_id, project.id);
        if let Some(ty) = metadata.session_type {
            session.session_type = ty;
        }
        if let Some(context) = metadata.user_context {
            session.user_context = context;
        }
        store.put_session(&session)?;

        let mut startup = store.list_knowledge(
            &SearchFilter::new().with_project(project.id),
            20,
        )?;
        startup.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        startup.truncate(10);

        let interaction_patterns = store.list_patterns(
            &PatternFilter {
                project: Some(project.id),
                validation_status: Some(ValidationStatus::Validated),
                pattern_type: None,
            },
            5,
        )?;
        let validation_tests = store.list_patterns(
            &PatternFilter {
                project: Some(project.id),
                validation_status: Some(ValidationStatus::Pending),
                pattern_type: None,
            },
            5,
        )?;

        Ok(json!({
            "session_id": session.id,
            "project_id": project.id,
            "startup_knowledge": startup.iter().map(knowledge_summary).collect::<Vec<_>>(),
            "interaction_patterns": interaction_patterns.iter().map(|p| json!({
                "pattern_id": p.id,
                "pattern_type": p.pattern_type,
                "title": p.title,
                "confidence": p.confidence,
                "success_rate": p.success_rate,
            })).collect::<Vec<_>>(),
            "validation_tests": validation_tests.iter().map(|p| json!({
                "pattern_id": p.id,
                "title": p.title,
                "suggestion": format!("confirm or contradict '{}' during this session", p.title),
            })).collect::<Vec<_>>(),
        }))
    })
    .await
    .map_err(|e| Error::internal("start_session", e))?
}

#[derive(Deserialize)]
struct EndSessionArgs {
    session_id: String,
    #[serde(default)]
    insights: Vec<String>,
    #[serde(default)]
    breakthroughs: Vec<String>,
}

/// Ends a session, capturing closing insights and breakthroughs.
pub async fn end_session(services: Arc<ServiceContainer>, params: Option<Value>) -> Result<Value> {
    let args: EndSessionArgs = parse_args(params)?;
    let session_id = parse_session_id(&args.session_id)?;

    tokio::task::spawn_blocking(move || {
        let store = services.store();
        let session = store.get_session(session_id)?;

        for (texts, importance) in [(&args.insights, 60.0), (&args.breakthroughs, 85.0)] {
            for text in texts {
                let title: String = text.chars().take(120).collect();
                let mut item = KnowledgeItem::new(
                    KnowledgeType::Experiential,
                    "session_closing",
                    title,
                    text.clone(),
                );
                item.semantic_type = Some(SemanticType::Experiential);
                item.semantic_confidence = Some(HEURISTIC_CONFIDENCE);
                item.classification_method =
                    Some(crate::models::ClassificationMethod::Heuristic);
                item.importance = importance;
                item.project_id = Some(session.project_id);
                item.session_id = Some(session.id);
                if let Some((vector, version)) = services.try_embed(text) {
                    item.embedding = Some(vector);
                    item.embedding_version = Some(version);
                }
                store.put_knowledge(&item)?;
            }
        }

        let ended = store.end_session(session_id)?;
        Ok(json!({
            "session_id": ended.id,
            "total_interactions": ended.total_interactions,
            "successful_interactions": ended.successful_interactions,
            "failed_interactions": ended.failed_interactions,
            "duration_seconds": ended.duration().num_seconds(),
            "quality_score": ended.quality_score(),
        }))
    })
    .await
    .map_err(|e| Error::internal("end_session", e))?
}

// ---------------------------------------------------------------------------
// store_knowledge

#[derive(Deserialize)]
struct StoreKnowledgeArgs {
    knowledge_type: String,
    category: String,
    title: String,
    content: String,
    #[serde(default)]
    context_data: Option<Map<String, Value>>,
    #[serde(default)]
    importance: Option<f64>,
    #[serde(default)]
    retrieval_triggers: Vec<String>,
    #[serde(default)]
    semantic_type: Option<String>,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

/// Stores a typed knowledge item.
pub async fn store_knowledge(
    services: Arc<ServiceContainer>,
    params: Option<Value>,
) -> Result<Value> {
    let args: StoreKnowledgeArgs = parse_args(params)?;
    validate_length(&args.content, "content", MAX_CONTENT_LENGTH)?;

    tokio::task::spawn_blocking(move || {
        let store = services.store();
        let knowledge_type = KnowledgeType::from_str(&args.knowledge_type)?;

        let mut item =
            KnowledgeItem::new(knowledge_type, args.category, args.title, args.content);
        if let Some(declared) = &args.semantic_type {
            item.semantic_type = Some(SemanticType::from_str(declared)?);
            item.semantic_confidence = Some(1.0);
            item.classification_method = Some(crate::models::ClassificationMethod::Declared);
        } else if let Some(derived) = services.config().consistency.get(&knowledge_type) {
            item.semantic_type = Some(*derived);
            item.semantic_confidence = Some(HEURISTIC_CONFIDENCE);
            item.classification_method = Some(crate::models::ClassificationMethod::Heuristic);
        }
        if let Some(context) = args.context_data {
            item.context_data = context;
        }
        if let Some(importance) = args.importance {
            item.importance = importance;
        }
        item.retrieval_triggers = args.retrieval_triggers;

        if let Some(name) = &args.project {
            item.project_id = Some(store.get_project_by_name(name)?.id);
        }
        if let Some(raw) = &args.session_id {
            let session_id = parse_session_id(raw)?;
            item.session_id = Some(store.get_session(session_id)?.id);
        }

        if let Some((vector, version)) =
            services.try_embed(&format!("{}\n{}", item.title, item.content))
        {
            item.embedding = Some(vector);
            item.embedding_version = Some(version);
        }

        let id = store.put_knowledge(&item)?;
        Ok(json!({ "knowledge_id": id }))
    })
    .await
    .map_err(|e| Error::internal("store_knowledge", e))?
}

// ---------------------------------------------------------------------------
// search tools

#[derive(Deserialize)]
struct SearchSimilarArgs {
    query: String,
    #[serde(default)]
    knowledge_type: Option<String>,
    #[serde(default)]
    max_results: Option<usize>,
}

/// Hybrid search over stored knowledge.
pub async fn search_similar_knowledge(
    services: Arc<ServiceContainer>,
    params: Option<Value>,
) -> Result<Value> {
    let args: SearchSimilarArgs = parse_args(params)?;
    validate_length(&args.query, "query", MAX_QUERY_LENGTH)?;
    let k = args.max_results.unwrap_or(10).clamp(1, 100);

    let mut filter = SearchFilter::new();
    if let Some(raw) = &args.knowledge_type {
        filter = filter.with_knowledge_type(KnowledgeType::from_str(raw)?);
    }

    let result = tokio::task::spawn_blocking(move || {
        services.retrieval().search(&args.query, &filter, k)
    })
    .await
    .map_err(|e| Error::internal("search_similar_knowledge", e))??;

    Ok(search_result_json(&result))
}

#[derive(Deserialize)]
struct ContextualArgs {
    situation: String,
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    max_results: Option<usize>,
}

/// Warmed + live contextual knowledge for a situation.
pub async fn get_contextual_knowledge(
    services: Arc<ServiceContainer>,
    params: Option<Value>,
) -> Result<Value> {
    let args: ContextualArgs = parse_args(params)?;
    validate_length(&args.situation, "situation", MAX_QUERY_LENGTH)?;
    let k = args.max_results.unwrap_or(10).clamp(1, 100);

    let Some(project_name) = args.project else {
        // No project scope: live retrieval only.
        let result = tokio::task::spawn_blocking({
            let services = Arc::clone(&services);
            let situation = args.situation.clone();
            move || services.retrieval().search(&situation, &SearchFilter::new(), k)
        })
        .await
        .map_err(|e| Error::internal("get_contextual_knowledge", e))??;
        return Ok(search_result_json(&result));
    };

    let project = {
        let services = Arc::clone(&services);
        tokio::task::spawn_blocking(move || services.store().get_project_by_name(&project_name))
            .await
            .map_err(|e| Error::internal("get_contextual_knowledge", e))??
    };

    let budget = services.config().context_token_budget;
    let (packet, cache_hit) = services
        .warmer()
        .warm(&project, &args.situation, k, budget)
        .await?;

    let live = tokio::task::spawn_blocking({
        let services = Arc::clone(&services);
        let situation = args.situation.clone();
        let filter = SearchFilter::new().with_project(project.id);
        move || services.retrieval().search(&situation, &filter, k)
    })
    .await
    .map_err(|e| Error::internal("get_contextual_knowledge", e))??;

    let mut items: Vec<Value> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for entry in packet.entries.iter().take(k) {
        seen.insert(entry.item.id());
        items.push(json!({
            "id": entry.item.id(),
            "title": entry.item.title(),
            "content": entry.item.body(),
            "tier": entry.tier,
            "score": entry.score,
            "source": "warmed",
            "tokens_est": entry.tokens_est,
        }));
    }
    for hit in &live.hits {
        if items.len() >= k {
            break;
        }
        if !seen.insert(*hit.item.id.as_uuid()) {
            continue;
        }
        items.push(json!({
            "id": hit.item.id,
            "title": hit.item.title,
            "content": hit.item.content,
            "tier": Value::Null,
            "score": hit.score,
            "source": "live",
            "tokens_est": hit.item.tokens_est(),
        }));
    }

    Ok(json!({
        "items": items,
        "warm_id": packet.warm_id,
        "cache_hit": cache_hit,
        "degraded": live.degraded,
    }))
}

#[derive(Deserialize)]
struct GotchasArgs {
    problem_signature: String,
    #[serde(default)]
    max_results: Option<usize>,
}

/// Technical discoveries matching a problem signature.
pub async fn get_technical_gotchas(
    services: Arc<ServiceContainer>,
    params: Option<Value>,
) -> Result<Value> {
    let args: GotchasArgs = parse_args(params)?;
    validate_length(&args.problem_signature, "problem_signature", MAX_QUERY_LENGTH)?;
    let k = args.max_results.unwrap_or(10).clamp(1, 100);

    let filter = SearchFilter::new().with_semantic_type(SemanticType::TechnicalDiscovery);
    let result = tokio::task::spawn_blocking(move || {
        services.retrieval().search(&args.problem_signature, &filter, k)
    })
    .await
    .map_err(|e| Error::internal("get_technical_gotchas", e))??;

    Ok(search_result_json(&result))
}

#[derive(Deserialize)]
struct SessionContextArgs {
    session_id: String,
    #[serde(default)]
    max_results: Option<usize>,
}

/// Recent items and pattern usage for one session.
pub async fn get_session_context(
    services: Arc<ServiceContainer>,
    params: Option<Value>,
) -> Result<Value> {
    let args: SessionContextArgs = parse_args(params)?;
    let session_id = parse_session_id(&args.session_id)?;
    let k = args.max_results.unwrap_or(20).clamp(1, 100);

    tokio::task::spawn_blocking(move || {
        let store = services.store();
        let session = store.get_session(session_id)?;
        let items = store.knowledge_for_session(session.id, k)?;
        let usage = store.usage_for_session(session.id, k)?;

        Ok(json!({
            "session": {
                "session_id": session.id,
                "external_id": session.external_id,
                "project_id": session.project_id,
                "open": session.is_open(),
                "total_interactions": session.total_interactions,
                "successful_interactions": session.successful_interactions,
                "failed_interactions": session.failed_interactions,
            },
            "recent_items": items.iter().map(knowledge_summary).collect::<Vec<_>>(),
            "recent_usage": usage.iter().map(|u| json!({
                "usage_id": u.id,
                "pattern_id": u.pattern_id,
                "usage_type": u.usage_type,
                "usage_outcome": u.usage_outcome,
                "usage_context": u.usage_context,
            })).collect::<Vec<_>>(),
        }))
    })
    .await
    .map_err(|e| Error::internal("get_session_context", e))?
}

// ---------------------------------------------------------------------------
// record_validation

#[derive(Deserialize)]
struct RecordValidationArgs {
    pattern_id: String,
    #[serde(rename = "type")]
    validation_type: String,
    result: bool,
    #[serde(default)]
    evidence: Option<Map<String, Value>>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    session_id: Option<String>,
}

/// Records validation evidence for a pattern.
pub async fn record_validation(
    services: Arc<ServiceContainer>,
    params: Option<Value>,
) -> Result<Value> {
    let args: RecordValidationArgs = parse_args(params)?;
    let pattern_id = PatternId::from_str(&args.pattern_id)
        .map_err(|_| Error::Validation(format!("invalid pattern id: {}", args.pattern_id)))?;

    tokio::task::spawn_blocking(move || {
        let mut validation = PatternValidation::new(
            pattern_id,
            ValidationType::from_str(&args.validation_type)?,
            args.result,
            ValidatedBy::User,
        );
        if let Some(evidence) = args.evidence {
            validation.evidence = evidence;
        }
        if let Some(confidence) = args.confidence {
            validation.confidence = confidence;
        }
        if let Some(raw) = &args.session_id {
            validation.session_id = Some(parse_session_id(raw)?);
        }

        let id = services.store().put_validation(&validation)?;
        Ok(json!({ "validation_id": id }))
    })
    .await
    .map_err(|e| Error::internal("record_validation", e))?
}
