//! End-to-end tests over the tool surface.

use engram::Store;
use engram::config::EngramConfig;
use engram::mcp::{McpServer, Request};
use engram::models::{KnowledgeItem, KnowledgeType, SearchFilter};
use engram::services::ServiceContainer;
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

fn config() -> EngramConfig {
    EngramConfig {
        embedding_dimension: 32,
        ..EngramConfig::default()
    }
}

fn server_with(config: &EngramConfig) -> (McpServer, Arc<ServiceContainer>) {
    let services = Arc::new(ServiceContainer::open_in_memory(config).unwrap());
    (McpServer::new(Arc::clone(&services)), services)
}

fn request(method: &str, params: Value) -> Request {
    Request {
        id: Some(json!(1)),
        method: method.to_string(),
        params: Some(params),
    }
}

#[tokio::test]
async fn store_then_retrieve_returns_stored_item_first() {
    let (server, _services) = server_with(&config());

    let stored = server
        .handle(request(
            "store_knowledge",
            json!({
                "knowledge_type": "technical",
                "category": "configuration",
                "title": "X requires absolute path",
                "content": "Config must use absolute path to X",
                "importance": 85,
            }),
        ))
        .await;
    let knowledge_id = stored.result.unwrap()["knowledge_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Unrelated noise in the corpus.
    for (title, content) in [
        ("tokio tuning", "worker threads and the blocking pool"),
        ("release ritual", "tag the build then push artifacts"),
    ] {
        server
            .handle(request(
                "store_knowledge",
                json!({
                    "knowledge_type": "procedural",
                    "category": "ops",
                    "title": title,
                    "content": content,
                }),
            ))
            .await;
    }

    let found = server
        .handle(request(
            "search_similar_knowledge",
            json!({ "query": "absolute path configuration" }),
        ))
        .await;
    let result = found.result.unwrap();
    let hits = result["results"].as_array().unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0]["knowledge_id"].as_str().unwrap(), knowledge_id);
    assert!(hits[0]["score"].as_f64().unwrap() > 0.0);
    assert_eq!(result["degraded"], false);
}

#[tokio::test]
async fn embedding_provider_offline_degrades_to_lexical() {
    // Nothing listens on the discard port; every embed call degrades.
    let offline = EngramConfig {
        embedding_dimension: 32,
        embedding_endpoint: Some("http://127.0.0.1:9/embed".to_string()),
        embedding_timeout_ms: 200,
        ..EngramConfig::default()
    };
    let (server, _services) = server_with(&offline);

    server
        .handle(request(
            "store_knowledge",
            json!({
                "knowledge_type": "technical",
                "category": "networking",
                "title": "proxy strips trailing slash",
                "content": "The proxy rewrites URLs and strips the trailing slash",
            }),
        ))
        .await;

    let found = server
        .handle(request(
            "search_similar_knowledge",
            json!({ "query": "proxy trailing slash" }),
        ))
        .await;

    // Results still arrive via the lexical path, flagged degraded; no
    // DependencyUnavailable error is surfaced.
    let result = found.result.expect("degraded search must not error");
    assert_eq!(result["degraded"], true);
    assert_eq!(result["mode"], "lexical");
    let hits = result["results"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn on_disk_store_survives_reopen_and_rebuilds_index() {
    let dir = TempDir::new().unwrap();
    let config = EngramConfig {
        embedding_dimension: 32,
        data_dir: dir.path().to_path_buf(),
        database_path: dir.path().join("engram.db"),
        ..EngramConfig::default()
    };

    let embedding: Vec<f32> = {
        let raw: Vec<f32> = (0..32).map(|i| (i as f32).sin()).collect();
        let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        raw.into_iter().map(|x| x / norm).collect()
    };

    let item_id = {
        let store = Store::open(&config).unwrap();
        let mut item = KnowledgeItem::new(
            KnowledgeType::Technical,
            "persistence",
            "WAL survives restarts",
            "Rows written before shutdown come back on reopen",
        );
        item.embedding = Some(embedding.clone());
        store.put_knowledge(&item).unwrap()
    };

    // Fresh process: rows survive and the vector index is rebuilt from
    // the stored blobs.
    let store = Store::open(&config).unwrap();
    let fetched = store.get_knowledge(item_id).unwrap();
    assert_eq!(fetched.title, "WAL survives restarts");
    assert_eq!(fetched.embedding.as_deref(), Some(embedding.as_slice()));

    let hits = store
        .vector_search(&embedding, 3, &SearchFilter::new(), 0.5)
        .unwrap();
    assert_eq!(hits[0].0.id, item_id);
    assert!(hits[0].1 > 0.99);

    let lexical = store
        .fulltext_search("survives restart", 3, &SearchFilter::new())
        .unwrap();
    assert_eq!(lexical[0].0.id, item_id);
}

#[tokio::test]
async fn supersession_hides_old_item_from_active_listing() {
    let config = config();
    let (_, services) = server_with(&config);
    let store = services.store();

    let old = engram::models::KnowledgeItem::new(
        KnowledgeType::Factual,
        "deploy",
        "deploys run from jenkins",
        "Use the jenkins job to deploy",
    );
    store.put_knowledge(&old).unwrap();

    let mut new = engram::models::KnowledgeItem::new(
        KnowledgeType::Factual,
        "deploy",
        "deploys run from actions",
        "Use the github actions workflow to deploy",
    );
    new.supersedes = vec![old.id];
    store.put_knowledge(&new).unwrap();

    let active = store.list_knowledge(&SearchFilter::new(), 20).unwrap();
    assert!(active.iter().any(|i| i.id == new.id));
    assert!(!active.iter().any(|i| i.id == old.id));

    // The old row is preserved, deactivated, and linked forward.
    let inactive = store
        .list_knowledge(&SearchFilter::new().include_inactive(), 20)
        .unwrap();
    let old_row = inactive.iter().find(|i| i.id == old.id).unwrap();
    assert!(!old_row.is_active);
    assert_eq!(old_row.superseded_by, Some(new.id));
}

#[tokio::test]
async fn technical_gotchas_filter_by_semantic_type() {
    let (server, _services) = server_with(&config());

    server
        .handle(request(
            "store_knowledge",
            json!({
                "knowledge_type": "technical",
                "category": "build",
                "title": "linker needs zstd",
                "content": "Linking fails unless libzstd headers are installed",
            }),
        ))
        .await;
    server
        .handle(request(
            "store_knowledge",
            json!({
                "knowledge_type": "contextual",
                "category": "build",
                "title": "build notes",
                "content": "General linking background without a discovery",
            }),
        ))
        .await;

    let found = server
        .handle(request(
            "get_technical_gotchas",
            json!({ "problem_signature": "linking fails zstd" }),
        ))
        .await;
    let result = found.result.unwrap();
    let hits = result["results"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["semantic_type"], "technical_discovery");
}

#[tokio::test]
async fn contextual_knowledge_uses_warmed_cache() {
    let (server, _services) = server_with(&config());

    server
        .handle(request(
            "start_session",
            json!({
                "project_context": { "name": "ctx-proj", "project_type": "software" }
            }),
        ))
        .await;

    server
        .handle(request(
            "store_knowledge",
            json!({
                "knowledge_type": "technical",
                "category": "ci",
                "title": "cache key includes lockfile",
                "content": "The CI cache key hashes the lockfile so stale deps never leak",
                "importance": 90,
                "project": "ctx-proj",
            }),
        ))
        .await;

    let first = server
        .handle(request(
            "get_contextual_knowledge",
            json!({ "situation": "ci cache behaving oddly", "project": "ctx-proj" }),
        ))
        .await;
    let first = first.result.unwrap();
    assert_eq!(first["cache_hit"], false);
    assert!(!first["items"].as_array().unwrap().is_empty());

    let second = server
        .handle(request(
            "get_contextual_knowledge",
            json!({ "situation": "CI   cache behaving ODDLY", "project": "ctx-proj" }),
        ))
        .await;
    let second = second.result.unwrap();
    // Same situation modulo case/whitespace: served by the warmed entry.
    assert_eq!(second["cache_hit"], true);
    assert_eq!(second["warm_id"], first["warm_id"]);
}

#[tokio::test]
async fn validation_roundtrip_over_pipe() {
    let config = config();
    let (server, services) = server_with(&config);

    let pattern = engram::models::Pattern::new(
        engram::models::PatternType::ProceduralSequence,
        "migrate then deploy",
        engram::models::PatternContent::Sequence {
            steps: vec!["run migrations".to_string(), "deploy".to_string()],
            preconditions: vec![],
            extra: serde_json::Map::new(),
        },
    );
    services.store().put_pattern(&pattern).unwrap();

    let response = server
        .handle(request(
            "record_validation",
            json!({
                "pattern_id": pattern.id.to_string(),
                "type": "usage_success",
                "result": true,
                "confidence": 0.8,
            }),
        ))
        .await;
    assert!(response.result.unwrap()["validation_id"].is_string());

    let fetched = services.store().get_pattern(pattern.id).unwrap();
    assert_eq!(
        fetched.validation_status,
        engram::models::ValidationStatus::Validated
    );
}
