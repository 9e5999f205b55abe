//! Context assembly and cache warming behavior across the service graph.

use engram::config::EngramConfig;
use engram::context::AssembleOptions;
use engram::models::{
    KnowledgeItem, KnowledgeType, Project, ProjectType, SemanticType, Session,
};
use engram::services::ServiceContainer;
use std::sync::Arc;

struct Fixture {
    services: Arc<ServiceContainer>,
    session: Session,
}

fn fixture(items: usize, content_chars: usize) -> Fixture {
    let config = EngramConfig {
        embedding_dimension: 32,
        ..EngramConfig::default()
    };
    let services = Arc::new(ServiceContainer::open_in_memory(&config).unwrap());

    let project = Project::new("assembly", ProjectType::Software);
    services.store().put_project(&project).unwrap();
    let session = Session::new("ext-assembly", project.id);
    services.store().put_session(&session).unwrap();

    for i in 0..items {
        let mut item = KnowledgeItem::new(
            KnowledgeType::Technical,
            "seed",
            format!("topic note {i}"),
            "y".repeat(content_chars),
        );
        item.project_id = Some(project.id);
        item.semantic_type = Some(SemanticType::TechnicalDiscovery);
        item.importance = 80.0;
        if let Some((vector, version)) = services.try_embed(&format!("topic note {i}")) {
            item.embedding = Some(vector);
            item.embedding_version = Some(version);
        }
        services.store().put_knowledge(&item).unwrap();
    }

    Fixture { services, session }
}

#[tokio::test]
async fn token_budget_bounds_selection() {
    // ~400 tokens per item (content of 1,600 chars).
    let f = fixture(30, 1_600);
    let payload = f
        .services
        .assembler()
        .assemble(
            f.session.id,
            "topic note",
            &AssembleOptions {
                budget_tokens: Some(2_000),
                ..AssembleOptions::default()
            },
        )
        .await
        .unwrap();

    assert!(!payload.items.is_empty());
    assert!(payload.total_tokens <= 2_000);
    let per_item = payload.items[0].tokens_est;
    assert_eq!(payload.items.len(), 2_000 / per_item);

    // Ranked non-increasing, every item attributed to a source.
    for pair in payload.items.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(payload.metrics.items_rejected_over_budget > 0);
}

#[tokio::test]
async fn concurrent_assembles_share_one_warm() {
    let f = fixture(10, 200);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let services = Arc::clone(&f.services);
        let session_id = f.session.id;
        handles.push(tokio::spawn(async move {
            services
                .assembler()
                .assemble(session_id, "identical situation", &AssembleOptions::default())
                .await
        }));
    }

    let mut warm_ids = std::collections::HashSet::new();
    for handle in handles {
        let payload = handle.await.unwrap().unwrap();
        warm_ids.insert(payload.warm_id);
    }
    assert_eq!(warm_ids.len(), 1, "single-flight: one warm execution");
}

#[tokio::test]
async fn larger_budget_extends_selection_prefix() {
    let f = fixture(15, 800);
    let assemble = |budget: usize| {
        let services = Arc::clone(&f.services);
        let session_id = f.session.id;
        async move {
            services
                .assembler()
                .assemble(
                    session_id,
                    "topic note",
                    &AssembleOptions {
                        budget_tokens: Some(budget),
                        ..AssembleOptions::default()
                    },
                )
                .await
                .unwrap()
        }
    };

    let small = assemble(1_200).await;
    let large = assemble(5_000).await;

    let small_ids: Vec<_> = small.items.iter().map(|i| i.id).collect();
    let large_ids: Vec<_> = large.items.iter().map(|i| i.id).collect();
    assert!(small_ids.len() <= large_ids.len());
    assert_eq!(&large_ids[..small_ids.len()], small_ids.as_slice());
}

#[tokio::test]
async fn warm_metrics_track_tier_fill() {
    let f = fixture(8, 200);
    let project = f
        .services
        .store()
        .get_project_by_name("assembly")
        .unwrap();

    let (packet, hit) = f
        .services
        .warmer()
        .warm(&project, "topic note warmup", 10, 8_192)
        .await
        .unwrap();
    assert!(!hit);
    assert!(!packet.metrics.tier_fill.is_empty());
    let total_filled: usize = packet.metrics.tier_fill.iter().map(|(_, n, _)| n).sum();
    assert_eq!(total_filled, packet.entries.len());
}
