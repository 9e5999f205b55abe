//! Hybrid search and analysis benchmarks.

use criterion::{Criterion, criterion_group, criterion_main};
use engram::analyzer::{RedirectionAnalyzer, Speaker, Turn};
use engram::config::EngramConfig;
use engram::models::{KnowledgeType, SearchFilter};
use engram::services::ServiceContainer;
use std::hint::black_box;

fn seeded_services(items: usize) -> ServiceContainer {
    let config = EngramConfig {
        embedding_dimension: 64,
        ..EngramConfig::default()
    };
    let services = ServiceContainer::open_in_memory(&config).unwrap();
    for i in 0..items {
        let mut item = engram::models::KnowledgeItem::new(
            KnowledgeType::Technical,
            "bench",
            format!("note {i} about subsystem {}", i % 13),
            format!("details for note {i}: component {} interacts with the scheduler", i % 7),
        );
        if let Some((vector, version)) = services.try_embed(&item.content) {
            item.embedding = Some(vector);
            item.embedding_version = Some(version);
        }
        services.store().put_knowledge(&item).unwrap();
    }
    services
}

fn bench_hybrid_search(c: &mut Criterion) {
    let services = seeded_services(500);
    c.bench_function("hybrid_search_500", |b| {
        b.iter(|| {
            let result = services
                .retrieval()
                .search(black_box("scheduler interaction note"), &SearchFilter::new(), 10)
                .unwrap();
            black_box(result.hits.len())
        });
    });
}

fn bench_redirection_analysis(c: &mut Criterion) {
    let analyzer = RedirectionAnalyzer::new();
    let turns: Vec<Turn> = (0..200)
        .map(|i| Turn {
            turn_index: i + 1,
            speaker: if i % 2 == 0 {
                Speaker::User
            } else {
                Speaker::Assistant
            },
            text: if i % 10 == 4 {
                "No, that's not what I asked for, do the other thing".to_string()
            } else {
                format!("turn {i} with ordinary content about the task")
            },
            timestamp: chrono::Utc::now(),
        })
        .collect();

    c.bench_function("analyze_200_turns", |b| {
        b.iter(|| black_box(analyzer.analyze(black_box(&turns))).redirection_count);
    });
}

criterion_group!(benches, bench_hybrid_search, bench_redirection_analysis);
criterion_main!(benches);
