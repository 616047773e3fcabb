//! Search journeys: merge ranking, deadlines, and partial responses.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use mnemon_core::config::CoreConfig;
use mnemon_core::{
    CreateInput, MemStore, MemoryService, MemoryType, SalienceSignals, SearchQuery,
};
use mnemon_e2e::harness::{HashEmbedder, TestWorld, DIM};
use mnemon_e2e::mocks::SlowStore;

#[test]
fn merge_ranks_by_relevance_and_importance() {
    let world = TestWorld::new();

    // Same topic, very different importance
    // High salience, but shy of the hot threshold so both stay warm
    let vivid = CreateInput {
        content: "tracing spans and subscriber layers".into(),
        memory_type: MemoryType::Semantic,
        salience: Some(SalienceSignals {
            emotional: 8.0,
            novelty: 8.0,
            actionable: 8.0,
            personal: 8.0,
        }),
        ..Default::default()
    };
    let bland = CreateInput {
        content: "tracing spans and subscriber layers again".into(),
        memory_type: MemoryType::Semantic,
        salience: Some(SalienceSignals {
            emotional: 1.0,
            novelty: 1.0,
            actionable: 1.0,
            personal: 1.0,
        }),
        ..Default::default()
    };
    let important = world.service.create_at(vivid, world.now).unwrap();
    let _ = world.service.create_at(bland, world.now).unwrap();

    let response = world
        .service
        .search_at(
            SearchQuery::new("tracing spans and subscriber layers", 10),
            world.now,
        )
        .unwrap();
    assert!(response.results.len() >= 2);
    assert_eq!(response.results[0].record.id, important.id);
}

#[test]
fn session_scope_pulls_in_hot_records() {
    let world = TestWorld::new();
    let scratch = CreateInput {
        content: "scratchpad for the current session".into(),
        memory_type: MemoryType::Working,
        ..Default::default()
    };
    let receipt = world.service.create_at(scratch, world.now).unwrap();

    let without = world
        .service
        .search_at(SearchQuery::new("scratchpad session", 10), world.now)
        .unwrap();
    assert!(without.results.iter().all(|h| h.record.id != receipt.id));

    let mut query = SearchQuery::new("scratchpad session", 10);
    query.session_scope = true;
    let with = world.service.search_at(query, world.now).unwrap();
    assert!(with.results.iter().any(|h| h.record.id == receipt.id));
}

#[test]
fn slow_cold_tier_times_out_into_partial_results() {
    let hot = Arc::new(MemStore::hot());
    let warm = Arc::new(MemStore::warm());
    let cold = Arc::new(SlowStore::new(
        Arc::new(MemStore::cold()),
        StdDuration::from_millis(500),
    ));
    let dir = tempfile::tempdir().unwrap();

    let service = MemoryService::builder()
        .config(CoreConfig {
            embedding_dim: DIM,
            overflow_path: Some(dir.path().join("overflow.ndjson")),
            ..Default::default()
        })
        .hot(hot)
        .warm(warm)
        .cold(cold)
        .embedder(Arc::new(HashEmbedder))
        .build()
        .unwrap();

    let receipt = service
        .create(CreateInput {
            content: "latency sensitive lookup".into(),
            ..Default::default()
        })
        .unwrap();

    let mut query = SearchQuery::new("latency sensitive lookup", 10);
    query.deadline = Some(StdDuration::from_millis(100));
    let response = service.search(query).unwrap();

    // Warm answered in time; cold did not, so the response is partial
    assert!(response.partial);
    assert!(response.results.iter().any(|h| h.record.id == receipt.id));
}

#[test]
fn filters_narrow_results_by_type_and_importance() {
    let world = TestWorld::new();
    world
        .service
        .create_at(
            CreateInput {
                content: "async cancellation semantics".into(),
                memory_type: MemoryType::Semantic,
                ..Default::default()
            },
            world.now,
        )
        .unwrap();
    world
        .service
        .create_at(
            CreateInput {
                content: "async cancellation war story".into(),
                memory_type: MemoryType::Episodic,
                ..Default::default()
            },
            world.now,
        )
        .unwrap();

    let mut query = SearchQuery::new("async cancellation", 10);
    query.memory_type = Some(MemoryType::Episodic);
    let response = world.service.search_at(query, world.now).unwrap();
    assert!(!response.results.is_empty());
    assert!(response
        .results
        .iter()
        .all(|h| h.record.memory_type == MemoryType::Episodic));

    let mut query = SearchQuery::new("async cancellation", 10);
    query.min_importance = Some(0.99);
    let response = world.service.search_at(query, world.now).unwrap();
    assert!(response.results.is_empty());
}
