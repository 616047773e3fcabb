//! Review journeys: the spaced-repetition timeline for a mid-importance
//! record, and context-boosted ranking for due records.

use chrono::Duration;
use mnemon_core::{CreateInput, MemoryStore, SearchQuery};
use mnemon_e2e::harness::TestWorld;

fn input(content: &str) -> CreateInput {
    CreateInput {
        content: content.into(),
        ..Default::default()
    }
}

#[test]
fn review_timeline_for_mid_importance_record() {
    let mut world = TestWorld::new();
    let receipt = world
        .service
        .create_at(input("ownership moves by default"), world.now)
        .unwrap();
    let t0 = world.now;

    let record = world.warm.get_by_id(&receipt.id).unwrap();
    let easiness = record.review_state.as_ref().unwrap().easiness_factor;
    // Neutral salience lands importance near 0.53, easiness near 2.2
    assert!(easiness > 2.0 && easiness < 2.4);

    // Not due before the first day
    assert!(world.service.due_reviews_at(10, world.now).is_empty());

    // First review due at t = 1d
    world.advance(Duration::days(1));
    let due = world.service.due_reviews_at(10, world.now);
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].0.id, receipt.id);

    let reviewed = world.service.get_at(&receipt.id, world.now).unwrap();
    let state = reviewed.review_state.as_ref().unwrap();
    assert_eq!(state.review_count, 1);
    // Scheduling the second review floors the interval at six days
    assert_eq!(state.interval_days, 6.0);
    assert_eq!(state.next_review_at, t0 + Duration::days(7));

    // Second review due at t = 7d
    world.advance(Duration::days(6));
    assert_eq!(world.service.due_reviews_at(10, world.now).len(), 1);

    let reviewed = world.service.get_at(&receipt.id, world.now).unwrap();
    let state = reviewed.review_state.as_ref().unwrap();
    assert_eq!(state.review_count, 2);
    // Thereafter the interval grows by the easiness factor
    assert!((state.interval_days - 6.0 * easiness).abs() < 1e-9);
    assert!(state.next_review_at > t0 + Duration::days(19));
    assert!(state.next_review_at < t0 + Duration::days(22));
}

#[test]
fn review_counters_are_monotone() {
    let mut world = TestWorld::new();
    let receipt = world
        .service
        .create_at(input("borrow checker rules"), world.now)
        .unwrap();

    let mut last_count = 0;
    let mut last_interval = 0.0f64;
    for _ in 0..4 {
        world.advance(Duration::days(40));
        let record = world.service.get_at(&receipt.id, world.now).unwrap();
        let state = record.review_state.as_ref().unwrap();
        assert!(state.review_count > last_count);
        assert!(state.interval_days >= last_interval);
        last_count = state.review_count;
        last_interval = state.interval_days;
    }
}

#[test]
fn due_records_outrank_equally_relevant_neighbors() {
    let mut world = TestWorld::new();

    // Two records with identical embeddings; only one is overdue
    let content = "tokio select loops";
    let embedding = {
        use mnemon_core::EmbeddingProvider;
        mnemon_e2e::harness::HashEmbedder.embed(content)
    };

    let mut due = world.bare_record(content, mnemon_core::MemoryType::Semantic);
    due.importance = 0.4;
    due.strength = 0.4;
    due.embedding = Some(embedding.clone());
    due.review_state = Some(mnemon_core::ReviewState {
        interval_days: 1.0,
        easiness_factor: 2.0,
        next_review_at: world.now - Duration::days(10),
        review_count: 1,
    });

    let mut fresh = world.bare_record(content, mnemon_core::MemoryType::Semantic);
    fresh.importance = 0.4;
    fresh.strength = 1.0;
    fresh.embedding = Some(embedding);

    world.plant(mnemon_core::MemoryTier::Warm, &due);
    world.plant(mnemon_core::MemoryTier::Warm, &fresh);

    let response = world
        .service
        .search_at(SearchQuery::new(content, 5), world.now)
        .unwrap();
    assert_eq!(response.results.len(), 2);
    // The overdue record's boosted priority wins the importance leg
    assert_eq!(response.results[0].record.id, due.id);
    assert!(response.results[0].score > response.results[1].score);
}
