//! Promotion journeys: cold → warm on access/relevance pressure, then
//! warm → hot under a hot-enough 24h window.

use chrono::Duration;
use mnemon_core::{EmbeddingProvider, MemoryStore, MemoryTier, MemoryType, SearchQuery};
use mnemon_e2e::harness::{HashEmbedder, TestWorld};

#[test]
fn busy_cold_record_climbs_to_warm_then_hot() {
    let mut world = TestWorld::new();

    // A cold record accessed four times in the last week
    let content = "kubernetes upgrade runbook";
    let mut record = world.bare_record(content, MemoryType::Procedural);
    record.importance = 0.5;
    record.strength = 0.9;
    record.created_at = world.now - Duration::days(30);
    record.embedding = Some(HashEmbedder.embed(content));
    for day in 1..=4 {
        record.record_access(world.now - Duration::days(day));
    }
    world.plant(MemoryTier::Cold, &record);

    // A context query lands squarely on it
    let response = world
        .service
        .search_at(SearchQuery::new(content, 5), world.now)
        .unwrap();
    assert!(!response.results.is_empty());
    assert_eq!(response.results[0].record.id, record.id);
    assert!(response.results[0].relevance >= 0.8);

    // Next cycle: cold → warm
    world.advance(Duration::minutes(10));
    let report = world.cycle();
    assert!(report.placement.moved >= 1);
    let warm_copy = world.warm.get_by_id(&record.id).unwrap();
    assert_eq!(warm_copy.tier, MemoryTier::Warm);
    assert!(world.cold.get_by_id(&record.id).is_err());

    // Five accesses inside 24h with strength high from reinforcement
    for _ in 0..5 {
        world.advance(Duration::hours(1));
        let fetched = world.service.get_at(&record.id, world.now).unwrap();
        assert!(fetched.strength >= 0.6);
    }

    // Next cycle: warm → hot
    let report = world.cycle();
    assert!(report.placement.moved >= 1);
    let hot_copy = world.hot.get_by_id(&record.id).unwrap();
    assert_eq!(hot_copy.tier, MemoryTier::Hot);
    assert!(world.warm.get_by_id(&record.id).is_err());
}

#[test]
fn quiet_cold_record_stays_cold() {
    let mut world = TestWorld::new();

    let mut record = world.bare_record("dusty meeting notes", MemoryType::Episodic);
    record.importance = 0.5;
    record.created_at = world.now - Duration::days(60);
    world.plant(MemoryTier::Cold, &record);

    world.advance(Duration::hours(1));
    world.cycle();
    assert!(world.cold.get_by_id(&record.id).is_ok());
    assert!(world.warm.get_by_id(&record.id).is_err());
}

#[test]
fn heavily_accessed_cold_hit_queues_promotion_review() {
    let mut world = TestWorld::new();

    let mut record = world.bare_record("reference sheet", MemoryType::Semantic);
    record.importance = 0.5;
    // Just under the threshold; the get itself crosses it
    record.access_count = 9;
    world.plant(MemoryTier::Cold, &record);

    world.service.get_at(&record.id, world.now).unwrap();
    assert_eq!(world.service.placement_queue_len(), 1);

    // The queued review happens on the next cycle, not on the read path
    world.advance(Duration::minutes(5));
    world.cycle();
    assert_eq!(world.service.placement_queue_len(), 0);
}
