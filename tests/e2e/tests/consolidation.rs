//! Consolidation journeys: near-duplicate rewriting and idempotency.

use chrono::Duration;
use mnemon_core::{
    renormalized_mean, CreateInput, MemoryStore, MemoryTier, MemoryType, RecordFilter,
};
use mnemon_e2e::harness::{TestWorld, DIM};

/// Unit vector at the given cosine to the first axis
fn at_cosine(cos: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[0] = cos;
    v[1] = (1.0 - cos * cos).sqrt();
    v
}

fn axis() -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[0] = 1.0;
    v
}

#[test]
fn near_duplicates_collapse_into_one_summary() {
    let mut world = TestWorld::new();

    let mut a = world.bare_record("user prefers dark mode", MemoryType::Episodic);
    a.importance = 0.2;
    a.embedding = Some(axis());

    let mut b = world.bare_record("user likes the dark theme", MemoryType::Episodic);
    b.importance = 0.25;
    b.embedding = Some(at_cosine(0.85));
    b.created_at = world.now + Duration::seconds(30);

    world.plant(MemoryTier::Warm, &a);
    world.plant(MemoryTier::Warm, &b);

    world.advance(Duration::hours(1));
    let report = world.cycle();
    let consolidation = report.consolidation.expect("consolidation ran");
    assert_eq!(consolidation.summaries_created, 1);
    assert_eq!(consolidation.members_deleted, 2);

    // Originals are gone
    assert!(world.warm.get_by_id(&a.id).is_err());
    assert!(world.warm.get_by_id(&b.id).is_err());

    // One summary survives, carrying max importance and the mean embedding
    let mut all = Vec::new();
    for tier in [MemoryTier::Hot, MemoryTier::Warm, MemoryTier::Cold] {
        all.extend(world.store(tier).list_by_filter(&RecordFilter::all()).unwrap());
    }
    assert_eq!(all.len(), 1);
    let summary = &all[0];
    assert!(summary.content.starts_with("summary["));
    assert!(summary.content.contains("dark mode"));
    assert!((summary.importance - 0.25).abs() < 1e-9);

    let ea = axis();
    let eb = at_cosine(0.85);
    let expected = renormalized_mean(&[ea.as_slice(), eb.as_slice()]).unwrap();
    let embedding = summary.embedding.as_ref().unwrap();
    for (got, want) in embedding.iter().zip(expected.iter()) {
        assert!((got - want).abs() < 1e-5);
    }
}

#[test]
fn consolidating_a_single_record_is_a_skip() {
    let mut world = TestWorld::new();
    let receipt = world
        .service
        .create_at(
            CreateInput {
                content: "singular fact about lifetimes".into(),
                memory_type: MemoryType::Semantic,
                ..Default::default()
            },
            world.now,
        )
        .unwrap();
    let before = world.warm.get_by_id(&receipt.id).unwrap();

    world.advance(Duration::minutes(5));
    let report = world.cycle();
    let consolidation = report.consolidation.expect("consolidation ran");
    assert_eq!(consolidation.skipped, consolidation.clusters);
    assert_eq!(consolidation.summaries_created, 0);

    let after = world.warm.get_by_id(&receipt.id).unwrap();
    assert_eq!(after.content, before.content);
    assert_eq!(after.embedding, before.embedding);
    assert_eq!(after.importance, before.importance);
}

#[test]
fn rerunning_consolidation_changes_nothing() {
    let mut world = TestWorld::new();
    for i in 0..2 {
        let mut r = world.bare_record(&format!("disposable note {i}"), MemoryType::Episodic);
        r.importance = 0.2;
        r.embedding = Some(axis());
        world.plant(MemoryTier::Warm, &r);
    }

    world.advance(Duration::hours(1));
    let first = world.cycle().consolidation.expect("first run");
    assert_eq!(first.summaries_created, 1);

    // Force a second consolidation a day later
    world.advance(Duration::days(1));
    let second = world.cycle().consolidation.expect("second run");
    assert_eq!(second.summaries_created, 0);
    assert_eq!(second.members_deleted, 0);
}
