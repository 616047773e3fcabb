//! Overflow journeys: total tier failure never loses a write.

use chrono::Duration;
use mnemon_core::{CreateInput, Durability, MemoryStore, MemoryTier};
use mnemon_e2e::harness::TestWorld;

fn input(content: &str) -> CreateInput {
    CreateInput {
        content: content.into(),
        ..Default::default()
    }
}

#[test]
fn create_survives_total_tier_failure_and_drains_on_recovery() {
    let mut world = TestWorld::new();
    world.hot.set_available(false);
    world.warm.set_available(false);
    world.cold.set_available(false);

    // Write succeeds with pending durability and one queued line
    let receipt = world
        .service
        .create_at(input("hard-won insight"), world.now)
        .unwrap();
    assert_eq!(receipt.durability, Durability::Pending);
    assert_eq!(receipt.tier, None);

    let stats = world.service.stats_at(world.now).unwrap();
    assert_eq!(stats.overflow_depth, 1);

    // Unreachable until a tier accepts it
    assert!(world.service.get_at(&receipt.id, world.now).is_err());

    // Warm recovers; the next cycle drains oldest-first
    world.warm.set_available(true);
    world.advance(Duration::minutes(30));
    let report = world.cycle();
    assert_eq!(report.overflow_drained, 1);

    let stats = world.service.stats_at(world.now).unwrap();
    assert_eq!(stats.overflow_depth, 0);

    let record = world.service.get_at(&receipt.id, world.now).unwrap();
    assert_eq!(record.content, "hard-won insight");
    assert_eq!(record.tier, MemoryTier::Warm);
    assert!(world.warm.get_by_id(&receipt.id).is_ok());
}

#[test]
fn overflow_preserves_order_and_partial_recovery() {
    let mut world = TestWorld::new();
    world.hot.set_available(false);
    world.warm.set_available(false);
    world.cold.set_available(false);

    let first = world.service.create_at(input("first"), world.now).unwrap();
    let second = world.service.create_at(input("second"), world.now).unwrap();
    assert_eq!(world.service.stats_at(world.now).unwrap().overflow_depth, 2);

    world.warm.set_available(true);
    world.advance(Duration::minutes(5));
    let report = world.cycle();
    assert_eq!(report.overflow_drained, 2);

    assert!(world.service.get_at(&first.id, world.now).is_ok());
    assert!(world.service.get_at(&second.id, world.now).is_ok());

    // A second cycle has nothing left to drain
    world.advance(Duration::minutes(5));
    assert_eq!(world.cycle().overflow_drained, 0);
}

#[test]
fn single_tier_failure_does_not_overflow() {
    let world = TestWorld::new();
    world.warm.set_available(false);

    // Destined for warm, but hot is up and accepts the fallback
    let receipt = world
        .service
        .create_at(input("rerouted note"), world.now)
        .unwrap();
    assert_eq!(receipt.durability, Durability::Stored);
    assert!(receipt.tier.is_some());
    assert_ne!(receipt.tier, Some(MemoryTier::Warm));
    assert_eq!(world.service.stats_at(world.now).unwrap().overflow_depth, 0);
}
