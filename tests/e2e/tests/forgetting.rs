//! Forgetting journeys: never-forget protection and the
//! expire → grace → purge lifecycle.

use chrono::Duration;
use mnemon_core::{MemoryError, MemoryStore, MemoryTier, MemoryType, PrivacyMarkers};
use mnemon_e2e::harness::TestWorld;

#[test]
fn protected_record_survives_forgetting_but_may_go_cold() {
    let mut world = TestWorld::new();

    // Old, unimportant, PII-heavy - every aged rule would expire it
    let mut record = world.bare_record("owner's home address: 221 Baker Street", MemoryType::Episodic);
    record.importance = 0.1;
    record.strength = 0.5;
    record.created_at = world.now - Duration::days(400);
    record.privacy_markers = PrivacyMarkers {
        pii_score: 0.9,
        financial_score: 0.0,
    };
    record.tags.insert("protected".into());
    world.plant(MemoryTier::Warm, &record);

    let report = world.cycle();
    assert_eq!(report.forgetting.expired, 0);
    assert!(report.forgetting.protected >= 1);

    // Alive, but demoted: 400 days old with no recent access leaves warm
    let stored = world.cold.get_by_id(&record.id).unwrap();
    assert!(!stored.is_tombstone());
    assert_eq!(stored.tier, MemoryTier::Cold);

    // Still protected on subsequent cycles
    world.advance(Duration::days(1));
    let report = world.cycle();
    assert_eq!(report.forgetting.expired, 0);
    assert!(world.cold.get_by_id(&record.id).is_ok());
}

#[test]
fn expired_record_answers_privacy_expired_until_grace_elapses() {
    let mut world = TestWorld::new();

    let mut record = world.bare_record("ssn on file for onboarding", MemoryType::Episodic);
    record.importance = 0.5;
    record.created_at = world.now - Duration::days(40);
    record.privacy_markers = PrivacyMarkers {
        pii_score: 0.9,
        financial_score: 0.0,
    };
    world.plant(MemoryTier::Warm, &record);

    // Aged PII rule fires
    let report = world.cycle();
    assert_eq!(report.forgetting.expired, 1);

    // During grace: queryable by id only, answering PrivacyExpired
    assert!(matches!(
        world.service.get_at(&record.id, world.now),
        Err(MemoryError::PrivacyExpired(_))
    ));
    // Listings exclude the tombstone
    let stats = world.service.stats_at(world.now).unwrap();
    assert_eq!(stats.warm.records, 0);

    // Mid-grace cycle leaves the tombstone alone
    world.advance(Duration::days(3));
    let report = world.cycle();
    assert_eq!(report.forgetting.purged, 0);
    assert!(matches!(
        world.service.get_at(&record.id, world.now),
        Err(MemoryError::PrivacyExpired(_))
    ));

    // Grace elapses: purged, and the id is simply gone
    world.advance(Duration::days(5));
    let report = world.cycle();
    assert_eq!(report.forgetting.purged, 1);
    assert!(matches!(
        world.service.get_at(&record.id, world.now),
        Err(MemoryError::NotFound(_))
    ));
}

#[test]
fn high_risk_record_expires_immediately_regardless_of_age() {
    let world = TestWorld::new();

    let mut record = world.bare_record("fresh card dump", MemoryType::Episodic);
    record.importance = 0.5;
    record.privacy_markers = PrivacyMarkers {
        pii_score: 1.0,
        financial_score: 1.0,
    };
    world.plant(MemoryTier::Warm, &record);

    let report = world.cycle();
    assert_eq!(report.forgetting.expired, 1);
    assert!(world.warm.get_by_id(&record.id).unwrap().is_tombstone());
}
