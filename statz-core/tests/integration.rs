//! Integration Tests: End-to-End Cache Flows
//!
//! These tests drive the public API the way a game server does: records are
//! built from the catalog, wrapped in an `EntityInfo`, pushed through the
//! `CacheStore`, and read back.

use std::sync::Arc;

use statz_core::cache::CacheStore;
use statz_core::catalog::SpecificationRegistry;
use statz_core::config::{CacheConfig, PersistenceConfig};
use statz_core::entity::EntityInfo;
use statz_core::error::StatzError;
use statz_core::persistence::{SqliteStore, StatStore};
use statz_core::specification::{FieldDef, FieldKind, MergePolicy, Specification, WORLD_FIELD};
use statz_core::types::{EntityId, Location, StatType, Value};

fn registry() -> SpecificationRegistry {
    SpecificationRegistry::with_defaults()
}

fn blocks_placed(reg: &SpecificationRegistry, world: &str, material: &str, count: i64) -> EntityInfo {
    EntityInfo::new().with_record(
        reg.build(
            &StatType::BlocksPlaced,
            [
                ("world", Value::Token(world.into())),
                ("material", Value::Token(material.into())),
                ("count", Value::Integer(count)),
            ],
        )
        .expect("record"),
    )
}

fn placed_count(cache: &CacheStore, id: EntityId, world: &str, material: &str) -> Option<i64> {
    let info = cache.get(id)?;
    let count = info
        .queries(&StatType::BlocksPlaced)
        .find(|q| {
            q.token("world").is_ok_and(|w| w == world)
                && q.token("material").is_ok_and(|m| m == material)
        })
        .map(|q| q.integer("count").expect("count"));
    count
}

// ---------------------------------------------------------------------------
// Worked example: two placements of the same block merge into one record
// ---------------------------------------------------------------------------

#[test]
fn blocks_placed_example_scenario() {
    let reg = registry();
    let cache = CacheStore::new();
    let player = EntityId::new();

    cache.add(player, blocks_placed(&reg, "A", "STONE", 3)).expect("add");
    cache.add(player, blocks_placed(&reg, "A", "STONE", 2)).expect("add");

    let info = cache.get(player).expect("cached");
    let records = info.records(&StatType::BlocksPlaced);
    assert_eq!(records.len(), 1);
    let q = records[0].query();
    assert_eq!(q.token("world").expect("world"), "A");
    assert_eq!(q.token("material").expect("material"), "STONE");
    assert_eq!(q.integer("count").expect("count"), 5);
}

// ---------------------------------------------------------------------------
// Lost-update regression: concurrent adds against one entity
// ---------------------------------------------------------------------------

#[test]
fn concurrent_adds_to_same_entity_are_all_counted() {
    const WORKERS: usize = 16;
    const ADDS: usize = 200;

    let reg = registry();
    let cache = CacheStore::with_config(&CacheConfig {
        shard_amount: 2,
        ..CacheConfig::default()
    })
    .expect("cache");
    let player = EntityId::new();

    std::thread::scope(|s| {
        for _ in 0..WORKERS {
            s.spawn(|| {
                for _ in 0..ADDS {
                    cache
                        .add(player, blocks_placed(&reg, "A", "STONE", 1))
                        .expect("add");
                }
            });
        }
    });

    assert_eq!(
        placed_count(&cache, player, "A", "STONE"),
        Some((WORKERS * ADDS) as i64)
    );
}

#[test]
fn concurrent_adds_across_entities_stay_separate() {
    let reg = registry();
    let cache = CacheStore::new();
    let players: Vec<EntityId> = (0..8).map(|_| EntityId::new()).collect();

    std::thread::scope(|s| {
        for (i, player) in players.iter().enumerate() {
            let reg = &reg;
            let cache = &cache;
            s.spawn(move || {
                for _ in 0..=i {
                    cache.add(*player, blocks_placed(reg, "A", "DIRT", 1)).expect("add");
                }
            });
        }
    });

    for (i, player) in players.iter().enumerate() {
        assert_eq!(placed_count(&cache, *player, "A", "DIRT"), Some(i as i64 + 1));
    }
    assert_eq!(cache.len(), players.len());
}

#[test]
fn readers_never_observe_partial_merges() {
    let reg = registry();
    let cache = CacheStore::new();
    let player = EntityId::new();
    cache.register(player, EntityInfo::new()).expect("register");

    std::thread::scope(|s| {
        s.spawn(|| {
            for _ in 0..500 {
                let mut info = blocks_placed(&reg, "A", "STONE", 1);
                info.insert(
                    reg.build(
                        &StatType::BlocksBroken,
                        [
                            ("world", Value::Token("A".into())),
                            ("material", Value::Token("STONE".into())),
                            ("count", Value::Integer(1)),
                        ],
                    )
                    .expect("record"),
                );
                cache.add(player, info).expect("add");
            }
        });
        s.spawn(|| {
            for _ in 0..500 {
                let snapshot = cache.get(player).expect("registered");
                let placed = snapshot.total(&StatType::BlocksPlaced, "count").expect("placed");
                let broken = snapshot.total(&StatType::BlocksBroken, "count").expect("broken");
                assert!((placed - broken).abs() < f64::EPSILON, "saw a half-applied add");
            }
        });
    });
}

// ---------------------------------------------------------------------------
// Merge policies through the cache
// ---------------------------------------------------------------------------

#[test]
fn replace_last_write_wins() {
    let reg = registry();
    let cache = CacheStore::new();
    let player = EntityId::new();
    let at = |x: f64| {
        EntityInfo::new().with_record(
            reg.build(
                &StatType::LastLocation,
                [("location", Value::Location(Location::new("A", x, 64.0, 0.0)))],
            )
            .expect("record"),
        )
    };

    cache.add(player, at(1.0)).expect("add");
    cache.add(player, at(2.0)).expect("add");

    let info = cache.get(player).expect("cached");
    let records = info.records(&StatType::LastLocation);
    assert_eq!(records.len(), 1);
    let location = records[0].query().location("location").expect("location").clone();
    assert_eq!(location, Location::new("A", 2.0, 64.0, 0.0));
}

#[test]
fn append_never_collapses() {
    let reg = registry();
    let cache = CacheStore::new();
    let player = EntityId::new();
    let death = EntityInfo::new().with_record(
        reg.build(
            &StatType::Deaths,
            [
                ("world", Value::Token("A".into())),
                ("cause", Value::Text("creeper".into())),
            ],
        )
        .expect("record"),
    );

    cache.add(player, death.clone()).expect("add");
    cache.add(player, death).expect("add");

    assert_eq!(cache.get(player).expect("cached").records(&StatType::Deaths).len(), 2);
}

#[test]
fn world_ignored_without_world_support() {
    let mut reg = registry();
    let stat = StatType::Custom("CHAT_MESSAGES".into());
    reg.register(
        Specification::new(
            stat.clone(),
            MergePolicy::Cumulative,
            vec![
                FieldDef::new(WORLD_FIELD, FieldKind::Token),
                FieldDef::new("channel", FieldKind::Token),
            ],
            vec![FieldDef::new("count", FieldKind::Integer)],
            vec![],
            false,
        )
        .expect("valid spec"),
    );
    let chat = |world: &str| {
        EntityInfo::new().with_record(
            reg.build(
                &stat,
                [
                    ("world", Value::Token(world.into())),
                    ("channel", Value::Token("global".into())),
                    ("count", Value::Integer(1)),
                ],
            )
            .expect("record"),
        )
    };

    let cache = CacheStore::new();
    let player = EntityId::new();
    cache.add(player, chat("A")).expect("add");
    cache.add(player, chat("B")).expect("add");

    let info = cache.get(player).expect("cached");
    let records = info.records(&stat);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].query().integer("count").expect("count"), 2);
}

#[test]
fn world_separates_records_with_world_support() {
    let reg = registry();
    let cache = CacheStore::new();
    let player = EntityId::new();

    cache.add(player, blocks_placed(&reg, "A", "STONE", 1)).expect("add");
    cache.add(player, blocks_placed(&reg, "B", "STONE", 1)).expect("add");

    assert_eq!(placed_count(&cache, player, "A", "STONE"), Some(1));
    assert_eq!(placed_count(&cache, player, "B", "STONE"), Some(1));
}

// ---------------------------------------------------------------------------
// register / get contract
// ---------------------------------------------------------------------------

#[test]
fn register_then_get_returns_exactly_the_registered_value() {
    let reg = registry();
    let cache = CacheStore::new();
    let player = EntityId::new();
    cache.add(player, blocks_placed(&reg, "A", "STONE", 40)).expect("add");

    let fresh = blocks_placed(&reg, "Z", "GLASS", 1);
    cache.register(player, fresh.clone()).expect("register");

    assert_eq!(*cache.get(player).expect("cached"), fresh);
}

#[test]
fn failed_calls_leave_the_cache_usable() {
    let reg = registry();
    let cache = CacheStore::new();
    let player = EntityId::new();

    assert!(matches!(cache.add(player, None), Err(StatzError::NullData)));
    assert!(cache.get(player).is_none());

    let malformed = reg.build(&StatType::BlocksPlaced, [("world", Value::Token("A".into()))]);
    assert!(matches!(malformed, Err(StatzError::MalformedRecord { .. })));

    cache.add(player, blocks_placed(&reg, "A", "STONE", 1)).expect("add");
    assert_eq!(placed_count(&cache, player, "A", "STONE"), Some(1));
}

// ---------------------------------------------------------------------------
// Storage round-trip: load → register → add → save → load
// ---------------------------------------------------------------------------

#[test]
fn storage_round_trip_through_cache() {
    let reg = Arc::new(registry());
    let store = SqliteStore::open_in_memory(&PersistenceConfig::default(), Arc::clone(&reg))
        .expect("store");
    let cache = CacheStore::new();
    let player = EntityId::new();

    store.save(player, &blocks_placed(&reg, "A", "STONE", 10)).expect("seed");
    let loaded = store.load(player).expect("load").expect("found");
    cache.register(player, loaded).expect("register");
    assert!(cache.take_dirty().is_empty());

    cache.add(player, blocks_placed(&reg, "A", "STONE", 5)).expect("add");
    for id in cache.take_dirty() {
        let snapshot = cache.get(id).expect("cached");
        store.save(id, &snapshot).expect("save");
    }

    let reloaded = store.load(player).expect("load").expect("found");
    assert_eq!(
        reloaded.records(&StatType::BlocksPlaced)[0].query().integer("count").expect("count"),
        15
    );
}
