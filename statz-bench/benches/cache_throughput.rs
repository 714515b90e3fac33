//! Statz Benchmark Suite
//!
//! Performance targets:
//!   merge_single_record_into_200 ...... < 20μs
//!   cache_add_hot_entity ............. < 25μs
//!   cache_add_contended_8_threads .... < 10ms per 8×500 adds
//!   record_event_block_place ......... < 50μs

use std::sync::Arc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use statz_core::cache::CacheStore;
use statz_core::catalog::SpecificationRegistry;
use statz_core::entity::EntityInfo;
use statz_core::suppression::SuppressionManager;
use statz_core::types::{EntityId, Location, StatType, Value};
use statz_server::hooks;
use statz_server::systems::{self, StatzContext};

const MATERIALS: [&str; 8] = [
    "STONE", "DIRT", "SAND", "GRAVEL", "OAK_LOG", "GLASS", "TORCH", "COBBLESTONE",
];

fn placed(registry: &SpecificationRegistry, world: &str, material: &str) -> EntityInfo {
    EntityInfo::new().with_record(
        registry
            .build(
                &StatType::BlocksPlaced,
                [
                    ("world", Value::Token(world.to_owned())),
                    ("material", Value::Token(material.to_owned())),
                    ("count", Value::Integer(1)),
                ],
            )
            .expect("record"),
    )
}

/// An aggregate with 200 distinct block-placed records.
fn large_aggregate(registry: &SpecificationRegistry) -> EntityInfo {
    let mut info = EntityInfo::new();
    for world in 0..25 {
        for material in MATERIALS {
            info = info.merge(&placed(registry, &format!("world_{world}"), material));
        }
    }
    info
}

/// Benchmark: merge one incoming record into a 200-record aggregate.
fn bench_merge(c: &mut Criterion) {
    let registry = SpecificationRegistry::with_defaults();
    let existing = large_aggregate(&registry);
    let incoming = placed(&registry, "world_24", "COBBLESTONE");

    c.bench_function("merge_single_record_into_200", |b| {
        b.iter(|| {
            let merged = black_box(&existing).merge(black_box(&incoming));
            black_box(merged);
        });
    });
}

/// Benchmark: repeated adds to one cached entity.
fn bench_cache_add(c: &mut Criterion) {
    let registry = SpecificationRegistry::with_defaults();
    let cache = CacheStore::new();
    let player = EntityId::new();
    cache
        .register(player, large_aggregate(&registry))
        .expect("register");
    let incoming = placed(&registry, "world_3", "STONE");

    c.bench_function("cache_add_hot_entity", |b| {
        b.iter_batched(
            || incoming.clone(),
            |info| cache.add(black_box(player), info).expect("add"),
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark: 8 threads hammering the same entity.
fn bench_contended_add(c: &mut Criterion) {
    let registry = SpecificationRegistry::with_defaults();
    let incoming = placed(&registry, "world", "STONE");

    c.bench_function("cache_add_contended_8_threads", |b| {
        b.iter(|| {
            let cache = CacheStore::new();
            let player = EntityId::new();
            std::thread::scope(|scope| {
                for _ in 0..8 {
                    scope.spawn(|| {
                        for _ in 0..500 {
                            cache.add(player, incoming.clone()).expect("add");
                        }
                    });
                }
            });
            black_box(cache.get(player));
        });
    });
}

/// Benchmark: full event path from hook to cache.
fn bench_record_event(c: &mut Criterion) {
    let context = StatzContext::new(
        Arc::new(SpecificationRegistry::with_defaults()),
        Arc::new(CacheStore::new()),
        Arc::new(SuppressionManager::default()),
    );
    let player = EntityId::new();
    let location = Location::new("world", 12.0, 64.0, -3.0);

    c.bench_function("record_event_block_place", |b| {
        b.iter(|| {
            let event = hooks::on_block_place(player, location.clone(), "stone");
            systems::record_event(black_box(&event), &context).expect("record");
        });
    });
}

criterion_group!(
    benches,
    bench_merge,
    bench_cache_add,
    bench_contended_add,
    bench_record_event,
);
criterion_main!(benches);
