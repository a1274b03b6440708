//! # Rebuild Benchmark
//!
//! Write-side cost of one refresh cycle: enumerate the store, fill the
//! staging generation, publish. This has to fit comfortably inside the
//! refresh interval (100 ms by default) at realistic populations.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Instant;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use farsight_core::{
    CacheConfig, DoubleBufferedSnapshots, EntityId, EntitySnapshot, MapId, MemoryStore, UpdateScheduler,
};
use farsight_shared::{DistanceMetric, Position};

fn world(entity_count: u64, maps: u32) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for i in 0..entity_count {
        let map = MapId((i % u64::from(maps)) as u32);
        let x = (i.wrapping_mul(2_654_435_761) % 8192) as f32;
        let y = (i.wrapping_mul(40_503) % 8192) as f32;
        let position = Position::new(x, y, 0.0);
        let snapshot = match i % 10 {
            0 => EntitySnapshot::interactable(EntityId(i), map, position, 1000 + i as u32),
            1 => EntitySnapshot::trigger(EntityId(i), map, position, 5.0),
            _ => EntitySnapshot::actor(EntityId(i), map, position),
        };
        store.upsert(snapshot);
    }
    store
}

/// Full tick: enumeration + insert + publish.
fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild_tick");

    for entity_count in [1_000u64, 10_000, 50_000] {
        let store = world(entity_count, 4);
        let buffers = DoubleBufferedSnapshots::new(64.0, DistanceMetric::Spatial);
        let scheduler = UpdateScheduler::new(buffers, store, CacheConfig::default());

        group.throughput(Throughput::Elements(entity_count));
        group.bench_with_input(BenchmarkId::from_parameter(entity_count), &entity_count, |b, _| {
            b.iter(|| {
                let outcome = scheduler.tick(Instant::now());
                assert!(outcome.is_published());
                black_box(outcome)
            });
        });
    }

    group.finish();
}

/// Grid cost alone, without the store's lock and conversion.
fn bench_staging_fill(c: &mut Criterion) {
    let snapshots: Vec<EntitySnapshot> = (0..50_000u64)
        .map(|i| {
            let x = (i.wrapping_mul(2_654_435_761) % 8192) as f32;
            EntitySnapshot::actor(EntityId(i), MapId(0), Position::new(x, (i % 8192) as f32, 0.0))
        })
        .collect();
    let buffers = DoubleBufferedSnapshots::new(64.0, DistanceMetric::Spatial);

    c.bench_function("rebuild_staging_fill_50k", |b| {
        b.iter(|| {
            let mut staging = buffers.begin_build().expect("no build in flight");
            for s in &snapshots {
                staging.insert(*s).expect("unique ids");
            }
            black_box(staging.publish(Instant::now()))
        });
    });
}

criterion_group!(benches, bench_tick, bench_staging_fill);
criterion_main!(benches);
