//! Criterion benchmarks for the park simulation core.
//!
//! - `tick`: one rules tick over a crowded park
//! - `checksum`: full-state checksum
//! - `snapshot`: capture and compare of entity snapshots
//! - `actions`: queue throughput through the dispatcher

use criterion::{Criterion, criterion_group, criterion_main};
use tycoon_core::action::ActionEnvelope;
use tycoon_core::context::SimulationContext;
use tycoon_core::dispatcher::{ActionQueue, NullSink};
use tycoon_core::id::{Coords3, EntityId};
use tycoon_core::simulation::{run_tick, spawn_guest};
use tycoon_core::snapshot::{SnapshotStore, compare};
use tycoon_core::test_utils::*;

// ===========================================================================
// Park builders
// ===========================================================================

/// A park with `guests` guests spread over a 64x64 tile grid.
fn crowded_park(guests: usize) -> SimulationContext {
    let mut ctx = SimulationContext::new(TEST_SEED, guests + 64);
    for i in 0..guests {
        let x = (i % 64) as i32 * 32;
        let y = (i / 64 % 64) as i32 * 32;
        spawn_guest(&mut ctx, Coords3::new(x, y, 16));
    }
    for _ in 0..5 {
        run_tick(&mut ctx);
        ctx.current_ticks += 1;
    }
    ctx
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    group.sample_size(50);

    let mut ctx = crowded_park(2000);
    group.bench_function("2000_guests", |b| {
        b.iter(|| {
            run_tick(&mut ctx);
            ctx.current_ticks += 1;
        });
    });

    group.finish();
}

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");
    let ctx = crowded_park(2000);
    group.bench_function("2000_guests", |b| {
        b.iter(|| ctx.checksum());
    });
    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");
    group.sample_size(30);

    let mut ctx = crowded_park(2000);
    group.bench_function("capture_2000_guests", |b| {
        let mut store = SnapshotStore::new(8);
        b.iter(|| store.capture_current(&ctx).map(|_| ()));
    });

    let mut store = SnapshotStore::new(2);
    let _ = store.capture_current(&ctx);
    run_tick(&mut ctx);
    ctx.current_ticks += 1;
    let _ = store.capture_current(&ctx);
    group.bench_function("compare_2000_guests", |b| {
        b.iter(|| match (store.get(0), store.get(1)) {
            (Some(base), Some(cmp)) => compare(base, cmp).ok(),
            _ => None,
        });
    });

    group.finish();
}

fn bench_actions(c: &mut Criterion) {
    let mut group = c.benchmark_group("actions");
    group.sample_size(30);

    group.bench_function("process_1000_moves", |b| {
        b.iter(|| {
            let mut ctx = test_context();
            let mut queue = ActionQueue::new();
            for i in 0..1000 {
                let env = ActionEnvelope::of(MoveEntity {
                    entity: EntityId(0),
                    x: i,
                    y: 0,
                    z: 0,
                });
                queue.enqueue(env, 0);
            }
            queue.process_queue(&mut ctx, &mut NullSink)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_tick, bench_checksum, bench_snapshot, bench_actions);
criterion_main!(benches);
