//! Criterion benchmarks for grid-driven edge reconciliation.

use conduit_core::engine::Engine;
use conduit_core::test_utils::*;
use conduit_spatial::{ConnectorMask, GridLinker, GridPosition, Placement, SpatialIndex};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

/// A `side` x `side` field of four-way pipes, placed but not resolved.
fn build_field(side: i32) -> (Engine, SpatialIndex) {
    let mut engine = Engine::with_registry(test_registry());
    let mut index = SpatialIndex::new();
    let pipe = pipe_proto(&engine);
    for y in 0..side {
        for x in 0..side {
            let entity = engine.spawn_entity();
            engine.add_node(entity, pipe).unwrap();
            index
                .place(entity, Placement::new(GridPosition::new(x, y), ConnectorMask::ALL))
                .unwrap();
        }
    }
    (engine, index)
}

fn bench_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid");
    group.sample_size(20);

    group.bench_function("resolve_50x50_field", |b| {
        b.iter_batched(
            || build_field(50),
            |(mut engine, index)| engine.update(&GridLinker::new(&index)),
            BatchSize::LargeInput,
        );
    });

    group.bench_function("close_center_row_50x50", |b| {
        b.iter_batched(
            || {
                let (mut engine, mut index) = build_field(50);
                engine.update(&GridLinker::new(&index));
                for x in 0..50 {
                    let entity = index.entities_at(GridPosition::new(x, 25))[0];
                    index.set_open(entity, false).unwrap();
                    GridLinker::new(&index)
                        .queue_neighborhood(&mut engine, entity)
                        .unwrap();
                }
                (engine, index)
            },
            |(mut engine, index)| engine.update(&GridLinker::new(&index)),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_grid);
criterion_main!(benches);
