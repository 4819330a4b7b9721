//! Tick loop benchmarks for skirmish_core.
//!
//! Run with: `cargo bench -p skirmish_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use skirmish_core::math::Footprint;
use skirmish_core::prelude::*;
use skirmish_test_utils::fixtures::sandbox_simulation;

/// A hall, a mine, `workers` gatherers and two skirmishing squads.
fn busy_simulation(workers: usize) -> Simulation {
    let (mut sim, types) = sandbox_simulation();
    let (world, ctx) = sim.parts_mut();
    let _hall = world
        .spawn_unit(ctx, types.hall, 0, TilePos::new(2, 2), 0)
        .expect("hall");
    let mine = world
        .spawn_unit(ctx, types.mine, 0, TilePos::new(12, 2), 0)
        .expect("mine");
    let camp = Footprint::new(TilePos::new(7, 7), 1, 1);
    let mut orders = Vec::new();
    for _ in 0..workers {
        let peasant = world
            .spawn_unit_near(ctx, types.peasant, 0, camp, 0)
            .expect("peasant");
        orders.push(Command::order(peasant, UnitCommand::Resource { source: mine }));
    }
    for i in 0..6 {
        let blue = world
            .spawn_unit(ctx, types.footman, 0, TilePos::new(4 + i, 20), 0)
            .expect("blue");
        let red = world
            .spawn_unit(ctx, types.footman, 1, TilePos::new(4 + i, 28), 0)
            .expect("red");
        orders.push(Command::order(
            blue,
            UnitCommand::Attack {
                target: Some(red),
                pos: TilePos::new(4 + i, 28),
                layer: 0,
            },
        ));
    }
    for command in orders {
        sim.send_command(command).expect("command accepted");
    }
    sim
}

/// Runs the tick loop over simulations of growing size.
pub fn simulation_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    for workers in [4, 16] {
        group.bench_with_input(BenchmarkId::new("gather", workers), &workers, |b, &n| {
            b.iter_batched(
                || busy_simulation(n),
                |mut sim| {
                    sim.run_ticks(100);
                    black_box(sim.sync_hash())
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();

    c.bench_function("state_hash", |b| {
        let mut sim = busy_simulation(16);
        sim.run_ticks(50);
        b.iter(|| black_box(sim.state_hash()));
    });
}

criterion_group!(benches, simulation_benchmark);
criterion_main!(benches);
