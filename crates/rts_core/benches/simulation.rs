//! Simulation benchmarks for rts_core.
//!
//! Run with: `cargo bench -p rts_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rts_core::commands::{Command, RawPoint};
use rts_core::data::ContentTables;
use rts_core::dispatch::dispatch;
use rts_core::setup::{create_match, MatchSetup};
use rts_core::simulation::{frame, tick};
use rts_core::state::Match;

fn four_player_match(content: &Arc<ContentTables>) -> Match {
    create_match(Arc::clone(content), &MatchSetup::new(1, 4, 42)).expect("4 players is valid")
}

/// Every player sends their whole army to the centre, so movement, steering
/// and combat all have work to do.
fn clash(m: &mut Match) {
    for player in 0..4u8 {
        let unit_ids = m.units.iter().filter(|u| u.owner == player).map(|u| u.id).collect();
        dispatch(
            m,
            player,
            &Command::AttackMove {
                unit_ids,
                target: RawPoint::new(50.0, 50.0),
                queue: false,
            },
        );
    }
}

/// Runs simulation benchmarks for the rts_core crate.
pub fn simulation_benchmark(c: &mut Criterion) {
    let content = Arc::new(ContentTables::standard().expect("bundled content parses"));

    c.bench_function("create_match_4p", |b| b.iter(|| black_box(four_player_match(&content))));

    c.bench_function("tick_4p_idle", |b| {
        b.iter_batched_ref(
            || four_player_match(&content),
            |m| tick(black_box(m)),
            BatchSize::SmallInput,
        );
    });

    c.bench_function("tick_4p_clash_100", |b| {
        b.iter_batched_ref(
            || {
                let mut m = four_player_match(&content);
                clash(&mut m);
                m
            },
            |m| {
                for _ in 0..100 {
                    tick(m);
                }
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("snapshot_4p", |b| {
        let mut m = four_player_match(&content);
        b.iter(|| black_box(frame(&mut m)));
    });
}

criterion_group!(benches, simulation_benchmark);
criterion_main!(benches);
