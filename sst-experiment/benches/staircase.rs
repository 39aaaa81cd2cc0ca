use std::time::Duration;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use sst_core::Direction;
use sst_experiment::{Staircase, StaircaseController, StaircaseParams};

fn params() -> StaircaseParams {
    StaircaseParams {
        initial_ssd: Duration::from_millis(250),
        min_ssd: Duration::from_millis(50),
        max_ssd: Duration::from_millis(500),
        step: Duration::from_millis(50),
    }
}

// Alternating runs so the track keeps hitting both bounds
fn outcomes(n: usize) -> Vec<bool> {
    (0..n).map(|i| (i / 7) % 2 == 0).collect()
}

pub fn bench_staircase(c: &mut Criterion) {
    let mut g = c.benchmark_group("staircase");
    g.sample_size(60);
    let seq = outcomes(1_000);

    g.bench_function("shared_1k_updates", |b| {
        b.iter_batched(
            || Staircase::new(params()).unwrap(),
            |mut s| {
                for success in &seq {
                    s.update(black_box(*success));
                }
                s.get_ssd()
            },
            BatchSize::SmallInput,
        )
    });

    g.bench_function("per_direction_1k_updates", |b| {
        b.iter_batched(
            || StaircaseController::per_direction(params(), &Direction::ALL).unwrap(),
            |mut c| {
                for (i, success) in seq.iter().enumerate() {
                    let d = Direction::ALL[i % 2];
                    let _ = c.get_ssd_for(d);
                    c.update_for(d, black_box(*success));
                }
                c.total_outcomes()
            },
            BatchSize::SmallInput,
        )
    });

    g.finish();
}

criterion_group!(benches, bench_staircase);
criterion_main!(benches);
