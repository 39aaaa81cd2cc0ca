use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;
use sst_core::Direction;
use sst_experiment::ConditionSequencer;

pub fn bench_sequencer(c: &mut Criterion) {
    let mut g = c.benchmark_group("sequencer");
    g.sample_size(60);
    let seq = ConditionSequencer::new(0.75, Direction::ALL.to_vec(), 3);

    for n in [40usize, 200, 1_000] {
        g.bench_function(format!("block_{n}"), |b| {
            let mut rng = StdRng::seed_from_u64(9);
            b.iter(|| seq.generate(black_box(n), &mut rng))
        });
    }

    // Few go trials: every gap fills up to the run bound
    let dense = ConditionSequencer::new(0.25, Direction::ALL.to_vec(), 3);
    g.bench_function("stop_heavy_200", |b| {
        let mut rng = StdRng::seed_from_u64(9);
        b.iter(|| dense.generate(black_box(200), &mut rng))
    });

    g.finish();
}

criterion_group!(benches, bench_sequencer);
criterion_main!(benches);
