//! Block condition lists.
//!
//! Balancing scheme:
//! 1. `stop = round(n * (1 - go_ratio))`, `go = n - stop`.
//! 2. Directions are dealt round-robin, go labels first and stop labels
//!    continuing the same rotation, so every direction appears within one
//!    of every other both per kind and over the whole block.
//! 3. Go and stop labels are shuffled separately, then stop labels are
//!    dropped into the `go + 1` gaps around the go trials, each gap picked
//!    at random among those still below `max_stop_run`. This bounds runs
//!    of consecutive stop trials without rejection sampling. When a block
//!    has too few go trials to honour the bound, the gap capacity grows to
//!    the smallest value that fits.

use rand::Rng;
use rand::seq::SliceRandom;
use sst_core::{Direction, TrialKind, TrialLabel};

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionSequencer {
    pub go_ratio: f64,
    pub directions: Vec<Direction>,
    pub max_stop_run: usize,
}

impl ConditionSequencer {
    pub fn new(go_ratio: f64, directions: Vec<Direction>, max_stop_run: usize) -> Self {
        Self {
            go_ratio: go_ratio.clamp(0.0, 1.0),
            directions,
            max_stop_run: max_stop_run.max(1),
        }
    }

    /// Number of stop labels in a block of `block_size`.
    pub fn stop_count(&self, block_size: usize) -> usize {
        let stops = (block_size as f64 * (1.0 - self.go_ratio)).round() as usize;
        stops.min(block_size)
    }

    pub fn generate<R: Rng + ?Sized>(&self, block_size: usize, rng: &mut R) -> Vec<TrialLabel> {
        if block_size == 0 || self.directions.is_empty() {
            return Vec::new();
        }
        let n_stop = self.stop_count(block_size);
        let n_go = block_size - n_stop;

        let mut rotation = self.directions.iter().copied().cycle();
        let mut deal = |kind: TrialKind, count: usize| -> Vec<TrialLabel> {
            rotation
                .by_ref()
                .take(count)
                .map(|direction| TrialLabel::new(kind, direction))
                .collect()
        };
        let mut go = deal(TrialKind::Go, n_go);
        let mut stop = deal(TrialKind::Stop, n_stop);
        go.shuffle(rng);
        stop.shuffle(rng);

        let gaps = n_go + 1;
        let capacity = self.max_stop_run.max(n_stop.div_ceil(gaps));
        let mut fill = vec![0usize; gaps];
        for _ in 0..n_stop {
            let open: Vec<usize> = (0..gaps).filter(|g| fill[*g] < capacity).collect();
            let gap = open[rng.random_range(0..open.len())];
            fill[gap] += 1;
        }

        let mut stops = stop.into_iter();
        let mut labels = Vec::with_capacity(block_size);
        for (gap, count) in fill.iter().enumerate() {
            labels.extend(stops.by_ref().take(*count));
            if gap < n_go {
                labels.push(go[gap]);
            }
        }
        labels
    }
}

/// Generates one block's labels; see the module docs for the scheme.
pub fn generate<R: Rng + ?Sized>(
    block_size: usize,
    go_ratio: f64,
    directions: &[Direction],
    max_stop_run: usize,
    rng: &mut R,
) -> Vec<TrialLabel> {
    ConditionSequencer::new(go_ratio, directions.to_vec(), max_stop_run).generate(block_size, rng)
}

/// Longest run of consecutive stop labels.
pub fn longest_stop_run(labels: &[TrialLabel]) -> usize {
    let mut longest = 0;
    let mut run = 0;
    for label in labels {
        if label.is_stop() {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    longest
}
