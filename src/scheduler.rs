//! Distribution of seeds over a fixed pool of workers.
//!
//! Seeds are split into contiguous disjoint partitions, one per worker. Each
//! worker runs its seeds in order into private tallies and the tallies are
//! merged once at the end, so no accumulator is ever shared.

use crate::error::{Result, TractographyError};
use crate::fast_rng::FastRng;
use crate::filter::{RunResult, SeedPropagator};
use crate::geometry::ImageGeometry;
use crate::seed::Seed;
use crate::tally::Tallies;
use log::{debug, info};
use rayon::prelude::*;
use std::ops::Range;

/// Split `count` items into at most `workers` contiguous ranges.
///
/// The ranges are disjoint, cover `0..count` in order and their lengths
/// differ by at most one.
pub fn partition(count: usize, workers: usize) -> Vec<Range<usize>> {
    if count == 0 {
        return Vec::new();
    }
    let parts = workers.clamp(1, count);
    let base = count / parts;
    let extra = count % parts;
    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for i in 0..parts {
        let len = base + usize::from(i < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}

/// Runs seeds in parallel with reproducible per-seed random streams.
pub struct SeedScheduler {
    pool: rayon::ThreadPool,
    global_seed: u64,
}

impl SeedScheduler {
    /// Pool of `threads` workers; 0 picks the rayon default.
    pub fn new(threads: usize, global_seed: u64) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("fibertrack-worker-{}", i))
            .build()
            .map_err(|e| TractographyError::ThreadPool(e.to_string()))?;
        Ok(Self { pool, global_seed })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn propagate<P>(&self, propagator: &P, seed: &Seed) -> RunResult
    where
        P: SeedPropagator + ?Sized,
    {
        let mut rng = FastRng::for_run(self.global_seed, seed.index);
        let result = propagator.propagate_seed(seed, &mut rng);
        if result.is_empty() {
            debug!(
                "Seed {} (label {}): no fiber, {:?}",
                seed.index, seed.label, result.state
            );
        }
        result
    }

    /// Track every seed and merge the results into per-label tallies.
    pub fn run<P>(&self, propagator: &P, seeds: &[Seed], domain: &ImageGeometry) -> Tallies
    where
        P: SeedPropagator + ?Sized,
    {
        let partitions = partition(seeds.len(), self.workers());
        info!(
            "Tracking {} seeds in {} partitions",
            seeds.len(),
            partitions.len()
        );
        self.pool.install(|| {
            partitions
                .par_iter()
                .map(|range| {
                    let mut tallies = Tallies::new(domain.clone());
                    for seed in &seeds[range.clone()] {
                        tallies.record(&self.propagate(propagator, seed));
                    }
                    tallies
                })
                .reduce(|| Tallies::new(domain.clone()), Tallies::merge)
        })
    }

    /// Track every seed and return the individual results in seed order.
    pub fn run_batch<P>(&self, propagator: &P, seeds: &[Seed]) -> Vec<RunResult>
    where
        P: SeedPropagator + ?Sized,
    {
        let partitions = partition(seeds.len(), self.workers());
        let chunks: Vec<Vec<RunResult>> = self.pool.install(|| {
            partitions
                .par_iter()
                .map(|range| {
                    seeds[range.clone()]
                        .iter()
                        .map(|seed| self.propagate(propagator, seed))
                        .collect()
                })
                .collect()
        });
        chunks.into_iter().flatten().collect()
    }
}
