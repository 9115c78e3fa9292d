// Per-label accumulation of run results
//
// Workers fill private tallies which are merged once and finalized into
// normalized connectivity maps, ordered fiber bundles and run statistics.

use crate::error::Result;
use crate::filter::{RunResult, Termination, Visit};
use crate::geometry::ImageGeometry;
use crate::settings::CoordinateConvention;
use log::{debug, warn};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Accumulated visitation weight over the signal domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityMap {
    geometry: ImageGeometry,
    values: Vec<f64>,
}

impl ConnectivityMap {
    pub fn new(geometry: ImageGeometry) -> Self {
        let values = vec![0.0; geometry.len()];
        Self { geometry, values }
    }

    /// Add the weights of one run. Visits outside the grid are ignored.
    pub fn accumulate(&mut self, visits: &[Visit]) {
        for visit in visits {
            if let Some(value) = self.values.get_mut(visit.voxel) {
                *value += visit.weight;
            }
        }
    }

    /// Voxelwise sum with another map on the same grid.
    pub fn merge(&mut self, other: &ConnectivityMap) {
        debug_assert_eq!(self.geometry.size, other.geometry.size);
        for (value, added) in self.values.iter_mut().zip(&other.values) {
            *value += added;
        }
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Scale so the largest value is 1. An all-zero map is left as is.
    pub fn normalize(&mut self) {
        let max = self.max();
        if max > 0.0 {
            for value in &mut self.values {
                *value /= max;
            }
        }
    }

    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    /// Voxel values, x fastest.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of the voxel nearest to `point`, zero outside the grid.
    pub fn value_at(&self, point: &Point3<f64>) -> f64 {
        self.geometry
            .linear_index_of(point)
            .and_then(|i| self.values.get(i).copied())
            .unwrap_or(0.0)
    }
}

/// One reconstructed streamline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fiber {
    pub seed_index: usize,
    pub points: Vec<Point3<f64>>,
}

/// Streamlines of one seed label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FiberBundle {
    fibers: Vec<Fiber>,
}

impl FiberBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, seed_index: usize, points: Vec<Point3<f64>>) {
        self.fibers.push(Fiber { seed_index, points });
    }

    pub fn append(&mut self, other: &mut FiberBundle) {
        self.fibers.append(&mut other.fibers);
    }

    /// Order fibers by seed so output does not depend on scheduling.
    pub fn sort(&mut self) {
        self.fibers.sort_by_key(|f| f.seed_index);
    }

    pub fn fibers(&self) -> &[Fiber] {
        &self.fibers
    }

    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    /// Express every point in `convention`.
    pub fn convert(&mut self, convention: CoordinateConvention) {
        for fiber in &mut self.fibers {
            for point in &mut fiber.points {
                *point = convention.apply(point);
            }
        }
    }
}

/// Run counts for one seed label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelStatistics {
    pub label: u16,
    pub seeds: usize,
    pub fibers: usize,
    pub empty_runs: usize,
    pub terminations: BTreeMap<Termination, usize>,
    pub steps: usize,
    pub resamplings: usize,
}

impl LabelStatistics {
    pub fn new(label: u16) -> Self {
        Self {
            label,
            ..Self::default()
        }
    }

    pub fn record(&mut self, result: &RunResult) {
        self.seeds += 1;
        if result.is_empty() {
            self.empty_runs += 1;
        } else {
            self.fibers += 1;
        }
        if let Some(reason) = result.termination() {
            *self.terminations.entry(reason).or_insert(0) += 1;
        }
        self.steps += result.steps;
        self.resamplings += result.resamplings;
    }

    pub fn merge(&mut self, other: &LabelStatistics) {
        self.seeds += other.seeds;
        self.fibers += other.fibers;
        self.empty_runs += other.empty_runs;
        for (reason, count) in &other.terminations {
            *self.terminations.entry(*reason).or_insert(0) += count;
        }
        self.steps += other.steps;
        self.resamplings += other.resamplings;
    }

    /// Whether every seed of the label produced a fiber.
    pub fn is_complete(&self) -> bool {
        self.seeds > 0 && self.empty_runs == 0
    }

    pub fn mean_steps(&self) -> f64 {
        if self.seeds == 0 {
            0.0
        } else {
            self.steps as f64 / self.seeds as f64
        }
    }
}

impl fmt::Display for LabelStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Label {}:", self.label)?;
        writeln!(f, "  Seeds: {}", self.seeds)?;
        writeln!(f, "  Fibers: {}", self.fibers)?;
        writeln!(f, "  Empty runs: {}", self.empty_runs)?;
        writeln!(f, "  Mean steps per seed: {:.2}", self.mean_steps())?;
        writeln!(f, "  Resampling events: {}", self.resamplings)?;
        write!(f, "  Terminations: {:?}", self.terminations)
    }
}

/// Everything gathered for one label while runs are in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTally {
    pub connectivity: ConnectivityMap,
    pub bundle: FiberBundle,
    pub statistics: LabelStatistics,
}

impl LabelTally {
    pub fn new(label: u16, domain: ImageGeometry) -> Self {
        Self {
            connectivity: ConnectivityMap::new(domain),
            bundle: FiberBundle::new(),
            statistics: LabelStatistics::new(label),
        }
    }

    pub fn record(&mut self, result: &RunResult) {
        self.statistics.record(result);
        if result.is_empty() {
            return;
        }
        self.connectivity.accumulate(&result.visits);
        self.bundle.push(result.seed.index, result.trajectory.clone());
    }

    pub fn merge(&mut self, mut other: LabelTally) {
        self.connectivity.merge(&other.connectivity);
        self.bundle.append(&mut other.bundle);
        self.statistics.merge(&other.statistics);
    }
}

/// Per-label accumulators of a worker, or of the whole job once merged.
#[derive(Debug, Clone, PartialEq)]
pub struct Tallies {
    domain: ImageGeometry,
    labels: BTreeMap<u16, LabelTally>,
}

impl Tallies {
    pub fn new(domain: ImageGeometry) -> Self {
        Self {
            domain,
            labels: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, result: &RunResult) {
        let label = result.seed.label;
        let domain = &self.domain;
        self.labels
            .entry(label)
            .or_insert_with(|| LabelTally::new(label, domain.clone()))
            .record(result);
    }

    /// Fold another set of tallies into this one. Order does not matter.
    pub fn merge(mut self, other: Tallies) -> Tallies {
        for (label, tally) in other.labels {
            match self.labels.get_mut(&label) {
                Some(existing) => existing.merge(tally),
                None => {
                    self.labels.insert(label, tally);
                }
            }
        }
        self
    }

    pub fn get(&self, label: u16) -> Option<&LabelTally> {
        self.labels.get(&label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &u16> {
        self.labels.keys()
    }

    pub fn total_seeds(&self) -> usize {
        self.labels.values().map(|t| t.statistics.seeds).sum()
    }

    /// Normalize, order and gate the accumulated outputs.
    ///
    /// Labels without any fiber get neither a map nor a bundle. With
    /// `require_complete_bundles` a bundle is only kept when every seed of its
    /// label produced a fiber.
    pub fn finalize(
        self,
        convention: CoordinateConvention,
        require_complete_bundles: bool,
    ) -> TractographyOutput {
        let mut output = TractographyOutput::default();
        for (label, tally) in self.labels {
            let LabelTally {
                mut connectivity,
                mut bundle,
                statistics,
            } = tally;

            if statistics.fibers == 0 {
                warn!("Label {}: no fiber from {} seeds", label, statistics.seeds);
                output.statistics.insert(label, statistics);
                continue;
            }

            connectivity.normalize();
            output.connectivity.insert(label, connectivity);

            if require_complete_bundles && !statistics.is_complete() {
                debug!(
                    "Label {}: {} of {} seeds gave no fiber, bundle dropped",
                    label, statistics.empty_runs, statistics.seeds
                );
            } else {
                bundle.sort();
                bundle.convert(convention);
                output.bundles.insert(label, bundle);
            }
            output.statistics.insert(label, statistics);
        }
        output
    }
}

/// Final per-label products of a tractography job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TractographyOutput {
    pub connectivity: BTreeMap<u16, ConnectivityMap>,
    pub bundles: BTreeMap<u16, FiberBundle>,
    pub statistics: BTreeMap<u16, LabelStatistics>,
}

impl TractographyOutput {
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
