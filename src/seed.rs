use crate::settings::Settings;
use crate::volume::{LabelVolume, Mask};
use log::debug;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Starting point of one filter run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    /// Position in the seed list; also selects the run's random stream
    pub index: usize,
    pub label: u16,
    pub position: Point3<f64>,
}

impl Seed {
    pub fn new(index: usize, label: u16, position: Point3<f64>) -> Self {
        Self {
            index,
            label,
            position,
        }
    }
}

/// Seeds for every labeled voxel, in voxel order.
///
/// Voxels whose label is not selected by the settings, or whose centre falls
/// outside the mask, are skipped.
pub fn enumerate_seeds(labels: &LabelVolume, mask: &Mask, settings: &Settings) -> Vec<Seed> {
    let mut seeds = Vec::new();
    let mut outside = 0usize;
    for (label, position) in labels.labeled_points() {
        if !settings.seeds_label(label) {
            continue;
        }
        if !mask.contains(&position) {
            debug!("Skipping seed of label {} at {:?}: outside the mask", label, position);
            outside += 1;
            continue;
        }
        seeds.push(Seed::new(seeds.len(), label, position));
    }
    if outside > 0 {
        debug!("{} seeds skipped outside the mask", outside);
    }
    seeds
}
