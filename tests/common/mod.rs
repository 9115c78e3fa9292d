// Shared fixtures for the integration tests: a spherical brain-like mask on a
// 25^3 grid with unit voxels, and straight-fiber phantoms inside it.
#![allow(dead_code)]

use fibertrack::phantom::{centered_geometry, gradient_table, StickModel, StickSignal};
use fibertrack::{ImageGeometry, LabelVolume, Mask, Seed, Settings};
use nalgebra::{Point3, Vector3};

pub const RADIUS: f64 = 10.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn domain() -> ImageGeometry {
    centered_geometry(12, 1.0)
}

pub fn sphere_mask() -> Mask {
    Mask::sphere(domain(), Point3::origin(), RADIUS)
}

/// Straight fibers along `axis` filling the whole domain.
pub fn stick_field(axis: Vector3<f64>) -> (StickModel, StickSignal) {
    let model = StickModel::axial(axis, 8.0);
    let signal = StickSignal::new(domain(), gradient_table(30), axis, 3.0, 0.2);
    (model, signal)
}

/// Label volume on the signal grid with the given `(label, voxel)` seeds.
pub fn labels(seeds: &[(u16, [usize; 3])]) -> LabelVolume {
    let geometry = domain();
    let mut data = vec![0u16; geometry.len()];
    for &(label, voxel) in seeds {
        data[geometry.linear_index(voxel)] = label;
    }
    LabelVolume::from_data(geometry, data).expect("label data matches the grid")
}

/// Two small seed regions on either side of the centre.
pub fn two_regions() -> LabelVolume {
    labels(&[
        (1, [12, 12, 12]),
        (1, [12, 13, 12]),
        (1, [13, 12, 12]),
        (2, [12, 12, 8]),
        (2, [12, 12, 16]),
    ])
}

pub fn seed(index: usize, position: Point3<f64>) -> Seed {
    Seed::new(index, 1, position)
}

/// Small, fast settings with unit steps. Two workers keep the merged sums
/// bit-identical between runs.
pub fn quick_settings() -> Settings {
    Settings {
        particles: 40,
        step_size: 1.0,
        max_steps: 40,
        seed: 1234,
        threads: 2,
        ..Settings::default()
    }
}
