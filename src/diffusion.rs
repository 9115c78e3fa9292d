//! Capabilities consumed from the diffusion modelling stage.
//!
//! Signal extraction and model fitting live outside this crate; tracking only
//! needs point queries. Implementations are shared read-only between worker
//! threads, hence the `Sync` bounds.

use crate::data::SPHERE_DIRECTIONS;
use crate::geometry::ImageGeometry;
use nalgebra::{Point3, Vector3};

/// Per-voxel orientation model (e.g. a spherical harmonics ODF).
pub trait DiffusionModel: Sync {
    /// Unnormalized directional density at `position` along unit `direction`. Never negative.
    fn orientation_value(&self, position: &Point3<f64>, direction: &Vector3<f64>) -> f64;

    /// Spread of the orientation density at `position`, in [0, 1].
    ///
    /// 0 means isotropic. The default scans the direction table and returns
    /// `(max - min) / max`.
    fn anisotropy(&self, position: &Point3<f64>) -> f64 {
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        for d in SPHERE_DIRECTIONS.iter() {
            let v = self.orientation_value(position, d).max(0.0);
            max = max.max(v);
            min = min.min(v);
        }
        if max > 0.0 {
            ((max - min) / max).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Direction of highest density at `position`, first maximum of the direction table.
    fn principal_direction(&self, position: &Point3<f64>) -> Vector3<f64> {
        let mut best = SPHERE_DIRECTIONS[0];
        let mut best_value = f64::NEG_INFINITY;
        for d in SPHERE_DIRECTIONS.iter() {
            let v = self.orientation_value(position, d);
            if v > best_value {
                best_value = v;
                best = *d;
            }
        }
        best
    }
}

/// Observed diffusion-weighted intensities at one position.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalProfile {
    /// One intensity per gradient direction
    pub intensities: Vec<f64>,
    /// Noise standard deviation
    pub sigma: f64,
}

/// Interpolated diffusion-weighted signal.
pub trait DiffusionSignal: Sync {
    /// Intensities and noise scale at `position`.
    fn interpolated_profile(&self, position: &Point3<f64>) -> SignalProfile;

    /// Unit gradient directions, in the order of the profile intensities.
    fn gradient_directions(&self) -> &[Vector3<f64>];

    /// Voxel grid of the signal; connectivity maps share it.
    fn domain(&self) -> &ImageGeometry;
}
