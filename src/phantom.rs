//! Synthetic diffusion fields for validating the tracker.
//!
//! These stand in for fitted models and measured images: a field with no
//! preferred direction, and a single straight fiber population.

use crate::data::fibonacci_hemisphere;
use crate::diffusion::{DiffusionModel, DiffusionSignal, SignalProfile};
use crate::geometry::ImageGeometry;
use nalgebra::{Point3, Vector3};

/// Gradient directions spread over the upper hemisphere.
pub fn gradient_table(n: usize) -> Vec<Vector3<f64>> {
    fibonacci_hemisphere(n)
}

/// Cubic grid of `2 * half_width + 1` voxels per axis centred on the origin.
pub fn centered_geometry(half_width: usize, spacing: f64) -> ImageGeometry {
    let size = 2 * half_width + 1;
    let origin = -(half_width as f64) * spacing;
    ImageGeometry::new([size; 3], [origin; 3], [spacing; 3])
}

/// Orientation model with the same value in every direction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UniformModel;

impl DiffusionModel for UniformModel {
    fn orientation_value(&self, _: &Point3<f64>, _: &Vector3<f64>) -> f64 {
        1.0
    }

    fn anisotropy(&self, _: &Point3<f64>) -> f64 {
        0.0
    }
}

/// Orientation model peaked along one axis everywhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StickModel {
    axis: Vector3<f64>,
    concentration: f64,
    antipodal: bool,
}

impl StickModel {
    /// Watson-like lobe pair: `exp(k ((d . a)^2 - 1))`, symmetric under `d -> -d`.
    pub fn axial(axis: Vector3<f64>, concentration: f64) -> Self {
        Self {
            axis: axis.normalize(),
            concentration,
            antipodal: true,
        }
    }

    /// Single lobe: `exp(k (d . a - 1))`. Useful where the sign of the
    /// principal direction matters.
    pub fn polar(axis: Vector3<f64>, concentration: f64) -> Self {
        Self {
            axis: axis.normalize(),
            concentration,
            antipodal: false,
        }
    }

    pub fn axis(&self) -> Vector3<f64> {
        self.axis
    }
}

impl DiffusionModel for StickModel {
    fn orientation_value(&self, _: &Point3<f64>, direction: &Vector3<f64>) -> f64 {
        let c = direction.dot(&self.axis);
        if self.antipodal {
            (self.concentration * (c * c - 1.0)).exp()
        } else {
            (self.concentration * (c - 1.0)).exp()
        }
    }
}

/// Same intensity along every gradient, everywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformSignal {
    domain: ImageGeometry,
    gradients: Vec<Vector3<f64>>,
    intensity: f64,
    sigma: f64,
}

impl UniformSignal {
    pub fn new(domain: ImageGeometry, gradients: Vec<Vector3<f64>>, intensity: f64, sigma: f64) -> Self {
        Self {
            domain,
            gradients,
            intensity,
            sigma,
        }
    }
}

impl DiffusionSignal for UniformSignal {
    fn interpolated_profile(&self, _: &Point3<f64>) -> SignalProfile {
        SignalProfile {
            intensities: vec![self.intensity; self.gradients.len()],
            sigma: self.sigma,
        }
    }

    fn gradient_directions(&self) -> &[Vector3<f64>] {
        &self.gradients
    }

    fn domain(&self) -> &ImageGeometry {
        &self.domain
    }
}

/// Noise-free signal of one straight fiber population: `exp(-b (g . e)^2)`.
#[derive(Debug, Clone, PartialEq)]
pub struct StickSignal {
    domain: ImageGeometry,
    gradients: Vec<Vector3<f64>>,
    intensities: Vec<f64>,
    sigma: f64,
}

impl StickSignal {
    pub fn new(
        domain: ImageGeometry,
        gradients: Vec<Vector3<f64>>,
        direction: Vector3<f64>,
        attenuation: f64,
        sigma: f64,
    ) -> Self {
        let direction = direction.normalize();
        let intensities = gradients
            .iter()
            .map(|g| {
                let c = g.dot(&direction);
                (-attenuation * c * c).exp()
            })
            .collect();
        Self {
            domain,
            gradients,
            intensities,
            sigma,
        }
    }
}

impl DiffusionSignal for StickSignal {
    fn interpolated_profile(&self, _: &Point3<f64>) -> SignalProfile {
        SignalProfile {
            intensities: self.intensities.clone(),
            sigma: self.sigma,
        }
    }

    fn gradient_directions(&self) -> &[Vector3<f64>] {
        &self.gradients
    }

    fn domain(&self) -> &ImageGeometry {
        &self.domain
    }
}
