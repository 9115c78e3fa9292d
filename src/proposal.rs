// Importance density for the next fiber direction

use crate::data::SPHERE_DIRECTIONS;
use crate::diffusion::DiffusionModel;
use crate::stats::AngularDistribution;
use nalgebra::{Point3, Vector3};
use rand::Rng;

/// Cones narrower than this collapse to straight continuation.
const MIN_ANGLE: f64 = 1e-9;

/// A drawn direction and its log density under the cone-truncated proposal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proposal {
    pub direction: Vector3<f64>,
    pub log_density: f64,
}

/// Importance density for the next direction.
///
/// The model is scanned inside the cone of half-angle `angle_threshold` around
/// the current direction; its best direction becomes the mean of a von
/// Mises-Fisher draw whose concentration grows with how peaked the model is in
/// that cone. Draws leaving the cone are rejected and redrawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProposalDensity {
    angle_threshold: f64,
    concentration: f64,
    max_trials: usize,
}

impl ProposalDensity {
    pub fn new(angle_threshold: f64, concentration: f64, max_trials: usize) -> Self {
        Self {
            angle_threshold,
            concentration,
            max_trials,
        }
    }

    pub fn angle_threshold(&self) -> f64 {
        self.angle_threshold
    }

    /// Concentration that keeps about half of the draws inside the cone.
    ///
    /// Zero for a cone covering the whole sphere.
    fn cone_concentration(&self) -> f64 {
        let gap = 1.0 - self.angle_threshold.cos();
        (std::f64::consts::LN_2 * (1.0 / gap - 0.5)).max(0.0)
    }

    /// Distribution the next direction is drawn from, before the cone constraint.
    pub fn local_distribution<M>(
        &self,
        model: &M,
        position: &Point3<f64>,
        current: &Vector3<f64>,
    ) -> AngularDistribution
    where
        M: DiffusionModel + ?Sized,
    {
        if self.angle_threshold < MIN_ANGLE {
            return AngularDistribution::new_monodirectional(*current);
        }
        let cos_limit = self.angle_threshold.cos();

        let mut mean = *current;
        let mut max = model.orientation_value(position, current);
        let mut min = max;
        for d in SPHERE_DIRECTIONS.iter() {
            // the table covers the sphere; use the copy facing forward
            let d = if d.dot(current) < 0.0 { -d } else { *d };
            if d.dot(current) < cos_limit {
                continue;
            }
            let value = model.orientation_value(position, &d);
            if value > max {
                max = value;
                mean = d;
            }
            min = min.min(value);
        }
        let anisotropy = if max > 0.0 {
            ((max - min) / max).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let kappa = self.cone_concentration() + self.concentration * anisotropy;
        AngularDistribution::new_von_mises_fisher(mean, kappa)
    }

    /// Draw a direction within the angle threshold of `current`.
    ///
    /// The reported density is renormalized by the mass the local distribution
    /// puts inside the cone, which differs from particle to particle. Returns `None` once `max_trials` draws have all fallen outside the cone.
    pub fn sample<M, R>(
        &self,
        model: &M,
        position: &Point3<f64>,
        current: &Vector3<f64>,
        rng: &mut R,
    ) -> Option<Proposal>
    where
        M: DiffusionModel + ?Sized,
        R: Rng + ?Sized,
    {
        let distribution = self.local_distribution(model, position, current);
        if let AngularDistribution::Monodirectional { reference } = distribution {
            return Some(Proposal {
                direction: reference,
                log_density: 0.0,
            });
        }
        let cos_limit = self.angle_threshold.cos();
        for _ in 0..self.max_trials {
            let direction = distribution.sample(rng);
            if direction.dot(current) >= cos_limit - 1e-12 {
                // density of the law truncated to the cone
                let mass = distribution.cone_mass(current, cos_limit).max(f64::MIN_POSITIVE);
                return Some(Proposal {
                    direction,
                    log_density: distribution.log_pdf(&direction) - mass.ln(),
                });
            }
        }
        None
    }
}
