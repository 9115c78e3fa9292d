// Curvature prior on consecutive fiber directions

use crate::stats::log_vmf_normalizer;
use nalgebra::Vector3;

/// Curvature prior: a von Mises-Fisher density centred on the previous direction.
///
/// Larger concentrations favour straighter paths. A zero concentration is the
/// uniform density on the sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorDensity {
    concentration: f64,
    log_normalizer: f64,
}

impl PriorDensity {
    pub fn new(concentration: f64) -> Self {
        Self {
            concentration,
            log_normalizer: log_vmf_normalizer(concentration),
        }
    }

    pub fn concentration(&self) -> f64 {
        self.concentration
    }

    pub fn log_evaluate(&self, previous: &Vector3<f64>, candidate: &Vector3<f64>) -> f64 {
        self.log_normalizer + self.concentration * previous.dot(candidate)
    }

    pub fn evaluate(&self, previous: &Vector3<f64>, candidate: &Vector3<f64>) -> f64 {
        self.log_evaluate(previous, candidate).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_zero_concentration_is_uniform() {
        let prior = PriorDensity::new(0.0);
        let a = prior.evaluate(&Vector3::x(), &Vector3::x());
        let b = prior.evaluate(&Vector3::x(), &-Vector3::x());
        assert!((a - 1.0 / (4.0 * PI)).abs() < 1e-12);
        assert_eq!(a, b);
    }

    #[test]
    fn test_straight_continuation_preferred() {
        let prior = PriorDensity::new(30.0);
        let straight = prior.evaluate(&Vector3::z(), &Vector3::z());
        let turned = prior.evaluate(&Vector3::z(), &Vector3::new(0.0, 0.5, 0.75f64.sqrt()));
        assert!(straight > turned);
        assert!(turned > 0.0);
    }

    #[test]
    fn test_higher_concentration_is_sharper() {
        let soft = PriorDensity::new(2.0);
        let sharp = PriorDensity::new(40.0);
        let turned = Vector3::new(0.0, 1.0, 1.0).normalize();
        let ratio = |p: &PriorDensity| p.evaluate(&Vector3::z(), &Vector3::z()) / p.evaluate(&Vector3::z(), &turned);
        assert!(ratio(&sharp) > ratio(&soft));
    }
}
