use crate::error::{Result, TractographyError};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Anatomical axis convention used for emitted fiber coordinates.
///
/// Images are stored in LPS (Left-Posterior-Superior) physical space. RAS
/// (Right-Anterior-Superior) output flips the sign of the first two axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoordinateConvention {
    #[default]
    Ras,
    Lps,
}

impl CoordinateConvention {
    /// Convert a point from image (LPS) physical space to this convention.
    pub fn apply(&self, point: &Point3<f64>) -> Point3<f64> {
        match self {
            CoordinateConvention::Ras => Point3::new(-point.x, -point.y, point.z),
            CoordinateConvention::Lps => *point,
        }
    }
}

/// Tracking parameters for one tractography job.
///
/// Every field has a default, so a JSON document only needs to list the
/// options it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Spherical harmonics order of the orientation model (threaded through to the model fit)
    pub model_order: u32,
    /// Regularization of the model fit (threaded through, unused by tracking)
    pub regularization: f64,
    /// Number of particles per seed
    pub particles: usize,
    /// Resample when ESS / N falls below this fraction
    pub resampling_threshold: f64,
    /// Displacement per step, in physical units
    pub step_size: f64,
    /// Concentration of the curvature prior
    pub curve_concentration: f64,
    /// Maximum turning angle between successive steps, in radians
    pub angle_threshold: f64,
    /// Spacing between seeds, in physical units
    pub seed_spacing: f64,
    pub coordinate_convention: CoordinateConvention,
    /// Upper bound on propagation steps per run
    pub max_steps: usize,
    /// Redraws allowed before a particle gives up on a step
    pub max_proposal_trials: usize,
    /// Concentration of the proposal for a fully anisotropic model
    pub proposal_concentration: f64,
    /// Attenuation of the stick profile used by the likelihood
    pub likelihood_attenuation: f64,
    /// Global random seed
    pub seed: u64,
    /// Worker threads, 0 lets rayon decide
    pub threads: usize,
    /// Labels allowed to seed, all non-zero labels when `None`
    pub seed_labels: Option<Vec<u16>>,
    /// Only emit a bundle when every seed of the label produced a fiber
    pub require_complete_bundles: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_order: 4,
            regularization: 0.006,
            particles: 1000,
            resampling_threshold: 0.01,
            step_size: 0.5,
            curve_concentration: 30.0,
            angle_threshold: std::f64::consts::FRAC_PI_3,
            seed_spacing: 1.0,
            coordinate_convention: CoordinateConvention::Ras,
            max_steps: 1000,
            max_proposal_trials: 100,
            proposal_concentration: 30.0,
            likelihood_attenuation: 3.0,
            seed: 0,
            threads: 0,
            seed_labels: None,
            require_complete_bundles: true,
        }
    }
}

impl Settings {
    /// Parse settings from a JSON document, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Check every parameter against its allowed range.
    pub fn validate(&self) -> Result<()> {
        if self.model_order % 2 != 0 {
            return Err(TractographyError::invalid(
                "model_order",
                format!("must be even, got {}", self.model_order),
            ));
        }
        check_finite("regularization", self.regularization)?;
        if self.regularization < 0.0 {
            return Err(TractographyError::invalid(
                "regularization",
                format!("must be non-negative, got {}", self.regularization),
            ));
        }
        if self.particles == 0 {
            return Err(TractographyError::invalid(
                "particles",
                "must be greater than zero",
            ));
        }
        check_finite("resampling_threshold", self.resampling_threshold)?;
        if self.resampling_threshold <= 0.0 || self.resampling_threshold >= 1.0 {
            return Err(TractographyError::invalid(
                "resampling_threshold",
                format!("must lie in (0, 1), got {}", self.resampling_threshold),
            ));
        }
        check_positive("step_size", self.step_size)?;
        check_non_negative("curve_concentration", self.curve_concentration)?;
        check_finite("angle_threshold", self.angle_threshold)?;
        if self.angle_threshold < 0.0 || self.angle_threshold > std::f64::consts::PI {
            return Err(TractographyError::invalid(
                "angle_threshold",
                format!("must lie in [0, pi] radians, got {}", self.angle_threshold),
            ));
        }
        check_positive("seed_spacing", self.seed_spacing)?;
        if self.max_steps == 0 {
            return Err(TractographyError::invalid(
                "max_steps",
                "must be greater than zero",
            ));
        }
        if self.max_proposal_trials == 0 {
            return Err(TractographyError::invalid(
                "max_proposal_trials",
                "must be greater than zero",
            ));
        }
        check_non_negative("proposal_concentration", self.proposal_concentration)?;
        check_non_negative("likelihood_attenuation", self.likelihood_attenuation)?;
        if let Some(labels) = &self.seed_labels {
            if labels.iter().any(|&l| l == 0) {
                return Err(TractographyError::invalid(
                    "seed_labels",
                    "label 0 marks background and cannot seed",
                ));
            }
        }
        Ok(())
    }

    /// Whether voxels carrying `label` should be used as seeds.
    pub fn seeds_label(&self, label: u16) -> bool {
        label != 0
            && self
                .seed_labels
                .as_ref()
                .map_or(true, |labels| labels.contains(&label))
    }
}

fn check_finite(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(TractographyError::invalid(
            name,
            format!("must be finite, got {}", value),
        ))
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<()> {
    check_finite(name, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(TractographyError::invalid(
            name,
            format!("must be positive, got {}", value),
        ))
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<()> {
    check_finite(name, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(TractographyError::invalid(
            name,
            format!("must be non-negative, got {}", value),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.particles, 1000);
        assert_eq!(settings.model_order, 4);
        assert_eq!(settings.coordinate_convention, CoordinateConvention::Ras);
        assert!(settings.require_complete_bundles);
    }

    #[test]
    fn test_zero_particles_rejected() {
        let settings = Settings {
            particles: 0,
            ..Settings::default()
        };
        match settings.validate() {
            Err(TractographyError::InvalidParameter { name, .. }) => assert_eq!(name, "particles"),
            other => panic!("expected invalid particles, got {:?}", other),
        }
    }

    #[test]
    fn test_resampling_threshold_bounds() {
        for bad in [0.0, 1.0, -0.5, 2.0, f64::NAN] {
            let settings = Settings {
                resampling_threshold: bad,
                ..Settings::default()
            };
            assert!(settings.validate().is_err(), "threshold {} accepted", bad);
        }
    }

    #[test]
    fn test_angle_threshold_bounds() {
        let ok = Settings {
            angle_threshold: std::f64::consts::PI,
            ..Settings::default()
        };
        assert!(ok.validate().is_ok());
        let zero = Settings {
            angle_threshold: 0.0,
            ..Settings::default()
        };
        assert!(zero.validate().is_ok());
        let too_wide = Settings {
            angle_threshold: 4.0,
            ..Settings::default()
        };
        assert!(too_wide.validate().is_err());
    }

    #[test]
    fn test_odd_model_order_rejected() {
        let settings = Settings {
            model_order: 3,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_from_json_partial_document() {
        let settings = Settings::from_json_str(
            r#"{ "particles": 64, "step_size": 1.0, "coordinate_convention": "Lps" }"#,
        )
        .unwrap();
        assert_eq!(settings.particles, 64);
        assert_eq!(settings.step_size, 1.0);
        assert_eq!(settings.coordinate_convention, CoordinateConvention::Lps);
        assert_eq!(settings.resampling_threshold, 0.01);
    }

    #[test]
    fn test_from_json_rejects_invalid_values() {
        let result = Settings::from_json_str(r#"{ "step_size": -1.0 }"#);
        assert!(matches!(
            result,
            Err(TractographyError::InvalidParameter { name: "step_size", .. })
        ));
    }

    #[test]
    fn test_seed_label_filter() {
        let mut settings = Settings::default();
        assert!(settings.seeds_label(3));
        assert!(!settings.seeds_label(0));
        settings.seed_labels = Some(vec![2]);
        assert!(settings.seeds_label(2));
        assert!(!settings.seeds_label(3));
    }

    #[test]
    fn test_background_seed_label_rejected() {
        let settings = Settings {
            seed_labels: Some(vec![0, 1]),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_coordinate_convention_flip() {
        let p = Point3::new(1.0, 2.0, 3.0);
        assert_eq!(CoordinateConvention::Ras.apply(&p), Point3::new(-1.0, -2.0, 3.0));
        assert_eq!(CoordinateConvention::Lps.apply(&p), p);
    }
}
