use nalgebra::Vector3;
use rand::Rng;
use rand_distr::{Distribution, UnitSphere};
use std::f64::consts::PI;

/// Concentrations below this are treated as isotropic.
const MIN_CONCENTRATION: f64 = 1e-10;

/// Midpoint nodes of the cone mass quadrature.
const CONE_MASS_NODES: usize = 128;

/// Directional distributions on the unit sphere.
#[derive(Debug, Clone, PartialEq)]
pub enum AngularDistribution {
    Isotropic,
    /// Point mass on a single direction
    Monodirectional { reference: Vector3<f64> },
    /// Von Mises-Fisher distribution on S²
    VonMisesFisher { mean: Vector3<f64>, kappa: f64 },
}

impl AngularDistribution {
    pub fn new_monodirectional(reference: Vector3<f64>) -> Self {
        let norm = reference.norm();
        if norm == 0.0 {
            panic!("Direction vector cannot be zero");
        }
        Self::Monodirectional {
            reference: reference / norm,
        }
    }

    /// Von Mises-Fisher around `mean` (normalized here). Vanishing concentration gives `Isotropic`.
    pub fn new_von_mises_fisher(mean: Vector3<f64>, kappa: f64) -> Self {
        let norm = mean.norm();
        if norm == 0.0 {
            panic!("Direction vector cannot be zero");
        }
        if kappa < MIN_CONCENTRATION {
            Self::Isotropic
        } else {
            Self::VonMisesFisher {
                mean: mean / norm,
                kappa,
            }
        }
    }

    /// Sample a unit direction.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vector3<f64> {
        match self {
            AngularDistribution::Isotropic => {
                let [x, y, z]: [f64; 3] = UnitSphere.sample(rng);
                Vector3::new(x, y, z)
            }
            AngularDistribution::Monodirectional { reference } => *reference,
            AngularDistribution::VonMisesFisher { mean, kappa } => {
                // Wood (1994), closed form for the cosine on S²
                let xi: f64 = rng.gen();
                let mu = 1.0 + (xi + (1.0 - xi) * (-2.0 * kappa).exp()).ln() / kappa;
                let phi = 2.0 * PI * rng.gen::<f64>();
                rotate_direction_3d(mean, mu.clamp(-1.0, 1.0), phi)
            }
        }
    }

    /// Log density with respect to the surface measure of S².
    ///
    /// The point mass has log density 0 on its reference and -inf elsewhere.
    pub fn log_pdf(&self, direction: &Vector3<f64>) -> f64 {
        match self {
            AngularDistribution::Isotropic => -(4.0 * PI).ln(),
            AngularDistribution::Monodirectional { reference } => {
                if (direction - reference).norm() < 1e-12 {
                    0.0
                } else {
                    f64::NEG_INFINITY
                }
            }
            AngularDistribution::VonMisesFisher { mean, kappa } => {
                log_vmf_normalizer(*kappa) + kappa * mean.dot(direction)
            }
        }
    }

    /// Probability that a draw falls within the cone `{x : x . axis >= cos_limit}`.
    ///
    /// Exact for a point mass, the uniform law and a von Mises-Fisher law
    /// centred on the cone axis (or its opposite). Otherwise the mass is
    /// integrated numerically over the cosine to the mean, using the inverse
    /// cumulative distribution of that cosine as the integration variable.
    pub fn cone_mass(&self, axis: &Vector3<f64>, cos_limit: f64) -> f64 {
        match self {
            AngularDistribution::Isotropic => ((1.0 - cos_limit) / 2.0).clamp(0.0, 1.0),
            AngularDistribution::Monodirectional { reference } => {
                if reference.dot(axis) >= cos_limit {
                    1.0
                } else {
                    0.0
                }
            }
            AngularDistribution::VonMisesFisher { mean, kappa } => {
                let kappa = *kappa;
                let cos_alpha = mean.dot(axis).clamp(-1.0, 1.0);
                let sin_alpha = (1.0 - cos_alpha * cos_alpha).sqrt();
                if sin_alpha < 1e-9 {
                    // P(t <= u) for the cosine t to the mean
                    let cdf = |u: f64| {
                        ((kappa * (u - 1.0)).exp_m1() - (-2.0 * kappa).exp_m1())
                            / -(-2.0 * kappa).exp_m1()
                    };
                    let mass = if cos_alpha > 0.0 {
                        1.0 - cdf(cos_limit)
                    } else {
                        cdf(-cos_limit)
                    };
                    return mass.clamp(0.0, 1.0);
                }
                let floor = (-2.0 * kappa).exp();
                let mut total = 0.0;
                for i in 0..CONE_MASS_NODES {
                    let xi = (i as f64 + 0.5) / CONE_MASS_NODES as f64;
                    let u = (1.0 + (xi + (1.0 - xi) * floor).ln() / kappa).clamp(-1.0, 1.0);
                    let sin_t = (1.0 - u * u).max(0.0).sqrt();
                    // share of the circle at cosine u from the mean lying inside the cone
                    let spread = sin_t * sin_alpha;
                    let share = if spread < 1e-12 {
                        if u * cos_alpha >= cos_limit {
                            1.0
                        } else {
                            0.0
                        }
                    } else {
                        let r = (cos_limit - u * cos_alpha) / spread;
                        r.clamp(-1.0, 1.0).acos() / PI
                    };
                    total += share;
                }
                (total / CONE_MASS_NODES as f64).clamp(0.0, 1.0)
            }
        }
    }
}

/// Log of the von Mises-Fisher normalizing constant on S².
pub fn log_vmf_normalizer(kappa: f64) -> f64 {
    if kappa < MIN_CONCENTRATION {
        -(4.0 * PI).ln()
    } else {
        kappa.ln() - (2.0 * PI).ln() - kappa - (-(-2.0 * kappa).exp()).ln_1p()
    }
}

/// Rotate `u_old` to a direction whose cosine with it is `mu`, at azimuth `phi`.
pub fn rotate_direction_3d(u_old: &Vector3<f64>, mu: f64, phi: f64) -> Vector3<f64> {
    let sin_theta = (1.0 - mu * mu).max(0.0).sqrt();

    let perp = if u_old.x.abs() < 0.99 {
        Vector3::new(1.0, 0.0, 0.0).cross(u_old).normalize()
    } else {
        Vector3::new(0.0, 1.0, 0.0).cross(u_old).normalize()
    };
    let ortho = u_old.cross(&perp);

    (mu * u_old + sin_theta * phi.cos() * perp + sin_theta * phi.sin() * ortho).normalize()
}

/// Angle in radians between two unit vectors.
pub fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    a.dot(b).clamp(-1.0, 1.0).acos()
}
