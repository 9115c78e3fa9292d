use nalgebra::Vector3;
use once_cell::sync::Lazy;

/// Number of quasi-uniform directions appended after the six axis directions.
pub const SPIRAL_DIRECTIONS: usize = 194;

/// Direction table used to scan orientation models.
///
/// The six axis directions come first so that axis-aligned structures are
/// found exactly and ties resolve towards them. The rest is a Fibonacci spiral
/// covering the whole sphere.
pub static SPHERE_DIRECTIONS: Lazy<Vec<Vector3<f64>>> = Lazy::new(|| {
    let mut directions = vec![
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(-1.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(0.0, -1.0, 0.0),
        Vector3::new(0.0, 0.0, 1.0),
        Vector3::new(0.0, 0.0, -1.0),
    ];
    directions.extend(fibonacci_sphere(SPIRAL_DIRECTIONS));
    directions
});

/// Quasi-uniform points on the unit sphere (golden-angle spiral).
pub fn fibonacci_sphere(n: usize) -> Vec<Vector3<f64>> {
    let golden_angle = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
    (0..n)
        .map(|i| {
            let z = 1.0 - (2.0 * i as f64 + 1.0) / n as f64;
            let r = (1.0 - z * z).max(0.0).sqrt();
            let phi = golden_angle * i as f64;
            Vector3::new(r * phi.cos(), r * phi.sin(), z)
        })
        .collect()
}

/// Quasi-uniform directions on the upper hemisphere (z >= 0), as used for gradient tables.
pub fn fibonacci_hemisphere(n: usize) -> Vec<Vector3<f64>> {
    fibonacci_sphere(2 * n)
        .into_iter()
        .filter(|d| d.z >= 0.0)
        .take(n)
        .collect()
}
