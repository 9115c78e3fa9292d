use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Voxel grid placement in physical space.
///
/// Physical point of a voxel index `i`: `origin + direction * diag(spacing) * i`.
/// Voxel data is laid out with x varying fastest (`i + j*nx + k*nx*ny`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGeometry {
    pub size: [usize; 3],
    pub origin: [f64; 3],
    pub spacing: [f64; 3],
    /// Row-major direction cosines
    pub direction: [[f64; 3]; 3],
}

impl ImageGeometry {
    /// Axis-aligned grid with identity direction cosines.
    pub fn new(size: [usize; 3], origin: [f64; 3], spacing: [f64; 3]) -> Self {
        Self {
            size,
            origin,
            spacing,
            direction: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    pub fn with_direction(mut self, direction: [[f64; 3]; 3]) -> Self {
        self.direction = direction;
        self
    }

    pub fn len(&self) -> usize {
        self.size[0] * self.size[1] * self.size[2]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn direction_matrix(&self) -> Matrix3<f64> {
        let d = &self.direction;
        Matrix3::new(
            d[0][0], d[0][1], d[0][2], d[1][0], d[1][1], d[1][2], d[2][0], d[2][1], d[2][2],
        )
    }

    fn index_to_physical_matrix(&self) -> Matrix3<f64> {
        self.direction_matrix()
            * Matrix3::from_diagonal(&Vector3::new(
                self.spacing[0],
                self.spacing[1],
                self.spacing[2],
            ))
    }

    /// Physical coordinate of the centre of voxel `index`.
    pub fn index_to_physical(&self, index: [usize; 3]) -> Point3<f64> {
        let idx = Vector3::new(index[0] as f64, index[1] as f64, index[2] as f64);
        let origin = Point3::new(self.origin[0], self.origin[1], self.origin[2]);
        origin + self.index_to_physical_matrix() * idx
    }

    /// Continuous index of a physical point.
    pub fn physical_to_continuous_index(&self, point: &Point3<f64>) -> Vector3<f64> {
        let origin = Point3::new(self.origin[0], self.origin[1], self.origin[2]);
        let inverse = self
            .index_to_physical_matrix()
            .try_inverse()
            .unwrap_or_else(Matrix3::zeros);
        inverse * (point - origin)
    }

    /// Nearest voxel of a physical point, or `None` when it falls outside the grid.
    pub fn physical_to_index(&self, point: &Point3<f64>) -> Option<[usize; 3]> {
        let c = self.physical_to_continuous_index(point);
        let mut index = [0usize; 3];
        for axis in 0..3 {
            let rounded = c[axis].round();
            if !rounded.is_finite() || rounded < 0.0 || rounded >= self.size[axis] as f64 {
                return None;
            }
            index[axis] = rounded as usize;
        }
        Some(index)
    }

    /// Linear offset of a voxel index (x fastest).
    pub fn linear_index(&self, index: [usize; 3]) -> usize {
        index[0] + index[1] * self.size[0] + index[2] * self.size[0] * self.size[1]
    }

    /// Voxel index of a linear offset.
    pub fn voxel_index(&self, linear: usize) -> [usize; 3] {
        let nx = self.size[0];
        let nxy = self.size[0] * self.size[1];
        [linear % nx, (linear / nx) % self.size[1], linear / nxy]
    }

    /// Linear offset of the voxel containing a physical point.
    pub fn linear_index_of(&self, point: &Point3<f64>) -> Option<usize> {
        self.physical_to_index(point).map(|i| self.linear_index(i))
    }

    /// Physical extent covered by the grid along each axis.
    pub fn extent(&self) -> [f64; 3] {
        [
            self.size[0] as f64 * self.spacing[0],
            self.size[1] as f64 * self.spacing[1],
            self.size[2] as f64 * self.spacing[2],
        ]
    }
}
