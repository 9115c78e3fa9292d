//! Dense voxel volumes: the processing mask and the seed label volume.

use crate::error::{Result, TractographyError};
use crate::geometry::ImageGeometry;
use nalgebra::Point3;

/// Dense voxel data on an [`ImageGeometry`].
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    geometry: ImageGeometry,
    data: Vec<T>,
}

impl<T: Clone> Volume<T> {
    /// Volume filled with a single value.
    pub fn filled(geometry: ImageGeometry, value: T) -> Self {
        let data = vec![value; geometry.len()];
        Self { geometry, data }
    }

    /// Wrap voxel data laid out x-fastest. The length must match the grid.
    pub fn from_data(geometry: ImageGeometry, data: Vec<T>) -> Result<Self> {
        if data.len() != geometry.len() {
            return Err(TractographyError::DimensionMismatch {
                what: "voxel data",
                expected: format!("{} voxels ({:?})", geometry.len(), geometry.size),
                found: format!("{} voxels", data.len()),
            });
        }
        Ok(Self { geometry, data })
    }

    /// Build a volume by evaluating `f` at every voxel centre.
    pub fn from_fn<F>(geometry: ImageGeometry, mut f: F) -> Self
    where
        F: FnMut(&Point3<f64>) -> T,
    {
        let [nx, ny, nz] = geometry.size;
        let mut data = Vec::with_capacity(geometry.len());
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    data.push(f(&geometry.index_to_physical([i, j, k])));
                }
            }
        }
        Self { geometry, data }
    }

    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn get(&self, index: [usize; 3]) -> Option<&T> {
        if (0..3).any(|axis| index[axis] >= self.geometry.size[axis]) {
            return None;
        }
        self.data.get(self.geometry.linear_index(index))
    }

    /// Value at the voxel nearest to a physical point.
    pub fn value_at(&self, point: &Point3<f64>) -> Option<&T> {
        self.geometry
            .linear_index_of(point)
            .and_then(|i| self.data.get(i))
    }
}

/// Region where tracking is allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    voxels: Volume<bool>,
}

impl Mask {
    pub fn new(voxels: Volume<bool>) -> Self {
        Self { voxels }
    }

    /// Mask from integer voxel data, any non-zero voxel being inside.
    pub fn from_data(geometry: ImageGeometry, data: Vec<u8>) -> Result<Self> {
        let data = data.into_iter().map(|v| v != 0).collect();
        Ok(Self::new(Volume::from_data(geometry, data)?))
    }

    /// Voxels whose centre lies within `radius` of `center`.
    pub fn sphere(geometry: ImageGeometry, center: Point3<f64>, radius: f64) -> Self {
        let r2 = radius * radius;
        Self::new(Volume::from_fn(geometry, |p| (p - center).norm_squared() <= r2))
    }

    /// Every voxel inside.
    pub fn full(geometry: ImageGeometry) -> Self {
        Self::new(Volume::filled(geometry, true))
    }

    /// Whether a physical point falls in a voxel of the mask.
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        self.voxels.value_at(point).copied().unwrap_or(false)
    }

    pub fn geometry(&self) -> &ImageGeometry {
        self.voxels.geometry()
    }

    pub fn count(&self) -> usize {
        self.voxels.data().iter().filter(|&&v| v).count()
    }
}

/// Seed label volume, already resampled to the seed spacing.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelVolume {
    labels: Volume<u16>,
}

impl LabelVolume {
    pub fn new(labels: Volume<u16>) -> Self {
        Self { labels }
    }

    pub fn from_data(geometry: ImageGeometry, data: Vec<u16>) -> Result<Self> {
        Ok(Self::new(Volume::from_data(geometry, data)?))
    }

    pub fn geometry(&self) -> &ImageGeometry {
        self.labels.geometry()
    }

    /// Labeled voxels in storage order, as `(label, physical point)` pairs.
    pub fn labeled_points(&self) -> impl Iterator<Item = (u16, Point3<f64>)> + '_ {
        let geometry = self.labels.geometry();
        self.labels
            .data()
            .iter()
            .enumerate()
            .filter(|(_, &label)| label != 0)
            .map(move |(linear, &label)| {
                (label, geometry.index_to_physical(geometry.voxel_index(linear)))
            })
    }

    /// Distinct non-zero labels, sorted.
    pub fn labels(&self) -> Vec<u16> {
        let mut labels: Vec<u16> = self
            .labels
            .data()
            .iter()
            .copied()
            .filter(|&l| l != 0)
            .collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_grid(n: usize) -> ImageGeometry {
        ImageGeometry::new([n, n, n], [0.0; 3], [1.0; 3])
    }

    #[test]
    fn test_from_data_length_mismatch() {
        let result = Volume::from_data(unit_grid(3), vec![0u8; 26]);
        assert!(matches!(
            result,
            Err(TractographyError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_from_fn_uses_voxel_centres() {
        let v = Volume::from_fn(unit_grid(3), |p| p.x + 10.0 * p.y + 100.0 * p.z);
        assert_eq!(v.get([2, 1, 0]), Some(&12.0));
        assert_eq!(v.get([0, 0, 2]), Some(&200.0));
        assert_eq!(v.get([3, 0, 0]), None);
    }

    #[test]
    fn test_sphere_mask() {
        let geometry = ImageGeometry::new([21, 21, 21], [-10.0; 3], [1.0; 3]);
        let mask = Mask::sphere(geometry, Point3::origin(), 5.0);
        assert!(mask.contains(&Point3::origin()));
        assert!(mask.contains(&Point3::new(5.0, 0.0, 0.0)));
        assert!(!mask.contains(&Point3::new(6.0, 0.0, 0.0)));
        assert!(!mask.contains(&Point3::new(50.0, 0.0, 0.0)));
        let count = mask.count();
        assert!(count > 400 && count < 600, "sphere voxel count {} seems wrong", count);
    }

    #[test]
    fn test_mask_from_data() {
        let mut data = vec![0u8; 8];
        data[7] = 3;
        let mask = Mask::from_data(unit_grid(2), data).unwrap();
        assert!(mask.contains(&Point3::new(1.0, 1.0, 1.0)));
        assert!(!mask.contains(&Point3::new(0.0, 0.0, 0.0)));
        assert_eq!(mask.count(), 1);
    }

    #[test]
    fn test_labeled_points_skip_background() {
        let mut data = vec![0u16; 27];
        data[1] = 2;
        data[26] = 1;
        let labels = LabelVolume::from_data(unit_grid(3), data).unwrap();
        let points: Vec<_> = labels.labeled_points().collect();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0], (2, Point3::new(1.0, 0.0, 0.0)));
        assert_eq!(points[1], (1, Point3::new(2.0, 2.0, 2.0)));
        assert_eq!(labels.labels(), vec![1, 2]);
    }
}
