//! Dense host-side voxel buffers.
//!
//! `VoxelGrid` is the CPU counterpart of an [`Image`](super::Image) tensor. The iterative
//! algorithms (ICM relabelling, field sampling at mesh vertices) address single voxels,
//! which is what this type is for.

use std::ops::{Index, IndexMut};

use crate::error::{CoreError, Result};
use crate::geometry::{Point3, Vector3};
use super::extent::GridExtent;

/// Class label of a voxel. Label 0 is reserved for background / unclassified.
pub type Label = u16;

/// Dense grid of values laid out as described in [`GridExtent`].
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid<T> {
    extent: GridExtent,
    data: Vec<T>,
}

/// One label per voxel.
pub type LabelGrid = VoxelGrid<Label>;

impl<T: Copy> VoxelGrid<T> {
    /// Grid with every voxel set to `value`.
    pub fn filled(extent: GridExtent, value: T) -> Self {
        Self {
            extent,
            data: vec![value; extent.len()],
        }
    }

    /// Wrap an existing buffer. The buffer length must match the extent.
    pub fn from_vec(extent: GridExtent, data: Vec<T>) -> Result<Self> {
        if data.len() != extent.len() {
            return Err(CoreError::ShapeMismatch {
                expected: vec![extent.len()],
                actual: vec![data.len()],
            });
        }
        Ok(Self { extent, data })
    }

    /// Build a grid by evaluating `f(x, y, z)` for every voxel in storage order.
    pub fn from_fn(extent: GridExtent, mut f: impl FnMut(usize, usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(extent.len());
        for z in 0..extent.depth {
            for y in 0..extent.height {
                for x in 0..extent.width {
                    data.push(f(x, y, z));
                }
            }
        }
        Self { extent, data }
    }

    pub fn extent(&self) -> GridExtent {
        self.extent
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> T {
        self.data[self.extent.index(x, y, z)]
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, value: T) {
        let idx = self.extent.index(x, y, z);
        self.data[idx] = value;
    }

    /// Overwrite this grid with the contents of `other` without reallocating.
    pub fn copy_from(&mut self, other: &VoxelGrid<T>) -> Result<()> {
        if other.extent != self.extent {
            return Err(CoreError::ShapeMismatch {
                expected: self.extent.shape().to_vec(),
                actual: other.extent.shape().to_vec(),
            });
        }
        self.data.copy_from_slice(&other.data);
        Ok(())
    }

    pub fn map<U: Copy>(&self, f: impl Fn(T) -> U) -> VoxelGrid<U> {
        VoxelGrid {
            extent: self.extent,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Value at the voxel nearest to a continuous index, clamped to the grid.
    pub fn sample_nearest(&self, p: &Point3) -> T {
        let p = self.extent.clamp_point(p);
        self.get(p.x.round() as usize, p.y.round() as usize, p.z.round() as usize)
    }
}

impl<T> Index<usize> for VoxelGrid<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.data[index]
    }
}

impl<T> IndexMut<usize> for VoxelGrid<T> {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl VoxelGrid<f32> {
    /// Trilinear interpolation at a continuous index, clamped to the grid.
    pub fn sample_linear(&self, p: &Point3) -> f64 {
        self.extent
            .trilinear_stencil(p)
            .iter()
            .map(|&(idx, w)| w * self.data[idx] as f64)
            .sum()
    }

    /// Mean and population variance of all voxels.
    pub fn mean_variance(&self) -> (f64, f64) {
        if self.data.is_empty() {
            return (0.0, 0.0);
        }
        let n = self.data.len() as f64;
        let mean = self.data.iter().map(|&v| v as f64).sum::<f64>() / n;
        let variance = self
            .data
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        (mean, variance)
    }
}

impl VoxelGrid<Vector3> {
    /// Trilinear interpolation of a vector field at a continuous index.
    pub fn sample_linear(&self, p: &Point3) -> Vector3 {
        self.extent
            .trilinear_stencil(p)
            .iter()
            .fold(Vector3::zeros(), |acc, &(idx, w)| acc + self.data[idx] * w)
    }
}

impl LabelGrid {
    /// Number of voxels carrying `label`.
    pub fn count_label(&self, label: Label) -> usize {
        self.data.iter().filter(|&&l| l == label).count()
    }

    /// Voxel count per label for labels `0..classes`. Labels outside the range are ignored.
    pub fn histogram(&self, classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; classes];
        for &l in &self.data {
            if let Some(c) = counts.get_mut(l as usize) {
                *c += 1;
            }
        }
        counts
    }
}

impl VoxelGrid<bool> {
    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec_rejects_wrong_length() {
        let extent = GridExtent::new(2, 2, 2);
        assert!(VoxelGrid::from_vec(extent, vec![0.0f32; 7]).is_err());
        assert!(VoxelGrid::from_vec(extent, vec![0.0f32; 8]).is_ok());
    }

    #[test]
    fn test_from_fn_storage_order() {
        let extent = GridExtent::new(3, 2, 2);
        let grid = VoxelGrid::from_fn(extent, |x, y, z| (x + 10 * y + 100 * z) as f32);
        assert_eq!(grid[extent.index(2, 1, 1)], 112.0);
        assert_eq!(grid.get(1, 0, 1), 101.0);
    }

    #[test]
    fn test_sample_linear_midpoint() {
        let extent = GridExtent::new(2, 2, 2);
        let grid = VoxelGrid::from_vec(extent, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]).unwrap();
        let value = grid.sample_linear(&Point3::new(0.5, 0.5, 0.5));
        assert!((value - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_sample_nearest_clamps() {
        let extent = GridExtent::new(3, 1, 1);
        let grid = VoxelGrid::from_vec(extent, vec![1.0f32, 2.0, 3.0]).unwrap();
        assert_eq!(grid.sample_nearest(&Point3::new(10.0, 0.0, 0.0)), 3.0);
        assert_eq!(grid.sample_nearest(&Point3::new(0.6, 0.0, 0.0)), 2.0);
    }

    #[test]
    fn test_histogram_ignores_out_of_range() {
        let extent = GridExtent::new(5, 1, 1);
        let labels: LabelGrid = VoxelGrid::from_vec(extent, vec![0, 1, 1, 4, 0]).unwrap();
        assert_eq!(labels.histogram(2), vec![2, 2]);
        assert_eq!(labels.count_label(4), 1);
    }

    #[test]
    fn test_copy_from_checks_extent() {
        let mut a = LabelGrid::filled(GridExtent::new(2, 2, 1), 0);
        let b = LabelGrid::filled(GridExtent::new(2, 2, 1), 3);
        a.copy_from(&b).unwrap();
        assert_eq!(a.count_label(3), 4);
        let c = LabelGrid::filled(GridExtent::new(4, 1, 1), 1);
        assert!(a.copy_from(&c).is_err());
    }
}
