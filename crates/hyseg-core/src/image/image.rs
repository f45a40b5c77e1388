//! Image type with physical metadata and coordinate transformations.
//!
//! This module provides the Image struct which represents a scalar 3-D volume
//! as tensor data plus the physical space metadata (origin, spacing) that maps
//! voxel indices to physical coordinates.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::error::{CoreError, Result};
use crate::geometry::{Point3, Spacing3};
use super::extent::GridExtent;
use super::voxel_grid::VoxelGrid;

/// Scalar volume with physical metadata.
///
/// The tensor has shape `[depth, height, width]`, so its row-major storage order
/// matches [`GridExtent`] with `x` varying fastest.
///
/// # Type Parameters
/// * `B` - The backend (CPU or GPU) for tensor operations
///
/// # Coordinate Systems
/// * **Index Space**: Continuous `(x, y, z)` voxel coordinates
/// * **Physical Space**: `origin + spacing * index`, component-wise
///
/// # Examples
/// ```rust
/// use hyseg_core::Image;
/// use hyseg_core::geometry::{Point3, Spacing3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([4, 5, 6], &device);
/// let image = Image::new(data, Point3::origin(), Spacing3::new(1.0, 1.0, 1.0));
/// assert_eq!(image.extent().width, 6);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend> {
    /// The voxel data, potentially on GPU.
    data: Tensor<B, 3>,
    /// Physical coordinate of voxel (0, 0, 0).
    origin: Point3,
    /// Physical distance between voxels along x, y and z.
    spacing: Spacing3,
}

impl<B: Backend> Image<B> {
    /// Create a new image with the given data and metadata.
    pub fn new(data: Tensor<B, 3>, origin: Point3, spacing: Spacing3) -> Self {
        Self {
            data,
            origin,
            spacing,
        }
    }

    /// Upload a host grid as an image tensor on `device`.
    pub fn from_grid(
        grid: &VoxelGrid<f32>,
        origin: Point3,
        spacing: Spacing3,
        device: &B::Device,
    ) -> Self {
        let shape = grid.extent().shape();
        let data = Tensor::<B, 3>::from_data(TensorData::new(grid.as_slice().to_vec(), shape), device);
        Self::new(data, origin, spacing)
    }

    /// Get the image data tensor.
    pub fn data(&self) -> &Tensor<B, 3> {
        &self.data
    }

    /// Get the origin (physical coordinate of the first voxel).
    pub fn origin(&self) -> &Point3 {
        &self.origin
    }

    /// Get the spacing (physical distance between voxels).
    pub fn spacing(&self) -> &Spacing3 {
        &self.spacing
    }

    /// Tensor shape `[depth, height, width]`.
    pub fn shape(&self) -> [usize; 3] {
        self.data.dims()
    }

    pub fn extent(&self) -> GridExtent {
        GridExtent::from_shape(self.shape())
    }

    /// Read the tensor back into a host grid.
    pub fn to_grid(&self) -> Result<VoxelGrid<f32>> {
        let values = self
            .data
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| CoreError::tensor_data(format!("{:?}", e)))?;
        VoxelGrid::from_vec(self.extent(), values)
    }

    /// Convert a physical point to a continuous index.
    pub fn physical_to_index(&self, point: &Point3) -> Point3 {
        Point3::from((point - self.origin).component_div(&self.spacing))
    }

    /// Convert a continuous index to a physical point.
    pub fn index_to_physical(&self, index: &Point3) -> Point3 {
        self.origin + index.coords.component_mul(&self.spacing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_grid_roundtrip_preserves_layout() {
        let device = Default::default();
        let extent = GridExtent::new(3, 2, 4);
        let grid = VoxelGrid::from_fn(extent, |x, y, z| (x + 10 * y + 100 * z) as f32);
        let image = Image::<B>::from_grid(&grid, Point3::origin(), Spacing3::new(1.0, 1.0, 1.0), &device);

        assert_eq!(image.shape(), [4, 2, 3]);
        let back = image.to_grid().unwrap();
        assert_eq!(back, grid);
        assert_eq!(back.get(2, 1, 3), 312.0);
    }

    #[test]
    fn test_physical_index_roundtrip() {
        let device = Default::default();
        let data = Tensor::<B, 3>::zeros([2, 2, 2], &device);
        let image = Image::new(data, Point3::new(10.0, -5.0, 2.0), Spacing3::new(0.5, 2.0, 1.5));

        let index = Point3::new(1.0, 3.0, 2.0);
        let physical = image.index_to_physical(&index);
        assert!((physical - Point3::new(10.5, 1.0, 5.0)).norm() < 1e-12);
        assert!((image.physical_to_index(&physical) - index).norm() < 1e-12);
    }
}
