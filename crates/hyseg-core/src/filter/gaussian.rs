use burn::tensor::backend::Backend;
use burn::tensor::ops::ConvOptions;
use burn::tensor::Tensor;

use crate::error::Result;
use crate::geometry::Spacing3;
use crate::image::{Image, VoxelGrid};

/// Gaussian smoothing filter.
///
/// Applies a Gaussian smoothing filter to a volume using separable 1D convolutions.
/// Sigmas are given in physical units and converted to voxels with the image spacing.
/// Borders are handled by replicating the edge voxels, so constant volumes stay constant.
pub struct GaussianFilter<B: Backend> {
    /// Standard deviation along x, y and z in physical units.
    sigmas: [f64; 3],
    max_kernel_width: usize,
    _b: std::marker::PhantomData<B>,
}

impl<B: Backend> GaussianFilter<B> {
    /// Create a filter with the same standard deviation along every axis.
    pub fn new(sigma: f64) -> Self {
        Self::with_sigmas([sigma; 3])
    }

    /// Create a filter with per-axis standard deviations `[x, y, z]`.
    pub fn with_sigmas(sigmas: [f64; 3]) -> Self {
        Self {
            sigmas,
            max_kernel_width: 33,
            _b: std::marker::PhantomData,
        }
    }

    /// Set the maximum kernel width (radius * 2 + 1).
    pub fn with_max_kernel_width(mut self, width: usize) -> Self {
        self.max_kernel_width = width.max(1);
        self
    }

    /// Apply the filter to an image.
    pub fn apply(&self, image: &Image<B>) -> Image<B> {
        let data = self.apply_tensor(image.data().clone(), image.spacing());
        Image::new(data, *image.origin(), *image.spacing())
    }

    /// Smooth a host grid by uploading it to `device`, filtering and reading it back.
    pub fn apply_grid(
        &self,
        grid: &VoxelGrid<f32>,
        spacing: &Spacing3,
        device: &B::Device,
    ) -> Result<VoxelGrid<f32>> {
        let image = Image::<B>::from_grid(grid, crate::geometry::Point3::origin(), *spacing, device);
        self.apply(&image).to_grid()
    }

    /// Apply the filter to a `[depth, height, width]` tensor.
    pub fn apply_tensor(&self, input: Tensor<B, 3>, spacing: &Spacing3) -> Tensor<B, 3> {
        let mut data = input;
        let device = data.device();

        // Tensor dim 0 is z, dim 2 is x.
        for dim in 0..3 {
            let axis = 2 - dim;
            let sigma = self.sigmas[axis];
            if sigma <= 1e-6 || data.dims()[dim] < 2 {
                continue;
            }

            let voxel_sigma = sigma / spacing[axis];
            let radius = (3.0 * voxel_sigma).ceil() as usize;
            let width = (2 * radius + 1).min(self.max_kernel_width);
            let actual_radius = (width - 1) / 2;
            if actual_radius == 0 {
                continue;
            }

            let kernel = generate_kernel(voxel_sigma, actual_radius);
            let kernel_tensor = Tensor::<B, 1>::from_floats(kernel.as_slice(), &device);
            data = self.convolve_1d(data, kernel_tensor, dim, actual_radius);
        }
        data
    }

    fn convolve_1d(
        &self,
        input: Tensor<B, 3>,
        kernel: Tensor<B, 1>,
        dim: usize,
        radius: usize,
    ) -> Tensor<B, 3> {
        let dims = input.dims();

        // 1. Permute target dimension to the last
        let mut permute_indices = [0isize; 3];
        let mut idx = 0;
        for i in 0..3 {
            if i != dim {
                permute_indices[idx] = i as isize;
                idx += 1;
            }
        }
        permute_indices[2] = dim as isize;
        let permuted = input.permute(permute_indices);
        let permuted_shape = permuted.dims();

        // 2. Flatten other dimensions into batch: [Batch, Channels=1, Length]
        let length = dims[dim];
        let batch_size = dims.iter().product::<usize>() / length;
        let signal = permuted.reshape([batch_size, 1, length]);

        // 3. Replicate the edge samples so the convolution needs no zero padding
        let first = signal.clone().slice([0..batch_size, 0..1, 0..1]);
        let last = signal.clone().slice([0..batch_size, 0..1, length - 1..length]);
        let mut parts = Vec::with_capacity(2 * radius + 1);
        parts.extend(std::iter::repeat(first).take(radius));
        parts.push(signal);
        parts.extend(std::iter::repeat(last).take(radius));
        let padded = Tensor::cat(parts, 2);

        // Kernel: [OutChannels=1, InChannels=1, KernelSize]
        let kernel_size = kernel.dims()[0];
        let kernel = kernel.reshape([1, 1, kernel_size]);

        let options = ConvOptions::new([1], [0], [1], 1);
        let output = burn::tensor::module::conv1d(padded, kernel, None, options);

        // 4. Reshape back and inverse permute
        let output = output.reshape(permuted_shape);
        let mut inverse = [0isize; 3];
        for (new_pos, &old_pos) in permute_indices.iter().enumerate() {
            inverse[old_pos as usize] = new_pos as isize;
        }
        output.permute(inverse)
    }
}

/// Normalized, sampled Gaussian of the given radius.
fn generate_kernel(sigma: f64, radius: usize) -> Vec<f32> {
    let two_sigma2 = 2.0 * sigma * sigma;
    let values: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-x * x / two_sigma2).exp()
        })
        .collect();
    let sum: f64 = values.iter().sum();
    values.into_iter().map(|v| (v / sum) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3;
    use crate::image::GridExtent;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_kernel_is_normalized_and_symmetric() {
        let kernel = generate_kernel(1.5, 4);
        assert_eq!(kernel.len(), 9);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        for i in 0..4 {
            assert!((kernel[i] - kernel[8 - i]).abs() < 1e-7);
        }
    }

    #[test]
    fn test_constant_volume_is_unchanged() {
        let device = Default::default();
        let grid = VoxelGrid::filled(GridExtent::new(6, 5, 4), 3.0f32);
        let filter = GaussianFilter::<B>::new(1.0);
        let out = filter
            .apply_grid(&grid, &Spacing3::new(1.0, 1.0, 1.0), &device)
            .unwrap();
        for &v in out.as_slice() {
            assert!((v - 3.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_impulse_spreads_and_preserves_mass() {
        let device = Default::default();
        let extent = GridExtent::new(15, 15, 15);
        let mut grid = VoxelGrid::filled(extent, 0.0f32);
        grid.set(7, 7, 7, 1.0);

        let image = Image::<B>::from_grid(&grid, Point3::origin(), Spacing3::new(1.0, 1.0, 1.0), &device);
        let out = GaussianFilter::<B>::new(1.0).apply(&image).to_grid().unwrap();

        let total: f32 = out.as_slice().iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(out.get(7, 7, 7) < 1.0);
        assert!(out.get(8, 7, 7) > 0.0);
        assert!((out.get(8, 7, 7) - out.get(7, 8, 7)).abs() < 1e-6);
        assert!((out.get(8, 7, 7) - out.get(7, 7, 6)).abs() < 1e-6);
    }

    #[test]
    fn test_zero_sigma_is_identity() {
        let device = Default::default();
        let extent = GridExtent::new(4, 3, 2);
        let grid = VoxelGrid::from_fn(extent, |x, y, z| (x * y + z) as f32);
        let out = GaussianFilter::<B>::new(0.0)
            .apply_grid(&grid, &Spacing3::new(1.0, 1.0, 1.0), &device)
            .unwrap();
        assert_eq!(out, grid);
    }
}
