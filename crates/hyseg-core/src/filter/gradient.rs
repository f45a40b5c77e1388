//! Finite-difference gradient of a scalar grid.

use crate::geometry::{Spacing3, Vector3};
use crate::image::VoxelGrid;

/// Gradient of `grid` using central differences in the interior and one-sided
/// differences on the border. Derivatives are divided by `spacing`; pass unit spacing
/// for index-space gradients.
pub fn gradient(grid: &VoxelGrid<f32>, spacing: &Spacing3) -> VoxelGrid<Vector3> {
    let extent = grid.extent();
    let data = grid.as_slice();
    let (nx, ny, nz) = (extent.width, extent.height, extent.depth);
    let plane = nx * ny;

    // Difference along one axis given the coordinate, axis length and index stride.
    let diff = |idx: usize, c: usize, n: usize, stride: usize, h: f64| -> f64 {
        if n < 2 {
            return 0.0;
        }
        let (lo, hi, span) = if c == 0 {
            (idx, idx + stride, 1.0)
        } else if c + 1 == n {
            (idx - stride, idx, 1.0)
        } else {
            (idx - stride, idx + stride, 2.0)
        };
        (data[hi] as f64 - data[lo] as f64) / (span * h)
    };

    VoxelGrid::from_fn(extent, |x, y, z| {
        let idx = x + y * nx + z * plane;
        Vector3::new(
            diff(idx, x, nx, 1, spacing.x),
            diff(idx, y, ny, nx, spacing.y),
            diff(idx, z, nz, plane, spacing.z),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::GridExtent;

    #[test]
    fn test_linear_ramp_has_constant_gradient() {
        let extent = GridExtent::new(5, 4, 3);
        let grid = VoxelGrid::from_fn(extent, |x, y, z| (2 * x + 3 * y) as f32 - z as f32);
        let g = gradient(&grid, &Spacing3::new(1.0, 1.0, 1.0));
        for v in g.as_slice() {
            assert!((v - Vector3::new(2.0, 3.0, -1.0)).norm() < 1e-9);
        }
    }

    #[test]
    fn test_spacing_scales_gradient() {
        let extent = GridExtent::new(4, 1, 1);
        let grid = VoxelGrid::from_fn(extent, |x, _, _| x as f32);
        let g = gradient(&grid, &Spacing3::new(0.5, 1.0, 1.0));
        assert!((g.get(1, 0, 0).x - 2.0).abs() < 1e-9);
        assert_eq!(g.get(1, 0, 0).y, 0.0);
    }
}
