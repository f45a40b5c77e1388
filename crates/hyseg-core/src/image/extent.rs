//! Grid extent and index arithmetic.
//!
//! Voxels are stored with `x` varying fastest: `index = x + y * width + z * width * height`.
//! Tensors holding a grid use the shape `[depth, height, width]`, which matches this layout.

use serde::{Deserialize, Serialize};

use crate::geometry::Point3;

/// Face-connected neighbor offsets `(dx, dy, dz)`.
pub const NEIGHBOR_OFFSETS: [(isize, isize, isize); 6] = [
    (-1, 0, 0),
    (1, 0, 0),
    (0, -1, 0),
    (0, 1, 0),
    (0, 0, -1),
    (0, 0, 1),
];

/// Size of a 3-D voxel grid along `x`, `y` and `z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridExtent {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl GridExtent {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self { width, height, depth }
    }

    /// Build an extent from a tensor shape `[depth, height, width]`.
    pub fn from_shape(shape: [usize; 3]) -> Self {
        Self::new(shape[2], shape[1], shape[0])
    }

    /// Tensor shape `[depth, height, width]`.
    pub fn shape(&self) -> [usize; 3] {
        [self.depth, self.height, self.width]
    }

    /// Number of voxels.
    pub fn len(&self) -> usize {
        self.width * self.height * self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + y * self.width + z * self.width * self.height
    }

    /// Inverse of [`GridExtent::index`], returns `[x, y, z]`.
    #[inline(always)]
    pub fn coords(&self, index: usize) -> [usize; 3] {
        let plane = self.width * self.height;
        let z = index / plane;
        let rem = index - z * plane;
        let y = rem / self.width;
        let x = rem - y * self.width;
        [x, y, z]
    }

    #[inline(always)]
    pub fn contains(&self, x: isize, y: isize, z: isize) -> bool {
        x >= 0
            && y >= 0
            && z >= 0
            && (x as usize) < self.width
            && (y as usize) < self.height
            && (z as usize) < self.depth
    }

    /// Index of the voxel at `(x + dx, y + dy, z + dz)` if it lies inside the grid.
    #[inline(always)]
    pub fn offset(&self, index: usize, (dx, dy, dz): (isize, isize, isize)) -> Option<usize> {
        let [x, y, z] = self.coords(index);
        let (nx, ny, nz) = (x as isize + dx, y as isize + dy, z as isize + dz);
        if self.contains(nx, ny, nz) {
            Some(self.index(nx as usize, ny as usize, nz as usize))
        } else {
            None
        }
    }

    /// Face neighbors of a voxel. Neighbors outside the grid are skipped, so a grid with
    /// `depth == 1` yields the 4-connected in-plane neighborhood.
    pub fn neighbors(&self, index: usize) -> impl Iterator<Item = usize> {
        let extent = *self;
        NEIGHBOR_OFFSETS
            .iter()
            .filter_map(move |&offset| extent.offset(index, offset))
    }

    /// Checkerboard colour of a voxel. Voxels of equal parity are never face neighbors.
    #[inline(always)]
    pub fn parity(&self, index: usize) -> usize {
        let [x, y, z] = self.coords(index);
        (x + y + z) & 1
    }

    /// Index of the voxel nearest to a continuous index, `None` outside the grid.
    pub fn nearest_index(&self, p: &Point3) -> Option<usize> {
        let (x, y, z) = (p.x.round(), p.y.round(), p.z.round());
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return None;
        }
        let (x, y, z) = (x as isize, y as isize, z as isize);
        if self.contains(x, y, z) {
            Some(self.index(x as usize, y as usize, z as usize))
        } else {
            None
        }
    }

    /// Clamp a continuous index into the grid bounds.
    pub fn clamp_point(&self, p: &Point3) -> Point3 {
        let clamp = |v: f64, n: usize| {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(0.0, n.saturating_sub(1) as f64)
            }
        };
        Point3::new(
            clamp(p.x, self.width),
            clamp(p.y, self.height),
            clamp(p.z, self.depth),
        )
    }

    /// Trilinear interpolation stencil `(index, weight)` at a continuous index.
    ///
    /// The point is clamped to the grid first, so the weights always sum to one.
    pub fn trilinear_stencil(&self, p: &Point3) -> [(usize, f64); 8] {
        let p = self.clamp_point(p);

        let x0 = p.x.floor() as usize;
        let y0 = p.y.floor() as usize;
        let z0 = p.z.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let z1 = (z0 + 1).min(self.depth - 1);

        let xd = p.x - x0 as f64;
        let yd = p.y - y0 as f64;
        let zd = p.z - z0 as f64;

        [
            (self.index(x0, y0, z0), (1.0 - xd) * (1.0 - yd) * (1.0 - zd)),
            (self.index(x1, y0, z0), xd * (1.0 - yd) * (1.0 - zd)),
            (self.index(x0, y1, z0), (1.0 - xd) * yd * (1.0 - zd)),
            (self.index(x1, y1, z0), xd * yd * (1.0 - zd)),
            (self.index(x0, y0, z1), (1.0 - xd) * (1.0 - yd) * zd),
            (self.index(x1, y0, z1), xd * (1.0 - yd) * zd),
            (self.index(x0, y1, z1), (1.0 - xd) * yd * zd),
            (self.index(x1, y1, z1), xd * yd * zd),
        ]
    }

    /// Geometric centre of the grid in index space.
    pub fn center(&self) -> Point3 {
        Point3::new(
            self.width.saturating_sub(1) as f64 / 2.0,
            self.height.saturating_sub(1) as f64 / 2.0,
            self.depth.saturating_sub(1) as f64 / 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_layout_is_x_fastest() {
        let extent = GridExtent::new(4, 3, 2);
        assert_eq!(extent.index(1, 0, 0), 1);
        assert_eq!(extent.index(0, 1, 0), 4);
        assert_eq!(extent.index(0, 0, 1), 12);
        assert_eq!(extent.coords(extent.index(3, 2, 1)), [3, 2, 1]);
    }

    #[test]
    fn test_shape_roundtrip() {
        let extent = GridExtent::new(5, 6, 7);
        assert_eq!(extent.shape(), [7, 6, 5]);
        assert_eq!(GridExtent::from_shape(extent.shape()), extent);
    }

    #[test]
    fn test_neighbors_interior_and_corner() {
        let extent = GridExtent::new(3, 3, 3);
        assert_eq!(extent.neighbors(extent.index(1, 1, 1)).count(), 6);
        assert_eq!(extent.neighbors(0).count(), 3);
    }

    #[test]
    fn test_planar_grid_has_four_neighbors() {
        let extent = GridExtent::new(5, 5, 1);
        assert_eq!(extent.neighbors(extent.index(2, 2, 0)).count(), 4);
    }

    #[test]
    fn test_parity_separates_neighbors() {
        let extent = GridExtent::new(4, 4, 4);
        for idx in 0..extent.len() {
            for n in extent.neighbors(idx) {
                assert_ne!(extent.parity(idx), extent.parity(n));
            }
        }
    }

    #[test]
    fn test_nearest_index_bounds() {
        let extent = GridExtent::new(4, 4, 4);
        assert_eq!(extent.nearest_index(&Point3::new(1.4, 2.6, 0.0)), Some(extent.index(1, 3, 0)));
        assert_eq!(extent.nearest_index(&Point3::new(-0.6, 0.0, 0.0)), None);
        assert_eq!(extent.nearest_index(&Point3::new(f64::NAN, 0.0, 0.0)), None);
    }

    #[test]
    fn test_trilinear_weights_sum_to_one() {
        let extent = GridExtent::new(4, 4, 4);
        for p in [
            Point3::new(1.25, 2.5, 0.75),
            Point3::new(3.0, 3.0, 3.0),
            Point3::new(-2.0, 9.0, 1.0),
        ] {
            let total: f64 = extent.trilinear_stencil(&p).iter().map(|(_, w)| w).sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
    }
}
