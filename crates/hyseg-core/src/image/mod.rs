//! Image types and voxel grids.
//!
//! [`Image`] keeps volumes on a burn backend for filtering. [`VoxelGrid`] is the
//! host-side buffer the voxel-wise algorithms work on.

pub mod extent;
pub mod image;
pub mod voxel_grid;

pub use extent::{GridExtent, NEIGHBOR_OFFSETS};
pub use image::Image;
pub use voxel_grid::{Label, LabelGrid, VoxelGrid};
