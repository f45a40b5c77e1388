//! Core data types for hybrid deformable-model segmentation.
//!
//! Provides voxel grids and the burn-backed intensity [`Image`], separable Gaussian and
//! finite-difference filters, and triangle meshes with the geometry helpers the
//! deformable model needs.

pub mod error;
pub mod filter;
pub mod geometry;
pub mod image;
pub mod mesh;

pub use error::{CoreError, Result};
pub use geometry::{Point3, Spacing3, Vector3};
pub use image::{GridExtent, Image, Label, LabelGrid, VoxelGrid};
pub use mesh::TriangleMesh;
