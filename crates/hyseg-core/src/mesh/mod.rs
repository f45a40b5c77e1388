//! Triangle meshes used as deformable surfaces.

pub mod icosphere;
pub mod raster;
pub mod triangle_mesh;

pub use icosphere::icosphere;
pub use raster::rasterize_interior;
pub use triangle_mesh::TriangleMesh;
