//! Geometric primitives shared by grids and meshes.
//!
//! Coordinates are `f64` nalgebra types. Grid index space uses `(x, y, z)` ordering.

use nalgebra::{Matrix3 as NaMatrix3, Point3 as NaPoint3, Vector3 as NaVector3};

pub type Point3 = NaPoint3<f64>;
pub type Vector3 = NaVector3<f64>;
pub type Spacing3 = NaVector3<f64>;
pub type Matrix3 = NaMatrix3<f64>;

/// Unit normal of the triangle `(a, b, c)`, counter-clockwise seen from its front.
///
/// Degenerate triangles yield the zero vector.
pub fn triangle_normal(a: &Point3, b: &Point3, c: &Point3) -> Vector3 {
    let n = (b - a).cross(&(c - a));
    let norm = n.norm();
    if norm > 1e-12 {
        n / norm
    } else {
        Vector3::zeros()
    }
}

/// Interior angle of the triangle at vertex `at`, between the edges towards `p` and `q`.
pub fn corner_angle(at: &Point3, p: &Point3, q: &Point3) -> f64 {
    let u = p - at;
    let v = q - at;
    let denom = u.norm() * v.norm();
    if denom <= 1e-12 {
        return 0.0;
    }
    (u.dot(&v) / denom).clamp(-1.0, 1.0).acos()
}
