//! Icosphere generation for initial deformable surfaces.

use std::collections::HashMap;

use crate::error::Result;
use crate::geometry::{Point3, Vector3};
use super::TriangleMesh;

/// Closed sphere mesh made by subdividing an icosahedron `subdivisions` times.
///
/// Level 0 has 12 vertices and 20 cells; every level multiplies the cell count by four.
/// Cells are oriented so their normals point away from `center`.
pub fn icosphere(center: Point3, radius: f64, subdivisions: usize) -> Result<TriangleMesh> {
    let (directions, cells) = unit_icosphere(subdivisions);
    let points = directions
        .into_iter()
        .map(|d| center + d * radius)
        .collect();
    TriangleMesh::new(points, cells)
}

fn unit_icosphere(subdivisions: usize) -> (Vec<Vector3>, Vec<[usize; 3]>) {
    let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;

    let mut vertices: Vec<Vector3> = [
        [-1.0, phi, 0.0], [1.0, phi, 0.0], [-1.0, -phi, 0.0], [1.0, -phi, 0.0],
        [0.0, -1.0, phi], [0.0, 1.0, phi], [0.0, -1.0, -phi], [0.0, 1.0, -phi],
        [phi, 0.0, -1.0], [phi, 0.0, 1.0], [-phi, 0.0, -1.0], [-phi, 0.0, 1.0],
    ]
    .iter()
    .map(|&[x, y, z]| Vector3::new(x, y, z).normalize())
    .collect();

    let mut cells: Vec<[usize; 3]> = vec![
        [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
        [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
        [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
        [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut refined = Vec::with_capacity(cells.len() * 4);

        let mut midpoint = |a: usize, b: usize, vertices: &mut Vec<Vector3>| -> usize {
            *midpoints.entry((a.min(b), a.max(b))).or_insert_with(|| {
                let mid = ((vertices[a] + vertices[b]) * 0.5).normalize();
                vertices.push(mid);
                vertices.len() - 1
            })
        };

        for &[v0, v1, v2] in &cells {
            let m01 = midpoint(v0, v1, &mut vertices);
            let m12 = midpoint(v1, v2, &mut vertices);
            let m20 = midpoint(v2, v0, &mut vertices);

            refined.push([v0, m01, m20]);
            refined.push([v1, m12, m01]);
            refined.push([v2, m20, m12]);
            refined.push([m01, m12, m20]);
        }
        cells = refined;
    }

    (vertices, cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_and_cell_counts() {
        let m0 = icosphere(Point3::origin(), 1.0, 0).unwrap();
        assert_eq!((m0.num_vertices(), m0.num_cells()), (12, 20));
        let m2 = icosphere(Point3::origin(), 1.0, 2).unwrap();
        assert_eq!((m2.num_vertices(), m2.num_cells()), (162, 320));
        assert!(m2.is_closed());
    }

    #[test]
    fn test_vertices_lie_on_sphere() {
        let center = Point3::new(20.0, 20.0, 20.0);
        let mesh = icosphere(center, 4.0, 1).unwrap();
        for p in mesh.points() {
            assert!(((p - center).norm() - 4.0).abs() < 1e-10);
        }
    }

    #[test]
    fn test_normals_point_away_from_center() {
        let center = Point3::new(1.0, 2.0, 3.0);
        let mesh = icosphere(center, 2.0, 1).unwrap();
        for (p, n) in mesh.points().iter().zip(mesh.vertex_normals()) {
            assert!((p - center).normalize().dot(&n) > 0.9);
        }
    }
}
