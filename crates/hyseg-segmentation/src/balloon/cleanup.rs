//! Mesh repair passes run by the solver once deformation has settled into fitting.
//!
//! Each pass edits vertex positions in place and reports how many anomalies it found and
//! how many of them no longer show after the edit. Connectivity never changes.

use hyseg_core::geometry::{triangle_normal, Point3, Vector3};
use hyseg_core::TriangleMesh;

/// Outcome of one repair pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub detected: usize,
    pub resolved: usize,
}

impl CleanupReport {
    pub fn unresolved(&self) -> usize {
        self.detected - self.resolved
    }

    /// Sum of two reports.
    pub fn merge(self, other: CleanupReport) -> CleanupReport {
        CleanupReport {
            detected: self.detected + other.detected,
            resolved: self.resolved + other.resolved,
        }
    }
}

fn cell_normal(points: &[Point3], cell: [usize; 3]) -> Vector3 {
    triangle_normal(&points[cell[0]], &points[cell[1]], &points[cell[2]])
}

fn neighbor_centroid(mesh: &TriangleMesh, points: &[Point3], v: usize) -> Option<Point3> {
    let neighbors = mesh.vertex_neighbors(v);
    if neighbors.is_empty() {
        return None;
    }
    let sum = neighbors
        .iter()
        .fold(Vector3::zeros(), |acc, &n| acc + points[n].coords);
    Some(Point3::from(sum / neighbors.len() as f64))
}

fn mean_cell_normal(mesh: &TriangleMesh, points: &[Point3], v: usize) -> Vector3 {
    mesh.vertex_cells(v)
        .iter()
        .fold(Vector3::zeros(), |acc, &c| acc + cell_normal(points, mesh.cells()[c]))
}

fn is_folded(mesh: &TriangleMesh, points: &[Point3], v: usize, normal: &Vector3) -> bool {
    mesh.vertex_cells(v)
        .iter()
        .any(|&c| normal.dot(&cell_normal(points, mesh.cells()[c])) < 0.0)
}

/// Find vertices whose normal points against one of their adjacent cells and move each
/// onto the centroid of its neighbors.
///
/// Vertices are processed in index order and see the edits of earlier ones. A fold counts
/// as resolved when the relocated vertex agrees with all of its cells again.
pub fn acd_search(mesh: &TriangleMesh, points: &mut [Point3], normals: &[Vector3]) -> CleanupReport {
    let mut report = CleanupReport::default();
    for v in 0..mesh.num_vertices() {
        if !is_folded(mesh, points, v, &normals[v]) {
            continue;
        }
        report.detected += 1;
        if let Some(centroid) = neighbor_centroid(mesh, points, v) {
            points[v] = centroid;
        }
        let normal = mean_cell_normal(mesh, points, v);
        if !is_folded(mesh, points, v, &normal) {
            report.resolved += 1;
        }
    }
    report
}

/// Find edges longer than `gap_factor` times the mean edge length and pull both endpoints
/// symmetrically towards the midpoint until the edge is exactly that long.
///
/// A gap counts as resolved when it is still within the limit after the whole pass.
pub fn gap_search(mesh: &TriangleMesh, points: &mut [Point3], gap_factor: f64) -> CleanupReport {
    let edges = mesh.edges();
    let limit = gap_factor * mesh.mean_edge_length_at(points);
    if !(limit > 0.0) {
        return CleanupReport::default();
    }

    let mut gaps = Vec::new();
    for &(a, b) in &edges {
        let length = (points[b] - points[a]).norm();
        if length <= limit {
            continue;
        }
        gaps.push((a, b));
        let mid = Point3::from((points[a].coords + points[b].coords) * 0.5);
        let scale = limit / length;
        points[a] = mid + (points[a] - mid) * scale;
        points[b] = mid + (points[b] - mid) * scale;
    }

    let tolerance = limit * 1e-9;
    let resolved = gaps
        .iter()
        .filter(|&&(a, b)| (points[b] - points[a]).norm() <= limit + tolerance)
        .count();
    CleanupReport {
        detected: gaps.len(),
        resolved,
    }
}

/// Tangential offset of a vertex from its neighbor centroid, in the plane of `normal`.
fn tangential_offset(mesh: &TriangleMesh, points: &[Point3], v: usize, normal: &Vector3) -> Vector3 {
    match neighbor_centroid(mesh, points, v) {
        Some(centroid) => {
            let delta = centroid - points[v];
            delta - normal * normal.dot(&delta)
        }
        None => Vector3::zeros(),
    }
}

fn mean_neighbor_distance(mesh: &TriangleMesh, points: &[Point3], v: usize) -> f64 {
    let neighbors = mesh.vertex_neighbors(v);
    if neighbors.is_empty() {
        return 0.0;
    }
    neighbors
        .iter()
        .map(|&n| (points[n] - points[v]).norm())
        .sum::<f64>()
        / neighbors.len() as f64
}

const REARRANGE_TOLERANCE: f64 = 0.1;

/// Relax unevenly spaced vertices along the surface.
///
/// A vertex is irregular when its tangential offset from the neighbor centroid exceeds a
/// tenth of its mean neighbor distance. All irregular vertices move half of that offset at
/// once; the report counts those that fall back within tolerance.
pub fn nodes_rearrange(mesh: &TriangleMesh, points: &mut [Point3], normals: &[Vector3]) -> CleanupReport {
    let moves: Vec<(usize, Vector3, f64)> = (0..mesh.num_vertices())
        .filter_map(|v| {
            let offset = tangential_offset(mesh, points, v, &normals[v]);
            let limit = REARRANGE_TOLERANCE * mean_neighbor_distance(mesh, points, v);
            (offset.norm() > limit).then_some((v, offset, limit))
        })
        .collect();

    for &(v, offset, _) in &moves {
        points[v] += offset * 0.5;
    }

    let resolved = moves
        .iter()
        .filter(|&&(v, _, limit)| tangential_offset(mesh, points, v, &normals[v]).norm() <= limit)
        .count();
    CleanupReport {
        detected: moves.len(),
        resolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyseg_core::mesh::icosphere;

    fn any_tangent(normal: &Vector3) -> Vector3 {
        normal
            .cross(&Vector3::z())
            .try_normalize(1e-9)
            .unwrap_or_else(Vector3::x)
    }

    #[test]
    fn test_clean_sphere_has_no_folds_or_gaps() {
        let mesh = icosphere(Point3::origin(), 5.0, 1).unwrap();
        let mut points = mesh.points().to_vec();
        let normals = mesh.vertex_normals();
        assert_eq!(acd_search(&mesh, &mut points, &normals), CleanupReport::default());
        assert_eq!(gap_search(&mesh, &mut points, 2.0), CleanupReport::default());
        assert_eq!(points, mesh.points());
    }

    #[test]
    fn test_fold_is_relocated() {
        let mesh = icosphere(Point3::origin(), 5.0, 1).unwrap();
        let mut points = mesh.points().to_vec();
        let normals = mesh.vertex_normals();
        // Drag a vertex sideways past its ring of neighbors so some of its cells flip.
        points[0] += any_tangent(&normals[0]) * 8.0;

        let report = acd_search(&mesh, &mut points, &normals);
        assert!(report.detected >= 1);
        let centroid = neighbor_centroid(&mesh, mesh.points(), 0).unwrap();
        assert!((points[0] - centroid).norm() < 1e-9);
    }

    #[test]
    fn test_gap_is_shortened() {
        let mesh = icosphere(Point3::origin(), 5.0, 0).unwrap();
        let mut points = mesh.points().to_vec();
        let (a, b) = mesh.edges()[0];
        let dir = points[a] - Point3::origin();
        points[a] += dir * 3.0;

        let report = gap_search(&mesh, &mut points, 1.5);
        assert!(report.detected >= 1);
        assert!(report.resolved >= 1);
        assert!(report.resolved <= report.detected);
        let length = (points[b] - points[a]).norm();
        assert!(length < (mesh.points()[b] - (mesh.points()[a] + dir * 3.0)).norm());
    }

    #[test]
    fn test_gap_reopened_by_later_edge_stays_in_geometry() {
        // A sliver pair of cells: shortening (1, 2) drags vertex 1 and stretches (0, 1) again.
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(20.0, 0.0, 0.0),
            Point3::new(10.0, 1.0, 0.0),
        ];
        let mesh = TriangleMesh::new(points, vec![[0, 1, 3], [1, 2, 3]]).unwrap();
        let limit = mesh.mean_edge_length_at(mesh.points());
        let mut points = mesh.points().to_vec();

        let report = gap_search(&mesh, &mut points, 1.0);
        assert_eq!(report.detected, 4);
        assert!(report.unresolved() > 0);
        let length = (points[1] - points[0]).norm();
        assert!(length > limit * 1.05, "edge (0, 1) has length {}", length);
        assert!(points.iter().all(|p| p.x.is_finite() && p.y.is_finite()));
    }

    #[test]
    fn test_rearrange_moves_displaced_vertex_towards_centroid() {
        let mesh = icosphere(Point3::origin(), 5.0, 1).unwrap();
        let normals = mesh.vertex_normals();
        let mut points = mesh.points().to_vec();
        points[0] += any_tangent(&normals[0]);
        let before = tangential_offset(&mesh, &points, 0, &normals[0]).norm();

        let report = nodes_rearrange(&mesh, &mut points, &normals);
        assert!(report.detected >= 1);
        let after = tangential_offset(&mesh, &points, 0, &normals[0]).norm();
        assert!(after < before);
    }

    #[test]
    fn test_report_merge() {
        let a = CleanupReport { detected: 3, resolved: 2 };
        let b = CleanupReport { detected: 1, resolved: 1 };
        let merged = a.merge(b);
        assert_eq!(merged, CleanupReport { detected: 4, resolved: 3 });
        assert_eq!(merged.unresolved(), 1);
    }
}
