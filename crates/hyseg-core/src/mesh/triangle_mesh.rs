//! Indexed triangle mesh with derived connectivity.

use rayon::prelude::*;

use crate::error::{CoreError, Result};
use crate::geometry::{triangle_normal, Point3, Vector3};

/// Triangle mesh: vertex positions plus cells of three vertex indices.
///
/// Cells are oriented counter-clockwise seen from outside, so [`triangle_normal`]
/// points away from the enclosed volume. Vertex-to-cell and vertex-to-vertex adjacency
/// are derived once at construction and never change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleMesh {
    points: Vec<Point3>,
    cells: Vec<[usize; 3]>,
    vertex_cells: Vec<Vec<usize>>,
    vertex_neighbors: Vec<Vec<usize>>,
}

impl TriangleMesh {
    /// Build a mesh, rejecting cells that reference missing vertices or repeat a vertex.
    pub fn new(points: Vec<Point3>, cells: Vec<[usize; 3]>) -> Result<Self> {
        let n = points.len();
        for (c, cell) in cells.iter().enumerate() {
            if let Some(&v) = cell.iter().find(|&&v| v >= n) {
                return Err(CoreError::invalid_mesh(format!(
                    "cell {} references vertex {} but the mesh has {} vertices",
                    c, v, n
                )));
            }
            if cell[0] == cell[1] || cell[1] == cell[2] || cell[0] == cell[2] {
                return Err(CoreError::invalid_mesh(format!(
                    "cell {} repeats a vertex: {:?}",
                    c, cell
                )));
            }
        }

        let mut vertex_cells = vec![Vec::new(); n];
        let mut vertex_neighbors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (c, &[a, b, d]) in cells.iter().enumerate() {
            for &v in &[a, b, d] {
                vertex_cells[v].push(c);
            }
            for &(p, q) in &[(a, b), (b, d), (d, a)] {
                if !vertex_neighbors[p].contains(&q) {
                    vertex_neighbors[p].push(q);
                }
                if !vertex_neighbors[q].contains(&p) {
                    vertex_neighbors[q].push(p);
                }
            }
        }
        for list in &mut vertex_neighbors {
            list.sort_unstable();
        }

        Ok(Self {
            points,
            cells,
            vertex_cells,
            vertex_neighbors,
        })
    }

    /// Same connectivity with different vertex positions.
    pub fn with_points(&self, points: Vec<Point3>) -> Result<Self> {
        if points.len() != self.points.len() {
            return Err(CoreError::ShapeMismatch {
                expected: vec![self.points.len()],
                actual: vec![points.len()],
            });
        }
        Ok(Self {
            points,
            cells: self.cells.clone(),
            vertex_cells: self.vertex_cells.clone(),
            vertex_neighbors: self.vertex_neighbors.clone(),
        })
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    pub fn cells(&self) -> &[[usize; 3]] {
        &self.cells
    }

    pub fn num_vertices(&self) -> usize {
        self.points.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Cells that contain vertex `v`.
    pub fn vertex_cells(&self, v: usize) -> &[usize] {
        &self.vertex_cells[v]
    }

    /// Vertices sharing an edge with vertex `v`, sorted ascending.
    pub fn vertex_neighbors(&self, v: usize) -> &[usize] {
        &self.vertex_neighbors[v]
    }

    /// Unique undirected edges `(a, b)` with `a < b`, sorted.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges: Vec<(usize, usize)> = self
            .vertex_neighbors
            .iter()
            .enumerate()
            .flat_map(|(a, list)| list.iter().filter(move |&&b| a < b).map(move |&b| (a, b)))
            .collect();
        edges.sort_unstable();
        edges
    }

    /// True when every edge is shared by exactly two cells.
    pub fn is_closed(&self) -> bool {
        if self.cells.is_empty() {
            return false;
        }
        let mut counts = std::collections::HashMap::new();
        for &[a, b, c] in &self.cells {
            for &(p, q) in &[(a, b), (b, c), (c, a)] {
                *counts.entry((p.min(q), p.max(q))).or_insert(0usize) += 1;
            }
        }
        counts.values().all(|&n| n == 2)
    }

    pub fn cell_normal(&self, cell: usize) -> Vector3 {
        cell_normal_at(&self.points, self.cells[cell])
    }

    /// Per-vertex outward normals of the mesh's own positions.
    pub fn vertex_normals(&self) -> Vec<Vector3> {
        self.vertex_normals_at(&self.points)
    }

    /// Per-vertex normals for alternative positions sharing this connectivity.
    ///
    /// Each normal is the unweighted mean of the adjacent cell normals, rescaled to unit
    /// length. Vertices without cells, or whose cell normals cancel, get the zero vector.
    pub fn vertex_normals_at(&self, points: &[Point3]) -> Vec<Vector3> {
        self.vertex_cells
            .par_iter()
            .map(|cells| {
                if cells.is_empty() {
                    return Vector3::zeros();
                }
                let sum = cells
                    .iter()
                    .fold(Vector3::zeros(), |acc, &c| acc + cell_normal_at(points, self.cells[c]));
                let mean = sum / cells.len() as f64;
                let norm = mean.norm();
                if norm > 1e-10 {
                    mean / norm
                } else {
                    Vector3::zeros()
                }
            })
            .collect()
    }

    pub fn mean_edge_length(&self) -> f64 {
        self.mean_edge_length_at(&self.points)
    }

    /// Mean length of the unique edges at the given positions, zero without edges.
    pub fn mean_edge_length_at(&self, points: &[Point3]) -> f64 {
        let edges = self.edges();
        if edges.is_empty() {
            return 0.0;
        }
        edges
            .iter()
            .map(|&(a, b)| (points[b] - points[a]).norm())
            .sum::<f64>()
            / edges.len() as f64
    }

    /// Mean of the vertex positions.
    pub fn centroid(&self) -> Point3 {
        if self.points.is_empty() {
            return Point3::origin();
        }
        let sum = self
            .points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords);
        Point3::from(sum / self.points.len() as f64)
    }

    /// Axis-aligned bounds `(min, max)`, `None` for a mesh without vertices.
    pub fn bounding_box(&self) -> Option<(Point3, Point3)> {
        let first = *self.points.first()?;
        Some(self.points.iter().fold((first, first), |(lo, hi), p| {
            (
                Point3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z)),
                Point3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z)),
            )
        }))
    }
}

fn cell_normal_at(points: &[Point3], [a, b, c]: [usize; 3]) -> Vector3 {
    triangle_normal(&points[a], &points[b], &points[c])
}
