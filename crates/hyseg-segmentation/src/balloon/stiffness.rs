//! Elastic coupling between mesh vertices.
//!
//! Three 3x3 base matrices, scaled copies of the centred projector
//! `P = [[1, -1/2, -1/2], [-1/2, 1, -1/2], [-1/2, -1/2, 1]]`, describe how the corners of a
//! triangle resist relative motion. The operator assembled from them over the rest geometry
//! is a weighted graph Laplacian: `(K U)_i = sum_j w_ij (U_i - U_j)`. Its rows sum to zero,
//! so a rigid translation of the whole mesh produces no elastic force.

use rayon::prelude::*;

use hyseg_core::geometry::{corner_angle, Matrix3, Point3, Vector3};
use hyseg_core::TriangleMesh;

const MAX_COTANGENT: f64 = 2.0;
const MAX_LENGTH_RATIO: f64 = 4.0;

/// Normal, shear and corner stiffness matrices built from two coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StiffnessMatrices {
    pub normal: Matrix3,
    pub shear: Matrix3,
    pub corner: Matrix3,
}

impl StiffnessMatrices {
    pub fn new(a: f64, b: f64) -> Self {
        let p = Matrix3::new(
            1.0, -0.5, -0.5,
            -0.5, 1.0, -0.5,
            -0.5, -0.5, 1.0,
        );
        Self {
            normal: p * a,
            shear: p * b,
            corner: p * (0.5 * (a + b)),
        }
    }
}

/// Sparse symmetric stiffness operator over mesh vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct StiffnessOperator {
    /// Per vertex, `(neighbor, weight)` sorted by neighbor.
    rows: Vec<Vec<(usize, f64)>>,
}

impl StiffnessOperator {
    /// Assemble the operator from the mesh connectivity and the rest positions.
    ///
    /// Edge `(r, s)` of a cell with opposite angle `theta` and mean edge length `l_mean`
    /// contributes `-(N_rs + S_rs * cot(theta) + C_rs * (l_mean / l_rs)^2)` with the
    /// cotangent clamped to `[0, 2]` and the length ratio to `[0, 4]`.
    pub fn assemble(mesh: &TriangleMesh, rest: &[Point3], matrices: &StiffnessMatrices) -> Self {
        let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); mesh.num_vertices()];

        for cell in mesh.cells() {
            let corners = [rest[cell[0]], rest[cell[1]], rest[cell[2]]];
            let lengths = [
                (corners[1] - corners[0]).norm(),
                (corners[2] - corners[1]).norm(),
                (corners[0] - corners[2]).norm(),
            ];
            let mean_length = lengths.iter().sum::<f64>() / 3.0;

            for (r, s, t) in [(0usize, 1usize, 2usize), (1, 2, 0), (2, 0, 1)] {
                let theta = corner_angle(&corners[t], &corners[r], &corners[s]);
                let cot = if theta.sin() > 1e-12 {
                    (theta.cos() / theta.sin()).clamp(0.0, MAX_COTANGENT)
                } else {
                    MAX_COTANGENT
                };
                let length = (corners[s] - corners[r]).norm();
                let ratio = if length > 1e-12 {
                    ((mean_length / length).powi(2)).clamp(0.0, MAX_LENGTH_RATIO)
                } else {
                    MAX_LENGTH_RATIO
                };
                let w = -(matrices.normal[(r, s)]
                    + matrices.shear[(r, s)] * cot
                    + matrices.corner[(r, s)] * ratio);

                let (i, j) = (cell[r], cell[s]);
                add_weight(&mut rows[i], j, w);
                add_weight(&mut rows[j], i, w);
            }
        }

        for row in &mut rows {
            row.sort_unstable_by_key(|&(j, _)| j);
        }
        Self { rows }
    }

    pub fn num_vertices(&self) -> usize {
        self.rows.len()
    }

    /// Coupling weight between two vertices, zero when they share no edge.
    pub fn weight(&self, i: usize, j: usize) -> f64 {
        self.rows[i]
            .binary_search_by_key(&j, |&(k, _)| k)
            .map(|pos| self.rows[i][pos].1)
            .unwrap_or(0.0)
    }

    /// Elastic force term `K U` for per-vertex displacements `u`.
    pub fn apply(&self, u: &[Vector3]) -> Vec<Vector3> {
        self.rows
            .par_iter()
            .enumerate()
            .map(|(i, row)| {
                row.iter()
                    .fold(Vector3::zeros(), |acc, &(j, w)| acc + (u[i] - u[j]) * w)
            })
            .collect()
    }
}

fn add_weight(row: &mut Vec<(usize, f64)>, j: usize, w: f64) {
    match row.iter_mut().find(|(k, _)| *k == j) {
        Some((_, total)) => *total += w,
        None => row.push((j, w)),
    }
}
