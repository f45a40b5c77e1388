//! Scan conversion of closed triangle meshes into voxel masks.

use crate::image::{GridExtent, VoxelGrid};
use super::TriangleMesh;

// Rays are cast slightly off the voxel centres so they do not pass exactly through
// mesh vertices or along shared edges, where a crossing would be counted twice.
const RAY_JITTER_X: f64 = 1.414_213_562e-4;
const RAY_JITTER_Y: f64 = 1.732_050_807e-4;

/// Mark the voxels whose centres lie inside a closed mesh given in grid index space.
///
/// A ray is cast along `+z` through every `(x, y)` column and crossings are paired by
/// parity. Open meshes produce an odd crossing count in some columns; the unmatched
/// final crossing is ignored there.
pub fn rasterize_interior(mesh: &TriangleMesh, extent: GridExtent) -> VoxelGrid<bool> {
    let mut mask = VoxelGrid::filled(extent, false);
    if extent.is_empty() || mesh.num_cells() == 0 {
        return mask;
    }

    let (w, h) = (extent.width, extent.height);
    let mut crossings: Vec<Vec<f64>> = vec![Vec::new(); w * h];
    let points = mesh.points();

    for &[ia, ib, ic] in mesh.cells() {
        let (a, b, c) = (points[ia], points[ib], points[ic]);

        let den = (b.y - c.y) * (a.x - c.x) + (c.x - b.x) * (a.y - c.y);
        if den.abs() < 1e-12 {
            // Parallel to the rays.
            continue;
        }

        let min_x = a.x.min(b.x).min(c.x).floor() - 1.0;
        let max_x = a.x.max(b.x).max(c.x).ceil() + 1.0;
        let min_y = a.y.min(b.y).min(c.y).floor() - 1.0;
        let max_y = a.y.max(b.y).max(c.y).ceil() + 1.0;
        if !(min_x.is_finite() && max_x.is_finite() && min_y.is_finite() && max_y.is_finite()) {
            continue;
        }
        let x0 = min_x.max(0.0) as usize;
        let y0 = min_y.max(0.0) as usize;
        if max_x < 0.0 || max_y < 0.0 {
            continue;
        }
        let x1 = (max_x as usize).min(w - 1);
        let y1 = (max_y as usize).min(h - 1);

        for y in y0..=y1 {
            let py = y as f64 + RAY_JITTER_Y;
            for x in x0..=x1 {
                let px = x as f64 + RAY_JITTER_X;
                let l1 = ((b.y - c.y) * (px - c.x) + (c.x - b.x) * (py - c.y)) / den;
                let l2 = ((c.y - a.y) * (px - c.x) + (a.x - c.x) * (py - c.y)) / den;
                let l3 = 1.0 - l1 - l2;
                if l1 >= 0.0 && l2 >= 0.0 && l3 >= 0.0 {
                    crossings[x + y * w].push(l1 * a.z + l2 * b.z + l3 * c.z);
                }
            }
        }
    }

    let max_z = extent.depth as f64 - 1.0;
    for (column, hits) in crossings.iter_mut().enumerate() {
        if hits.len() < 2 {
            continue;
        }
        hits.sort_by(|p, q| p.total_cmp(q));
        let (x, y) = (column % w, column / w);
        for pair in hits.chunks_exact(2) {
            let z_start = pair[0].ceil().max(0.0);
            let z_end = pair[1].floor().min(max_z);
            if z_end < z_start {
                continue;
            }
            for z in z_start as usize..=z_end as usize {
                mask.set(x, y, z, true);
            }
        }
    }

    mask
}
