//! Per-label intensity statistics.

use hyseg_core::{Label, LabelGrid, VoxelGrid};

/// Intensity statistics of the voxels currently carrying one label.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStatistics {
    pub label: Label,
    pub count: usize,
    pub mean: f64,
    /// Population variance, floored at the labeller's variance floor.
    pub variance: f64,
    /// Intensity difference above which two neighbors are separated by an edge.
    pub boundary_gradient: f64,
}

impl RegionStatistics {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Compute statistics for labels `0..classes`.
///
/// Voxels with labels outside that range are ignored. `boundary_gradient > 0` is used
/// as-is for every class; otherwise each class gets half the smallest mean difference to
/// another non-empty class, or infinity when there is none.
pub fn compute_statistics(
    intensity: &VoxelGrid<f32>,
    labels: &LabelGrid,
    classes: usize,
    boundary_gradient: f64,
    variance_floor: f64,
) -> Vec<RegionStatistics> {
    let mut count = vec![0usize; classes];
    let mut sum = vec![0.0f64; classes];
    let mut sum_sq = vec![0.0f64; classes];

    for (&value, &label) in intensity.as_slice().iter().zip(labels.as_slice()) {
        let l = label as usize;
        if l < classes {
            let v = value as f64;
            count[l] += 1;
            sum[l] += v;
            sum_sq[l] += v * v;
        }
    }

    let mut stats: Vec<RegionStatistics> = (0..classes)
        .map(|l| {
            let (mean, variance) = if count[l] == 0 {
                (0.0, variance_floor)
            } else {
                let n = count[l] as f64;
                let mean = sum[l] / n;
                let variance = (sum_sq[l] / n - mean * mean).max(0.0);
                (mean, variance.max(variance_floor))
            };
            RegionStatistics {
                label: l as Label,
                count: count[l],
                mean,
                variance,
                boundary_gradient: f64::INFINITY,
            }
        })
        .collect();

    for l in 0..classes {
        if stats[l].is_empty() {
            continue;
        }
        stats[l].boundary_gradient = if boundary_gradient > 0.0 {
            boundary_gradient
        } else {
            let mean = stats[l].mean;
            stats
                .iter()
                .filter(|s| s.label as usize != l && !s.is_empty())
                .map(|s| 0.5 * (s.mean - mean).abs())
                .fold(f64::INFINITY, f64::min)
        };
    }

    stats
}

/// Smallest boundary threshold over the non-empty classes.
pub fn edge_threshold(stats: &[RegionStatistics]) -> f64 {
    stats
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.boundary_gradient)
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyseg_core::GridExtent;

    fn fixture() -> (VoxelGrid<f32>, LabelGrid) {
        let extent = GridExtent::new(4, 1, 1);
        let intensity = VoxelGrid::from_vec(extent, vec![0.0, 2.0, 10.0, 12.0]).unwrap();
        let labels = LabelGrid::from_vec(extent, vec![0, 0, 1, 1]).unwrap();
        (intensity, labels)
    }

    #[test]
    fn test_mean_variance_and_count() {
        let (intensity, labels) = fixture();
        let stats = compute_statistics(&intensity, &labels, 2, 0.0, 1e-6);
        assert_eq!(stats[0].count, 2);
        assert!((stats[0].mean - 1.0).abs() < 1e-12);
        assert!((stats[0].variance - 1.0).abs() < 1e-12);
        assert!((stats[1].mean - 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_automatic_boundary_gradient() {
        let (intensity, labels) = fixture();
        let stats = compute_statistics(&intensity, &labels, 2, 0.0, 1e-6);
        assert!((stats[0].boundary_gradient - 5.0).abs() < 1e-12);
        assert!((edge_threshold(&stats) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_configured_boundary_gradient() {
        let (intensity, labels) = fixture();
        let stats = compute_statistics(&intensity, &labels, 2, 3.0, 1e-6);
        assert_eq!(stats[1].boundary_gradient, 3.0);
    }

    #[test]
    fn test_empty_class_and_variance_floor() {
        let (intensity, labels) = fixture();
        let stats = compute_statistics(&intensity, &labels, 3, 0.0, 0.5);
        assert!(stats[2].is_empty());
        assert_eq!(stats[2].variance, 0.5);
        assert_eq!(stats[2].boundary_gradient, f64::INFINITY);
        assert!((edge_threshold(&stats) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_class_has_no_edges() {
        let (intensity, _) = fixture();
        let labels = LabelGrid::filled(intensity.extent(), 1);
        let stats = compute_statistics(&intensity, &labels, 2, 0.0, 1e-6);
        assert_eq!(edge_threshold(&stats), f64::INFINITY);
    }
}
