//! Force fields derived from the labelling and the intensity image.
//!
//! Both fields live in grid index space and are rebuilt by the coordinator after every
//! labeller run.

use burn::tensor::backend::Backend;
use hyseg_core::filter::{gradient, GaussianFilter};
use hyseg_core::geometry::{Point3, Spacing3, Vector3};
use hyseg_core::{Label, LabelGrid, VoxelGrid};

use crate::config::FieldSampling;
use crate::error::Result;
use crate::gibbs::RegionStatistics;

/// Signed potential in `[-1, 1]`: positive inside the labelled object, negative outside,
/// zero at the estimated boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct PotentialField {
    grid: VoxelGrid<f32>,
}

impl PotentialField {
    /// Smooth the object indicator with a Gaussian of `sigma` physical units and map
    /// `S` in `[0, 1]` to `2 S - 1`.
    pub fn from_labels<B: Backend>(
        labels: &LabelGrid,
        object_label: Label,
        sigma: f64,
        spacing: &Spacing3,
        device: &B::Device,
    ) -> Result<Self> {
        let indicator = labels.map(|l| if l == object_label { 1.0f32 } else { 0.0 });
        let smoothed = GaussianFilter::<B>::new(sigma).apply_grid(&indicator, spacing, device)?;
        Ok(Self {
            grid: smoothed.map(|s| (2.0 * s - 1.0).clamp(-1.0, 1.0)),
        })
    }

    /// Use a precomputed potential as-is.
    pub fn from_grid(grid: VoxelGrid<f32>) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> &VoxelGrid<f32> {
        &self.grid
    }

    pub fn sample(&self, p: &Point3, sampling: FieldSampling) -> f64 {
        match sampling {
            FieldSampling::Linear => self.grid.sample_linear(p),
            FieldSampling::Nearest => self.grid.sample_nearest(p) as f64,
        }
    }
}

/// Index-space gradient of the smoothed, statistics-normalized intensity.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientField {
    grid: VoxelGrid<Vector3>,
}

impl GradientField {
    /// Normalize intensities to `clamp((I - mean_bg) / (mean_obj - mean_bg), 0, 1)` using the
    /// background (label 0) and object statistics, smooth, and differentiate.
    ///
    /// When either class is empty or their means coincide, the intensity range is used
    /// for normalization instead.
    pub fn from_intensity<B: Backend>(
        intensity: &VoxelGrid<f32>,
        stats: &[RegionStatistics],
        object_label: Label,
        sigma: f64,
        spacing: &Spacing3,
        device: &B::Device,
    ) -> Result<Self> {
        let (low, high) = normalization_range(intensity, stats, object_label);
        let span = high - low;
        let normalized = intensity.map(|v| {
            if span.abs() < 1e-12 {
                0.0
            } else {
                ((v as f64 - low) / span).clamp(0.0, 1.0) as f32
            }
        });
        let smoothed = GaussianFilter::<B>::new(sigma).apply_grid(&normalized, spacing, device)?;
        Ok(Self {
            grid: gradient(&smoothed, &Spacing3::new(1.0, 1.0, 1.0)),
        })
    }

    /// Use a precomputed gradient as-is.
    pub fn from_grid(grid: VoxelGrid<Vector3>) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> &VoxelGrid<Vector3> {
        &self.grid
    }

    pub fn sample(&self, p: &Point3, sampling: FieldSampling) -> Vector3 {
        match sampling {
            FieldSampling::Linear => self.grid.sample_linear(p),
            FieldSampling::Nearest => self.grid.sample_nearest(p),
        }
    }

    /// Gradient magnitude at `p`.
    pub fn magnitude(&self, p: &Point3, sampling: FieldSampling) -> f64 {
        self.sample(p, sampling).norm()
    }
}

fn normalization_range(
    intensity: &VoxelGrid<f32>,
    stats: &[RegionStatistics],
    object_label: Label,
) -> (f64, f64) {
    let background = stats.first().filter(|s| !s.is_empty());
    let object = stats.get(object_label as usize).filter(|s| !s.is_empty());
    if let (Some(bg), Some(obj)) = (background, object) {
        if (obj.mean - bg.mean).abs() > 1e-12 {
            return (bg.mean, obj.mean);
        }
    }
    let (min, max) = intensity
        .as_slice()
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v as f64), hi.max(v as f64))
        });
    (min, max)
}
