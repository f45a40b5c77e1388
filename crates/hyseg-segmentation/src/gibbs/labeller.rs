//! Iterated Conditional Modes labeller with a Gibbs prior.

use rayon::prelude::*;
use tracing::debug;

use hyseg_core::{Label, LabelGrid, VoxelGrid};

use super::energy::EnergyModel;
use super::eraser::erase_small_regions;
use super::statistics::{compute_statistics, edge_threshold, RegionStatistics};
use crate::config::{GibbsConfig, SweepOrder};
use crate::error::{Result, SegmentationError};
use crate::validation::{validate_extent, validate_label, validate_non_empty_extent};

/// Outcome of one [`GibbsLabeller::apply_gibbs_labeller`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LabellingReport {
    /// ICM passes performed.
    pub passes: usize,
    /// Relabel operations summed over all passes.
    pub relabelled: usize,
    /// Relabel operations in the final pass.
    pub last_pass_changes: usize,
    /// Voxels moved by the small-region eraser.
    pub erased: usize,
}

/// Assigns every voxel the label that locally minimizes the Gibbs energy.
///
/// The label grid is allocated by the first [`set_training_image`](Self::set_training_image)
/// and mutated in place afterwards.
#[derive(Debug, Clone)]
pub struct GibbsLabeller {
    config: GibbsConfig,
    intensity: Option<VoxelGrid<f32>>,
    variance_floor: f64,
    seed: Option<LabelGrid>,
    labels: Option<LabelGrid>,
    statistics: Option<Vec<RegionStatistics>>,
    counts: Vec<usize>,
    iterations: usize,
}

impl GibbsLabeller {
    pub fn new(config: GibbsConfig) -> Result<Self> {
        config.validate()?;
        let classes = config.number_of_classes;
        Ok(Self {
            config,
            intensity: None,
            variance_floor: f64::EPSILON,
            seed: None,
            labels: None,
            statistics: None,
            counts: vec![0; classes],
            iterations: 0,
        })
    }

    pub fn config(&self) -> &GibbsConfig {
        &self.config
    }

    /// Wire the intensity grid. A grid of a different extent discards any previous labelling.
    pub fn set_gibbs_input(&mut self, intensity: VoxelGrid<f32>) -> Result<()> {
        validate_non_empty_extent(intensity.extent())?;
        let (_, variance) = intensity.mean_variance();
        self.variance_floor = (1e-4 * variance).max(f64::EPSILON);

        if let Some(labels) = &self.labels {
            if labels.extent() != intensity.extent() {
                self.labels = None;
                self.seed = None;
                self.statistics = None;
            }
        }
        self.intensity = Some(intensity);
        Ok(())
    }

    /// Install a seed labelling. It becomes both the current labelling and the prior
    /// the energy's continuity term refers to.
    pub fn set_training_image(&mut self, seed: &LabelGrid) -> Result<()> {
        let intensity = self
            .intensity
            .as_ref()
            .ok_or_else(|| SegmentationError::missing_input("intensity image (set_gibbs_input)"))?;
        validate_extent(intensity.extent(), seed.extent())?;
        let classes = self.config.number_of_classes;
        if let Some(&bad) = seed.as_slice().iter().find(|&&l| l as usize >= classes) {
            validate_label(bad, classes)?;
        }

        match self.labels.as_mut() {
            Some(labels) => labels.copy_from(seed)?,
            None => self.labels = Some(seed.clone()),
        }
        match self.seed.as_mut() {
            Some(stored) => stored.copy_from(seed)?,
            None => self.seed = Some(seed.clone()),
        }
        Ok(())
    }

    /// Recompute the region statistics from the current labelling.
    pub fn update_statistics(&mut self) -> Result<&[RegionStatistics]> {
        let intensity = self
            .intensity
            .as_ref()
            .ok_or_else(|| SegmentationError::missing_input("intensity image (set_gibbs_input)"))?;
        let labels = self
            .labels
            .as_ref()
            .ok_or_else(|| SegmentationError::missing_input("training image (set_training_image)"))?;
        let stats = compute_statistics(
            intensity,
            labels,
            self.config.number_of_classes,
            self.config.boundary_gradient,
            self.variance_floor,
        );
        debug!(
            "Region statistics: {}",
            stats
                .iter()
                .map(|s| format!("[{}] n={} mean={:.3} var={:.3}", s.label, s.count, s.mean, s.variance))
                .collect::<Vec<_>>()
                .join(" ")
        );
        let stats = self.statistics.insert(stats);
        Ok(stats.as_slice())
    }

    pub fn statistics(&self) -> Option<&[RegionStatistics]> {
        self.statistics.as_deref()
    }

    pub fn labels(&self) -> Option<&LabelGrid> {
        self.labels.as_ref()
    }

    pub fn seed(&self) -> Option<&LabelGrid> {
        self.seed.as_ref()
    }

    pub fn intensity(&self) -> Option<&VoxelGrid<f32>> {
        self.intensity.as_ref()
    }

    /// Passes performed by the last `apply_gibbs_labeller` call.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Run ICM passes until the relabel fraction drops to `error_tolerance` or
    /// `max_num_iter` passes are done, then erase regions below `cluster_size`.
    pub fn apply_gibbs_labeller(&mut self) -> Result<LabellingReport> {
        if self.statistics.is_none() {
            self.update_statistics()?;
        }
        let voxels = self.labels.as_ref().map(|l| l.len()).unwrap_or(0);
        let tolerance = self.config.error_tolerance * voxels as f64;

        let mut report = LabellingReport::default();
        self.iterations = 0;
        while self.iterations < self.config.max_num_iter {
            let changes = self.icm_pass()?;
            self.iterations += 1;
            report.relabelled += changes;
            report.last_pass_changes = changes;
            debug!("ICM pass {}: {} voxels relabelled", self.iterations, changes);
            if changes as f64 <= tolerance {
                break;
            }
        }
        report.passes = self.iterations;

        if let Some(labels) = self.labels.as_mut() {
            report.erased = erase_small_regions(labels, self.config.cluster_size);
        }
        if report.erased > 0 {
            debug!("Region eraser relabelled {} voxels", report.erased);
        }
        Ok(report)
    }

    /// One ICM sweep over the grid. Returns the number of relabelled voxels.
    ///
    /// A relabel is accepted only if it strictly lowers the voxel's energy and leaves at
    /// least `cluster_size` voxels in the label it leaves.
    pub fn icm_pass(&mut self) -> Result<usize> {
        if self.statistics.is_none() {
            self.update_statistics()?;
        }
        let intensity = self
            .intensity
            .as_ref()
            .ok_or_else(|| SegmentationError::missing_input("intensity image (set_gibbs_input)"))?;
        let seed = self
            .seed
            .as_ref()
            .ok_or_else(|| SegmentationError::missing_input("training image (set_training_image)"))?;
        let labels = self
            .labels
            .as_mut()
            .ok_or_else(|| SegmentationError::missing_input("training image (set_training_image)"))?;
        let stats = self
            .statistics
            .as_deref()
            .ok_or_else(|| SegmentationError::missing_input("region statistics"))?;

        let model = EnergyModel {
            extent: intensity.extent(),
            intensity: intensity.as_slice(),
            seed: seed.as_slice(),
            stats,
            boundary_weight: self.config.boundary_weight,
            prior_weight: self.config.gibbs_prior_weight,
            edge_threshold: edge_threshold(stats),
        };

        let counts = &mut self.counts;
        counts.iter_mut().for_each(|c| *c = 0);
        for &l in labels.as_slice() {
            counts[l as usize] += 1;
        }
        let cluster_size = self.config.cluster_size;
        let mut commit = |labels: &mut [Label], index: usize, label: Label| -> bool {
            let source = labels[index] as usize;
            if counts[source] <= cluster_size {
                return false;
            }
            counts[source] -= 1;
            counts[label as usize] += 1;
            labels[index] = label;
            true
        };

        let labels = labels.as_mut_slice();
        let mut changes = 0;
        match self.config.sweep {
            SweepOrder::RowMajor => {
                for index in 0..labels.len() {
                    if let Some((label, _)) = model.best_label(labels, index) {
                        if commit(labels, index, label) {
                            changes += 1;
                        }
                    }
                }
            }
            SweepOrder::Checkerboard => {
                for colour in 0..2 {
                    let proposals: Vec<(usize, Label)> = {
                        let snapshot: &[Label] = labels;
                        (0..snapshot.len())
                            .into_par_iter()
                            .filter(|&i| model.extent.parity(i) == colour)
                            .filter_map(|i| model.best_label(snapshot, i).map(|(l, _)| (i, l)))
                            .collect()
                    };
                    for (index, label) in proposals {
                        if commit(labels, index, label) {
                            changes += 1;
                        }
                    }
                }
            }
        }
        Ok(changes)
    }

    /// Total Gibbs energy of the current labelling under the current statistics.
    pub fn total_energy(&self) -> Result<f64> {
        let intensity = self
            .intensity
            .as_ref()
            .ok_or_else(|| SegmentationError::missing_input("intensity image (set_gibbs_input)"))?;
        let seed = self
            .seed
            .as_ref()
            .ok_or_else(|| SegmentationError::missing_input("training image (set_training_image)"))?;
        let labels = self
            .labels
            .as_ref()
            .ok_or_else(|| SegmentationError::missing_input("training image (set_training_image)"))?;
        let stats = self
            .statistics
            .as_deref()
            .ok_or_else(|| SegmentationError::missing_input("region statistics"))?;

        let model = EnergyModel {
            extent: intensity.extent(),
            intensity: intensity.as_slice(),
            seed: seed.as_slice(),
            stats,
            boundary_weight: self.config.boundary_weight,
            prior_weight: self.config.gibbs_prior_weight,
            edge_threshold: edge_threshold(stats),
        };
        Ok(model.total(labels.as_slice()))
    }
}
