//! Configuration for the labeller, the balloon solver and the coordinator.
//!
//! All options are plain data with serde support so a run can be described in a file.
//! The coordinator takes ownership of a validated [`SegmentationConfig`]; nothing can be
//! changed once a run has started.

use hyseg_core::geometry::{Point3, Vector3};
use hyseg_core::Label;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::validation::{
    validate_finite_non_negative, validate_iterations, validate_label, validate_positive,
};

/// Order in which the ICM sweep visits voxels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SweepOrder {
    /// Sequential in-place sweep in storage order (x fastest).
    #[default]
    RowMajor,
    /// Two parity colours. Proposals for one colour are computed in parallel against the
    /// committed labels and applied in ascending index order.
    Checkerboard,
}

/// How force fields are sampled at mesh vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldSampling {
    /// Trilinear interpolation.
    #[default]
    Linear,
    /// Value of the nearest voxel.
    Nearest,
}

/// Gibbs prior labeller options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GibbsConfig {
    /// Number of classes, labels are `0..number_of_classes`.
    pub number_of_classes: usize,
    /// Upper bound on ICM passes per `apply_gibbs_labeller` call.
    pub max_num_iter: usize,
    /// Stop once the fraction of relabelled voxels in a pass is at or below this value.
    pub error_tolerance: f64,
    /// Minimum region size. Smaller regions are merged into their surroundings.
    pub cluster_size: usize,
    /// Label of the object being segmented.
    pub object_label: Label,
    /// Intensity difference above which neighbors are separated by an edge.
    /// Zero derives the threshold from the region statistics.
    pub boundary_gradient: f64,
    /// Weight of the clique smoothness term.
    pub boundary_weight: f64,
    /// Weight of the penalty for leaving the seed label.
    pub gibbs_prior_weight: f64,
    pub sweep: SweepOrder,
}

impl Default for GibbsConfig {
    fn default() -> Self {
        Self {
            number_of_classes: 2,
            max_num_iter: 50,
            error_tolerance: 0.0,
            cluster_size: 10,
            object_label: 1,
            boundary_gradient: 0.0,
            boundary_weight: 1.0,
            gibbs_prior_weight: 0.5,
            sweep: SweepOrder::RowMajor,
        }
    }
}

impl GibbsConfig {
    pub fn validate(&self) -> Result<()> {
        validate_iterations(self.max_num_iter)?;
        if self.number_of_classes < 2 || self.number_of_classes > Label::MAX as usize {
            return Err(crate::SegmentationError::invalid_configuration(format!(
                "number_of_classes must be in 2..={}, got {}",
                Label::MAX,
                self.number_of_classes
            )));
        }
        validate_label(self.object_label, self.number_of_classes)?;
        if self.object_label == 0 {
            return Err(crate::SegmentationError::invalid_configuration(
                "object_label must not be the background label 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.error_tolerance) {
            return Err(crate::SegmentationError::invalid_configuration(format!(
                "error_tolerance must be in [0, 1], got {}",
                self.error_tolerance
            )));
        }
        validate_finite_non_negative("boundary_gradient", self.boundary_gradient)?;
        validate_finite_non_negative("boundary_weight", self.boundary_weight)?;
        validate_finite_non_negative("gibbs_prior_weight", self.gibbs_prior_weight)?;
        Ok(())
    }
}

/// Balloon force solver options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalloonConfig {
    /// Stiffness coefficients `(a, b)` of the normal/shear/corner matrices.
    pub stiffness: (f64, f64),
    pub time_step: f64,
    /// Scale of the potential force.
    pub potential_weight: f64,
    /// Constant outward force used before `step_threshold1`.
    pub balloon_force: f64,
    /// Scale of the gradient-fit force.
    pub gradient_weight: f64,
    /// Half-length in voxels of the gradient search along the normal.
    pub neighbor_radius: usize,
    /// Step at which the potential force gives way to gradient fitting.
    pub step_threshold1: usize,
    /// Step from which mesh cleanup passes run after every advance.
    pub step_threshold2: usize,
    /// Edges longer than this multiple of the mean edge length count as gaps.
    pub gap_factor: f64,
    /// Size of one voxel in mesh units along x, y and z.
    pub resolution: Vector3,
    /// Grid slice that mesh `z == 0` maps to.
    pub first_slice: usize,
    pub sampling: FieldSampling,
}

impl Default for BalloonConfig {
    fn default() -> Self {
        Self {
            stiffness: (0.01, 0.01),
            time_step: 0.5,
            potential_weight: 1.0,
            balloon_force: 0.1,
            gradient_weight: 0.5,
            neighbor_radius: 3,
            step_threshold1: 40,
            step_threshold2: 60,
            gap_factor: 2.0,
            resolution: Vector3::new(1.0, 1.0, 1.0),
            first_slice: 0,
            sampling: FieldSampling::Linear,
        }
    }
}

impl BalloonConfig {
    pub fn validate(&self) -> Result<()> {
        validate_finite_non_negative("stiffness.0", self.stiffness.0)?;
        validate_finite_non_negative("stiffness.1", self.stiffness.1)?;
        validate_positive("time_step", self.time_step)?;
        if self.time_step > 1.0 {
            return Err(crate::SegmentationError::invalid_configuration(format!(
                "time_step must not exceed 1, got {}",
                self.time_step
            )));
        }
        validate_finite_non_negative("potential_weight", self.potential_weight)?;
        if !self.balloon_force.is_finite() {
            return Err(crate::SegmentationError::invalid_configuration(
                "balloon_force must be finite",
            ));
        }
        validate_finite_non_negative("gradient_weight", self.gradient_weight)?;
        if self.neighbor_radius == 0 {
            return Err(crate::SegmentationError::invalid_configuration(
                "neighbor_radius must be at least 1",
            ));
        }
        if !(self.gap_factor > 1.0 && self.gap_factor.is_finite()) {
            return Err(crate::SegmentationError::invalid_configuration(format!(
                "gap_factor must be finite and greater than 1, got {}",
                self.gap_factor
            )));
        }
        validate_positive("resolution.x", self.resolution.x)?;
        validate_positive("resolution.y", self.resolution.y)?;
        validate_positive("resolution.z", self.resolution.z)?;
        Ok(())
    }

    pub fn with_stiffness(mut self, a: f64, b: f64) -> Self {
        self.stiffness = (a, b);
        self
    }

    pub fn with_step_thresholds(mut self, potential_until: usize, cleanup_from: usize) -> Self {
        self.step_threshold1 = potential_until;
        self.step_threshold2 = cleanup_from;
        self
    }

    pub fn with_sampling(mut self, sampling: FieldSampling) -> Self {
        self.sampling = sampling;
        self
    }
}

/// Complete configuration of a hybrid segmentation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub gibbs: GibbsConfig,
    pub balloon: BalloonConfig,
    /// Centre of the seed ball used when no training image is given, in grid index space.
    /// `None` uses the grid centre.
    pub start_point: Option<Point3>,
    /// Radius in voxels of the seed ball.
    pub start_radius: f64,
    /// Number of outer iterations.
    pub iterations: usize,
    /// Solver advances per outer iteration.
    pub balloon_substeps: usize,
    /// Region statistics are refreshed every `recursive_num` outer iterations.
    pub recursive_num: usize,
    /// Gaussian sigma, in physical units, used to build the potential field.
    pub potential_sigma: f64,
    /// Gaussian sigma, in physical units, applied before taking the intensity gradient.
    pub gradient_sigma: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            gibbs: GibbsConfig::default(),
            balloon: BalloonConfig::default(),
            start_point: None,
            start_radius: 3.0,
            iterations: 20,
            balloon_substeps: 4,
            recursive_num: 1,
            potential_sigma: 1.0,
            gradient_sigma: 1.0,
        }
    }
}

impl SegmentationConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gibbs(mut self, gibbs: GibbsConfig) -> Self {
        self.gibbs = gibbs;
        self
    }

    pub fn with_balloon(mut self, balloon: BalloonConfig) -> Self {
        self.balloon = balloon;
        self
    }

    pub fn with_start(mut self, point: Point3, radius: f64) -> Self {
        self.start_point = Some(point);
        self.start_radius = radius;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_balloon_substeps(mut self, substeps: usize) -> Self {
        self.balloon_substeps = substeps;
        self
    }

    pub fn with_recursive_num(mut self, every: usize) -> Self {
        self.recursive_num = every;
        self
    }

    pub fn with_sigmas(mut self, potential: f64, gradient: f64) -> Self {
        self.potential_sigma = potential;
        self.gradient_sigma = gradient;
        self
    }

    /// Check every option. Called by the coordinator before any work is done.
    pub fn validate(&self) -> Result<()> {
        self.gibbs.validate()?;
        self.balloon.validate()?;
        validate_iterations(self.iterations)?;
        validate_iterations(self.balloon_substeps)?;
        validate_iterations(self.recursive_num)?;
        validate_positive("start_radius", self.start_radius)?;
        validate_finite_non_negative("potential_sigma", self.potential_sigma)?;
        validate_finite_non_negative("gradient_sigma", self.gradient_sigma)?;
        Ok(())
    }
}
