//! Alternation between the Gibbs labeller and the balloon force solver.

use std::sync::Arc;

use burn::tensor::backend::Backend;
use tracing::{debug, info};

use hyseg_core::geometry::{Point3, Spacing3};
use hyseg_core::mesh::rasterize_interior;
use hyseg_core::{GridExtent, Image, LabelGrid, TriangleMesh};

use crate::balloon::{BalloonForceSolver, CleanupReport};
use crate::config::SegmentationConfig;
use crate::error::{Result, SegmentationError};
use crate::field::{GradientField, PotentialField};
use crate::gibbs::{GibbsLabeller, LabellingReport};
use crate::progress::{CancelToken, ProgressCallback, ProgressTracker};
use crate::validation::validate_extent;

/// Lifecycle of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Inputs wired, labeller not yet run.
    Setup,
    Iterating,
    /// The iteration budget is spent.
    Done,
}

/// What one outer iteration did.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationSummary {
    /// One-based index of the finished iteration.
    pub iteration: usize,
    pub labelling: LabellingReport,
    /// Object voxels after the labeller ran.
    pub object_voxels: usize,
    /// Mean vertex motion of the last solver step.
    pub motion: f64,
    /// Cleanup outcome summed over the iteration's solver steps, if cleanup ran.
    pub cleanup: Option<CleanupReport>,
    /// Whether region statistics were refreshed before labelling.
    pub statistics_refreshed: bool,
}

/// Final labelling and fitted surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationOutput {
    pub labels: LabelGrid,
    /// Deformed mesh in mesh units, same connectivity as the input.
    pub mesh: TriangleMesh,
    pub iterations: usize,
}

/// Owns a labeller and a solver and feeds each one's output to the other.
///
/// # Example
///
/// ```no_run
/// use burn_ndarray::NdArray;
/// use hyseg_core::mesh::icosphere;
/// use hyseg_core::{Image, Point3};
/// use hyseg_segmentation::{HybridCoordinator, SegmentationConfig};
///
/// # fn run(image: Image<NdArray<f32>>) -> hyseg_segmentation::Result<()> {
/// let device = Default::default();
/// let mesh = icosphere(Point3::new(20.0, 20.0, 20.0), 4.0, 1)?;
/// let config = SegmentationConfig::new().with_start(Point3::new(20.0, 20.0, 20.0), 3.0);
/// let output = HybridCoordinator::new(config, &image, mesh, None, &device)?.run()?;
/// println!("{} object voxels", output.labels.count_label(1));
/// # Ok(())
/// # }
/// ```
pub struct HybridCoordinator<B: Backend> {
    config: SegmentationConfig,
    labeller: GibbsLabeller,
    solver: BalloonForceSolver,
    extent: GridExtent,
    spacing: Spacing3,
    device: B::Device,
    /// Seed buffer reused by every `set_object_region` call.
    region: LabelGrid,
    state: CoordinatorState,
    iteration: usize,
    progress: ProgressTracker,
    cancel: Option<CancelToken>,
}

impl<B: Backend> HybridCoordinator<B> {
    /// Validate the configuration, wire the image into the labeller, seed it and prepare
    /// the solver.
    ///
    /// Without a training image the seed is a ball of `start_radius` voxels around
    /// `start_point`, or around the grid centre when no start point is configured.
    pub fn new(
        config: SegmentationConfig,
        image: &Image<B>,
        mesh: TriangleMesh,
        training: Option<&LabelGrid>,
        device: &B::Device,
    ) -> Result<Self> {
        config.validate()?;
        let extent = image.extent();

        let region = match training {
            Some(seed) => {
                validate_extent(extent, seed.extent())?;
                seed.clone()
            }
            None => seed_ball(&config, extent)?,
        };

        let mut solver = BalloonForceSolver::new(config.balloon.clone(), mesh)?;
        solver.set_stiffness_matrix();

        let mut coordinator = Self {
            labeller: GibbsLabeller::new(config.gibbs.clone())?,
            config,
            solver,
            extent,
            spacing: *image.spacing(),
            device: device.clone(),
            region,
            state: CoordinatorState::Setup,
            iteration: 0,
            progress: ProgressTracker::new(),
            cancel: None,
        };
        coordinator.set_gibbs_input(image)?;
        coordinator.labeller.set_training_image(&coordinator.region)?;

        debug!(
            shape = ?extent.shape(),
            vertices = coordinator.solver.connectivity().num_vertices(),
            seed_voxels = coordinator.region.count_label(coordinator.config.gibbs.object_label),
            "hybrid segmentation set up"
        );
        Ok(coordinator)
    }

    /// Report progress to `callback` after every outer iteration.
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress.add_callback(callback);
        self
    }

    /// Stop at the next iteration boundary once `token` is cancelled.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Outer iterations completed so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn labeller(&self) -> &GibbsLabeller {
        &self.labeller
    }

    pub fn solver(&self) -> &BalloonForceSolver {
        &self.solver
    }

    /// Current labelling.
    pub fn labels(&self) -> Result<&LabelGrid> {
        self.labeller
            .labels()
            .ok_or_else(|| SegmentationError::missing_input("labelling"))
    }

    /// Wire the intensity image into the labeller. It must cover the grid the coordinator
    /// was built for.
    pub fn set_gibbs_input(&mut self, image: &Image<B>) -> Result<()> {
        validate_extent(self.extent, image.extent())?;
        self.labeller.set_gibbs_input(image.to_grid()?)
    }

    /// Build the potential and gradient fields from the current labelling and hand them
    /// to the solver.
    pub fn set_potential(&mut self) -> Result<()> {
        let object = self.config.gibbs.object_label;
        let labels = self.labels()?;
        let potential = PotentialField::from_labels::<B>(
            labels,
            object,
            self.config.potential_sigma,
            &self.spacing,
            &self.device,
        )?;

        let intensity = self
            .labeller
            .intensity()
            .ok_or_else(|| SegmentationError::missing_input("intensity image"))?;
        let stats = self
            .labeller
            .statistics()
            .ok_or_else(|| SegmentationError::missing_input("region statistics"))?;
        let gradient = GradientField::from_intensity::<B>(
            intensity,
            stats,
            object,
            self.config.gradient_sigma,
            &self.spacing,
            &self.device,
        )?;

        self.solver.set_potential(potential);
        self.solver.set_gradient(gradient);
        Ok(())
    }

    /// Rasterize the deformed mesh and install it as the labeller's seed: voxels inside
    /// become the object label, object voxels outside become background, all other labels
    /// are kept. Returns the number of voxels inside the mesh.
    pub fn set_object_region(&mut self) -> Result<usize> {
        let inside = rasterize_interior(&self.solver.index_mesh()?, self.extent);
        let object = self.config.gibbs.object_label;
        let labels = self
            .labeller
            .labels()
            .ok_or_else(|| SegmentationError::missing_input("labelling"))?;
        self.region.copy_from(labels)?;

        for (label, &is_inside) in self
            .region
            .as_mut_slice()
            .iter_mut()
            .zip(inside.as_slice())
        {
            if is_inside {
                *label = object;
            } else if *label == object {
                *label = 0;
            }
        }
        self.labeller.set_training_image(&self.region)?;
        Ok(inside.count_true())
    }

    /// Run one outer iteration. The first call also primes the fields by labelling the
    /// seed. Returns `Ok(None)` once the iteration budget is spent.
    pub fn advance(&mut self) -> Result<Option<IterationSummary>> {
        if self.state == CoordinatorState::Done {
            return Ok(None);
        }
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(SegmentationError::Cancelled {
                iterations: self.iteration,
            });
        }

        if !self.progress.is_started() {
            self.progress.start();
        }
        if self.state == CoordinatorState::Setup {
            let report = self.labeller.apply_gibbs_labeller()?;
            debug!(
                passes = report.passes,
                relabelled = report.relabelled,
                "labelled seed"
            );
            self.set_potential()?;
            self.state = CoordinatorState::Iterating;
        }

        let mut cleanup: Option<CleanupReport> = None;
        for _ in 0..self.config.balloon_substeps {
            let step = self.solver.advance()?;
            if let Some(report) = step.cleanup {
                cleanup = Some(cleanup.unwrap_or_default().merge(report));
            }
        }

        let inside = self.set_object_region()?;

        let statistics_refreshed = self.iteration % self.config.recursive_num == 0;
        if statistics_refreshed {
            self.labeller.update_statistics()?;
        }
        let labelling = self.labeller.apply_gibbs_labeller()?;
        self.set_potential()?;

        self.iteration += 1;
        let object_voxels = self.labels()?.count_label(self.config.gibbs.object_label);
        let summary = IterationSummary {
            iteration: self.iteration,
            labelling,
            object_voxels,
            motion: self.solver.mini_t(),
            cleanup,
            statistics_refreshed,
        };

        info!(
            iteration = self.iteration,
            total = self.config.iterations,
            mesh_interior = inside,
            object_voxels,
            relabelled = labelling.relabelled,
            motion = summary.motion,
            "hybrid iteration"
        );

        let mut progress = self
            .progress
            .info(self.iteration, Some(self.config.iterations));
        progress.relabelled = labelling.relabelled;
        progress.object_voxels = object_voxels;
        progress.motion = summary.motion;
        progress.add_metric("mesh_interior", inside as f64);
        self.progress.update(&progress);

        if self.iteration >= self.config.iterations {
            self.state = CoordinatorState::Done;
            self.progress.complete(&progress);
        }
        Ok(Some(summary))
    }

    /// Iterate until the budget is spent and return the final labelling and mesh.
    pub fn run(mut self) -> Result<SegmentationOutput> {
        loop {
            match self.advance() {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    self.progress.error(&e.to_string());
                    return Err(e);
                }
            }
        }
        self.into_output()
    }

    /// Current labelling and mesh, whatever the state.
    pub fn output(&self) -> Result<SegmentationOutput> {
        Ok(SegmentationOutput {
            labels: self.labels()?.clone(),
            mesh: self.solver.current_mesh()?,
            iterations: self.iteration,
        })
    }

    pub fn into_output(self) -> Result<SegmentationOutput> {
        self.output()
    }
}

/// Seed labelling with `object_label` inside a ball around the start point.
fn seed_ball(config: &SegmentationConfig, extent: GridExtent) -> Result<LabelGrid> {
    let center = config.start_point.unwrap_or_else(|| extent.center());
    let r2 = config.start_radius * config.start_radius;
    let object = config.gibbs.object_label;
    let seed = LabelGrid::from_fn(extent, |x, y, z| {
        let d = Point3::new(x as f64, y as f64, z as f64) - center;
        if d.norm_squared() <= r2 {
            object
        } else {
            0
        }
    });
    if seed.count_label(object) == 0 {
        return Err(SegmentationError::invalid_configuration(format!(
            "seed ball at {:?} with radius {} contains no voxel",
            center, config.start_radius
        )));
    }
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_ball_defaults_to_grid_centre() {
        let config = SegmentationConfig::new();
        let seed = seed_ball(&config, GridExtent::new(11, 11, 11)).unwrap();
        assert_eq!(seed.get(5, 5, 5), 1);
        assert_eq!(seed.get(0, 0, 0), 0);
        // Radius 3 ball on the lattice.
        assert_eq!(seed.count_label(1), 123);
    }

    #[test]
    fn test_seed_ball_outside_grid_is_rejected() {
        let config = SegmentationConfig::new().with_start(Point3::new(100.0, 0.0, 0.0), 2.0);
        assert!(matches!(
            seed_ball(&config, GridExtent::new(8, 8, 8)),
            Err(SegmentationError::InvalidConfiguration(_))
        ));
    }
}
