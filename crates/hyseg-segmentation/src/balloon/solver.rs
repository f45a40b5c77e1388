//! Explicit time stepping of a closed triangle mesh under external and elastic forces.
//!
//! The solver keeps every vertex in grid index space: a mesh point `p` maps to
//! `p / resolution + (0, 0, first_slice)`, so field lookups need no further conversion.
//! Positions handed back through [`BalloonForceSolver::current_mesh`] are mapped back into
//! mesh units.

use rayon::prelude::*;
use tracing::{debug, warn};

use hyseg_core::geometry::{Point3, Vector3};
use hyseg_core::TriangleMesh;

use crate::config::{BalloonConfig, FieldSampling};
use crate::error::{Result, SegmentationError};
use crate::field::{GradientField, PotentialField};
use crate::validation::validate_mesh;

use super::cleanup::{acd_search, gap_search, nodes_rearrange, CleanupReport};
use super::stiffness::{StiffnessMatrices, StiffnessOperator};

/// Gradient peaks below this magnitude produce no fitting force.
const MIN_GRADIENT_PEAK: f64 = 1e-6;

/// Which external force drove a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceMode {
    /// Signed potential plus constant inflation along the normal.
    Potential,
    /// Displacement towards the strongest nearby intensity gradient.
    GradientFit,
}

/// Summary of one [`BalloonForceSolver::advance`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Step counter value the step ran with.
    pub step: usize,
    pub mode: ForceMode,
    /// Mean per-vertex displacement increment.
    pub motion: f64,
    /// Combined cleanup outcome, `None` before cleanup starts.
    pub cleanup: Option<CleanupReport>,
}

/// Balloon force deformable mesh solver.
#[derive(Debug, Clone)]
pub struct BalloonForceSolver {
    config: BalloonConfig,
    /// Input connectivity and positions in mesh units.
    mesh: TriangleMesh,
    rest: Vec<Point3>,
    locations: Vec<Point3>,
    normals: Vec<Vector3>,
    forces: Vec<Vector3>,
    displacements: Vec<Vector3>,
    derives: Vec<Vector3>,
    matrices: StiffnessMatrices,
    stiffness: Option<StiffnessOperator>,
    potential: Option<PotentialField>,
    gradient: Option<GradientField>,
    step: usize,
    mini_t: f64,
    accumulated_motion: f64,
}

impl BalloonForceSolver {
    /// Create a solver for `mesh` and run [`initialize`](Self::initialize).
    pub fn new(config: BalloonConfig, mesh: TriangleMesh) -> Result<Self> {
        config.validate()?;
        validate_mesh(&mesh)?;
        let matrices = StiffnessMatrices::new(config.stiffness.0, config.stiffness.1);
        let mut solver = Self {
            config,
            mesh,
            rest: Vec::new(),
            locations: Vec::new(),
            normals: Vec::new(),
            forces: Vec::new(),
            displacements: Vec::new(),
            derives: Vec::new(),
            matrices,
            stiffness: None,
            potential: None,
            gradient: None,
            step: 0,
            mini_t: 0.0,
            accumulated_motion: 0.0,
        };
        solver.initialize();
        Ok(solver)
    }

    pub fn config(&self) -> &BalloonConfig {
        &self.config
    }

    /// Map a point from mesh units into grid index space.
    pub fn to_index_space(&self, p: &Point3) -> Point3 {
        let r = &self.config.resolution;
        Point3::new(
            p.x / r.x,
            p.y / r.y,
            p.z / r.z + self.config.first_slice as f64,
        )
    }

    /// Map a point from grid index space back into mesh units.
    pub fn to_mesh_space(&self, p: &Point3) -> Point3 {
        let r = &self.config.resolution;
        Point3::new(
            p.x * r.x,
            p.y * r.y,
            (p.z - self.config.first_slice as f64) * r.z,
        )
    }

    /// Reset all per-vertex state to the input mesh: rest and current positions from the
    /// mesh, zero force and displacement, fresh normals, step counter at zero.
    ///
    /// An assembled stiffness operator survives since it depends only on the input mesh.
    pub fn initialize(&mut self) {
        let n = self.mesh.num_vertices();
        self.rest = self
            .mesh
            .points()
            .iter()
            .map(|p| self.to_index_space(p))
            .collect();
        self.locations = self.rest.clone();
        self.forces = vec![Vector3::zeros(); n];
        self.displacements = vec![Vector3::zeros(); n];
        self.derives = vec![Vector3::zeros(); n];
        self.step = 0;
        self.mini_t = 0.0;
        self.accumulated_motion = 0.0;
        self.compute_normals();
    }

    /// Replace the stiffness coefficients. An already assembled operator is rebuilt.
    pub fn set_stiffness(&mut self, a: f64, b: f64) -> Result<()> {
        crate::validation::validate_finite_non_negative("stiffness.0", a)?;
        crate::validation::validate_finite_non_negative("stiffness.1", b)?;
        self.config.stiffness = (a, b);
        self.matrices = StiffnessMatrices::new(a, b);
        if self.stiffness.is_some() {
            self.set_stiffness_matrix();
        }
        Ok(())
    }

    /// Assemble the stiffness operator from the rest geometry.
    pub fn set_stiffness_matrix(&mut self) {
        let op = StiffnessOperator::assemble(&self.mesh, &self.rest, &self.matrices);
        debug!(vertices = op.num_vertices(), "assembled stiffness operator");
        self.stiffness = Some(op);
    }

    pub fn stiffness_operator(&self) -> Option<&StiffnessOperator> {
        self.stiffness.as_ref()
    }

    pub fn set_potential(&mut self, potential: PotentialField) {
        self.potential = Some(potential);
    }

    pub fn set_gradient(&mut self, gradient: GradientField) {
        self.gradient = Some(gradient);
    }

    pub fn has_potential(&self) -> bool {
        self.potential.is_some()
    }

    /// Recompute unit vertex normals at the current locations.
    pub fn compute_normals(&mut self) {
        self.normals = self.mesh.vertex_normals_at(&self.locations);
    }

    /// The force regime the current step uses.
    pub fn force_mode(&self) -> ForceMode {
        if self.step < self.config.step_threshold1 {
            ForceMode::Potential
        } else {
            ForceMode::GradientFit
        }
    }

    /// Compute the external force on every vertex for the current step.
    pub fn compute_force(&mut self) -> Result<()> {
        let sampling = self.config.sampling;
        self.forces = match self.force_mode() {
            ForceMode::Potential => {
                let potential = self
                    .potential
                    .as_ref()
                    .ok_or_else(|| SegmentationError::missing_input("potential field not set"))?;
                let weight = self.config.potential_weight;
                let balloon = self.config.balloon_force;
                self.locations
                    .par_iter()
                    .zip(self.normals.par_iter())
                    .map(|(x, n)| *n * (weight * potential.sample(x, sampling) + balloon))
                    .collect()
            }
            ForceMode::GradientFit => {
                let gradient = self
                    .gradient
                    .as_ref()
                    .ok_or_else(|| SegmentationError::missing_input("gradient field not set"))?;
                let weight = self.config.gradient_weight;
                let radius = self.config.neighbor_radius as isize;
                self.locations
                    .par_iter()
                    .zip(self.normals.par_iter())
                    .map(|(x, n)| match gradient_fit(gradient, x, n, radius, sampling) {
                        Some(d) => *n * (weight * d),
                        None => Vector3::zeros(),
                    })
                    .collect()
            }
        };
        Ok(())
    }

    /// Integrate one explicit step: `Derive = dt (F - K U)`, `U += Derive`, `X = X0 + U`.
    pub fn compute_dt(&mut self) -> Result<()> {
        let stiffness = self
            .stiffness
            .as_ref()
            .ok_or_else(|| SegmentationError::missing_input("stiffness operator not assembled"))?;
        let dt = self.config.time_step;
        let elastic = stiffness.apply(&self.displacements);

        self.derives = self
            .forces
            .par_iter()
            .zip(elastic.par_iter())
            .map(|(f, ku)| (f - ku) * dt)
            .collect();

        self.displacements
            .par_iter_mut()
            .zip(self.locations.par_iter_mut())
            .zip(self.derives.par_iter().zip(self.rest.par_iter()))
            .for_each(|((u, x), (d, x0))| {
                *u += d;
                *x = x0 + *u;
            });

        let n = self.derives.len().max(1) as f64;
        self.mini_t = self.derives.iter().map(|d| d.norm()).sum::<f64>() / n;
        self.accumulated_motion += self.mini_t;
        Ok(())
    }

    /// Run one full step: normals, forces, integration and, from `step_threshold2` on,
    /// the cleanup passes.
    pub fn advance(&mut self) -> Result<StepReport> {
        let step = self.step;
        let mode = self.force_mode();
        self.compute_normals();
        self.compute_force()?;
        self.compute_dt()?;

        let cleanup = if step >= self.config.step_threshold2 {
            Some(self.cleanup())
        } else {
            None
        };

        self.step += 1;
        debug!(step, ?mode, motion = self.mini_t, "balloon step");
        Ok(StepReport {
            step,
            mode,
            motion: self.mini_t,
            cleanup,
        })
    }

    /// Run the fold, gap and rearrangement passes on the current locations and fold the
    /// edits back into the displacements.
    pub fn cleanup(&mut self) -> CleanupReport {
        self.compute_normals();
        let folds = acd_search(&self.mesh, &mut self.locations, &self.normals);
        let gaps = gap_search(&self.mesh, &mut self.locations, self.config.gap_factor);
        self.compute_normals();
        let spacing = nodes_rearrange(&self.mesh, &mut self.locations, &self.normals);

        for ((u, x), x0) in self
            .displacements
            .iter_mut()
            .zip(&self.locations)
            .zip(&self.rest)
        {
            *u = x - x0;
        }
        self.compute_normals();

        if folds.unresolved() > 0 {
            warn!(
                detected = folds.detected,
                unresolved = folds.unresolved(),
                step = self.step,
                "mesh folds left after cleanup"
            );
        }
        if gaps.unresolved() > 0 {
            warn!(
                detected = gaps.detected,
                unresolved = gaps.unresolved(),
                step = self.step,
                "mesh gaps left after cleanup"
            );
        }
        folds.merge(gaps).merge(spacing)
    }

    /// Make the current locations the new rest shape and clear the motion state.
    ///
    /// Connectivity and the assembled stiffness operator are kept.
    pub fn reset(&mut self) {
        self.rest = self.locations.clone();
        let n = self.rest.len();
        self.forces = vec![Vector3::zeros(); n];
        self.displacements = vec![Vector3::zeros(); n];
        self.derives = vec![Vector3::zeros(); n];
        self.step = 0;
        self.mini_t = 0.0;
        self.accumulated_motion = 0.0;
        self.compute_normals();
    }

    /// Current vertex positions in grid index space.
    pub fn locations(&self) -> &[Point3] {
        &self.locations
    }

    pub fn rest_locations(&self) -> &[Point3] {
        &self.rest
    }

    pub fn normals(&self) -> &[Vector3] {
        &self.normals
    }

    pub fn forces(&self) -> &[Vector3] {
        &self.forces
    }

    pub fn displacements(&self) -> &[Vector3] {
        &self.displacements
    }

    pub fn derives(&self) -> &[Vector3] {
        &self.derives
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Mean displacement increment of the last step.
    pub fn mini_t(&self) -> f64 {
        self.mini_t
    }

    /// Sum of [`mini_t`](Self::mini_t) over all steps since the last reset.
    pub fn accumulated_motion(&self) -> f64 {
        self.accumulated_motion
    }

    /// True when no vertex moved by `epsilon` or more in the last step.
    pub fn is_settled(&self, epsilon: f64) -> bool {
        self.derives.iter().all(|d| d.norm() < epsilon)
    }

    /// Input connectivity with the input positions.
    pub fn connectivity(&self) -> &TriangleMesh {
        &self.mesh
    }

    /// Deformed mesh in grid index space.
    pub fn index_mesh(&self) -> Result<TriangleMesh> {
        Ok(self.mesh.with_points(self.locations.clone())?)
    }

    /// Deformed mesh in mesh units, same connectivity as the input.
    pub fn current_mesh(&self) -> Result<TriangleMesh> {
        let points = self
            .locations
            .iter()
            .map(|p| self.to_mesh_space(p))
            .collect();
        Ok(self.mesh.with_points(points)?)
    }
}

/// Signed distance along `n` to the strongest gradient magnitude within `radius` voxels,
/// refined by a parabola through the peak and its two neighbors.
///
/// Offsets are visited by increasing distance with the positive side first, so equal
/// peaks resolve towards the vertex. `None` when no sample reaches the minimum peak.
fn gradient_fit(
    gradient: &GradientField,
    x: &Point3,
    n: &Vector3,
    radius: isize,
    sampling: FieldSampling,
) -> Option<f64> {
    let magnitude = |d: isize| gradient.magnitude(&(x + n * d as f64), sampling);

    let mut best = (0isize, magnitude(0));
    for k in 1..=radius {
        for d in [k, -k] {
            let m = magnitude(d);
            if m > best.1 {
                best = (d, m);
            }
        }
    }
    let (d, peak) = best;
    if peak < MIN_GRADIENT_PEAK {
        return None;
    }

    let mut refined = d as f64;
    if d.abs() < radius {
        let (before, after) = (magnitude(d - 1), magnitude(d + 1));
        let curvature = before - 2.0 * peak + after;
        if curvature < 0.0 {
            refined += (0.5 * (before - after) / curvature).clamp(-0.5, 0.5);
        }
    }
    Some(refined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyseg_core::mesh::icosphere;
    use hyseg_core::{GridExtent, VoxelGrid};

    fn sphere_solver(config: BalloonConfig) -> BalloonForceSolver {
        let mesh = icosphere(Point3::new(8.0, 8.0, 8.0), 3.0, 1).unwrap();
        BalloonForceSolver::new(config, mesh).unwrap()
    }

    fn constant_potential(value: f32) -> PotentialField {
        PotentialField::from_grid(VoxelGrid::filled(GridExtent::new(16, 16, 16), value))
    }

    fn mean_radius(solver: &BalloonForceSolver) -> f64 {
        let c = Point3::new(8.0, 8.0, 8.0);
        solver.locations().iter().map(|p| (p - c).norm()).sum::<f64>()
            / solver.locations().len() as f64
    }

    #[test]
    fn test_index_space_mapping_roundtrip() {
        let config = BalloonConfig {
            resolution: Vector3::new(0.5, 0.5, 2.0),
            first_slice: 3,
            ..Default::default()
        };
        let solver = sphere_solver(config);
        let p = Point3::new(1.0, 2.0, 4.0);
        let idx = solver.to_index_space(&p);
        assert_eq!(idx, Point3::new(2.0, 4.0, 5.0));
        assert!((solver.to_mesh_space(&idx) - p).norm() < 1e-12);
    }

    #[test]
    fn test_compute_dt_requires_stiffness() {
        let mut solver = sphere_solver(BalloonConfig::default());
        solver.set_potential(constant_potential(0.0));
        solver.compute_force().unwrap();
        assert!(matches!(
            solver.compute_dt(),
            Err(SegmentationError::MissingInput(_))
        ));
    }

    #[test]
    fn test_force_requires_matching_field() {
        let mut solver = sphere_solver(BalloonConfig::default());
        assert!(matches!(
            solver.compute_force(),
            Err(SegmentationError::MissingInput(_))
        ));
        let mut fitting = sphere_solver(BalloonConfig::default().with_step_thresholds(0, 100));
        fitting.set_potential(constant_potential(1.0));
        assert!(matches!(
            fitting.compute_force(),
            Err(SegmentationError::MissingInput(_))
        ));
    }

    #[test]
    fn test_positive_potential_inflates() {
        let mut solver = sphere_solver(BalloonConfig::default());
        solver.set_stiffness_matrix();
        solver.set_potential(constant_potential(1.0));
        let before = mean_radius(&solver);
        for _ in 0..5 {
            let report = solver.advance().unwrap();
            assert_eq!(report.mode, ForceMode::Potential);
            assert!(report.cleanup.is_none());
        }
        assert!(mean_radius(&solver) > before + 2.0);
        assert_eq!(solver.step(), 5);
        assert!(solver.accumulated_motion() > 0.0);
    }

    #[test]
    fn test_locations_equal_rest_plus_displacement() {
        let mut solver = sphere_solver(BalloonConfig::default());
        solver.set_stiffness_matrix();
        solver.set_potential(constant_potential(-0.5));
        for _ in 0..3 {
            solver.advance().unwrap();
        }
        for ((x, x0), u) in solver
            .locations()
            .iter()
            .zip(solver.rest_locations())
            .zip(solver.displacements())
        {
            assert!((x - (x0 + u)).norm() < 1e-12);
        }
    }

    #[test]
    fn test_reset_rebases_rest_shape() {
        let mut solver = sphere_solver(BalloonConfig::default());
        solver.set_stiffness_matrix();
        solver.set_potential(constant_potential(1.0));
        solver.advance().unwrap();
        let moved = solver.locations().to_vec();

        solver.reset();
        assert_eq!(solver.rest_locations(), moved.as_slice());
        assert_eq!(solver.step(), 0);
        assert!(solver.displacements().iter().all(|u| u.norm() == 0.0));
        assert!(solver.stiffness_operator().is_some());
    }

    #[test]
    fn test_gradient_fit_finds_peak_and_refines() {
        // Gradient magnitude peaks on the plane x = 10.5 with a symmetric profile.
        let extent = GridExtent::new(20, 4, 4);
        let grid = VoxelGrid::from_fn(extent, |x, _, _| {
            let d = x as f64 - 10.5;
            Vector3::new((-d * d / 2.0).exp(), 0.0, 0.0)
        });
        let field = GradientField::from_grid(grid);
        let d = gradient_fit(
            &field,
            &Point3::new(8.0, 2.0, 2.0),
            &Vector3::x(),
            4,
            FieldSampling::Nearest,
        )
        .unwrap();
        assert!((d - 2.5).abs() < 1e-9, "fit offset {}", d);
    }

    #[test]
    fn test_gradient_fit_ignores_flat_field() {
        let field = GradientField::from_grid(VoxelGrid::filled(
            GridExtent::new(8, 8, 8),
            Vector3::zeros(),
        ));
        let fit = gradient_fit(
            &field,
            &Point3::new(4.0, 4.0, 4.0),
            &Vector3::y(),
            3,
            FieldSampling::Linear,
        );
        assert!(fit.is_none());
    }

    #[test]
    fn test_current_mesh_keeps_connectivity() {
        let config = BalloonConfig {
            resolution: Vector3::new(2.0, 2.0, 2.0),
            ..Default::default()
        };
        let solver = sphere_solver(config);
        let mesh = solver.current_mesh().unwrap();
        assert_eq!(mesh.cells(), solver.connectivity().cells());
        for (a, b) in mesh.points().iter().zip(solver.connectivity().points()) {
            assert!((a - b).norm() < 1e-12);
        }
    }
}
