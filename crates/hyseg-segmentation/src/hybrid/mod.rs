//! Coupling of the Gibbs labeller and the balloon force solver.
//!
//! Each outer iteration deforms the mesh for a few solver steps, writes the mesh interior
//! back into the labelling as a new seed, relabels, and rebuilds the force fields from
//! the result.

pub mod coordinator;

pub use coordinator::{CoordinatorState, HybridCoordinator, IterationSummary, SegmentationOutput};
