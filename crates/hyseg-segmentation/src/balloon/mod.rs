//! Balloon force deformable mesh.
//!
//! A closed triangle mesh is inflated by a signed potential until it reaches the labelled
//! boundary, then pulled onto the nearest strong intensity gradient. An elastic operator
//! assembled once from the rest shape keeps neighboring vertices together, and periodic
//! cleanup passes repair folds, gaps and uneven vertex spacing.

pub mod cleanup;
pub mod solver;
pub mod stiffness;

pub use cleanup::{acd_search, gap_search, nodes_rearrange, CleanupReport};
pub use solver::{BalloonForceSolver, ForceMode, StepReport};
pub use stiffness::{StiffnessMatrices, StiffnessOperator};
