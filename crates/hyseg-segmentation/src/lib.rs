//! Hybrid segmentation: a Gibbs prior labeller and a balloon force deformable mesh,
//! alternated by a coordinator until an iteration budget is spent.
//!
//! - [`gibbs`]: voxel labelling by Iterated Conditional Modes.
//! - [`balloon`]: explicit deformation of a closed triangle mesh.
//! - [`hybrid`]: the feedback loop between the two.

pub mod balloon;
pub mod config;
pub mod error;
pub mod field;
pub mod gibbs;
pub mod hybrid;
pub mod progress;
pub mod validation;

pub use balloon::{BalloonForceSolver, CleanupReport, ForceMode, StepReport};
pub use config::{BalloonConfig, FieldSampling, GibbsConfig, SegmentationConfig, SweepOrder};
pub use error::{Result, SegmentationError};
pub use field::{GradientField, PotentialField};
pub use gibbs::{GibbsLabeller, LabellingReport, RegionStatistics};
pub use hybrid::{CoordinatorState, HybridCoordinator, IterationSummary, SegmentationOutput};
pub use progress::{
    CancelToken, ConsoleProgressCallback, HistoryCallback, ProgressCallback, ProgressInfo,
    ProgressTracker,
};
