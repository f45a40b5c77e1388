//! Gibbs prior Markov random field labeller.
//!
//! Voxels are relabelled by Iterated Conditional Modes against a three-term energy:
//! a Gaussian intensity likelihood per class, a clique smoothness term that is switched
//! off across intensity edges, and a bias towards the seed labelling.

pub mod energy;
pub mod eraser;
pub mod labeller;
pub mod statistics;

pub use energy::{likelihood, UNFAVORABLE_ENERGY};
pub use eraser::erase_small_regions;
pub use labeller::{GibbsLabeller, LabellingReport};
pub use statistics::{compute_statistics, RegionStatistics};
