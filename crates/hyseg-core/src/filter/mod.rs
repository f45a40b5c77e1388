pub mod gaussian;
pub mod gradient;

pub use gaussian::GaussianFilter;
pub use gradient::gradient;
