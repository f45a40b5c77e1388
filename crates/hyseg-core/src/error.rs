//! Error types for core grid, image and mesh operations.

use thiserror::Error;

/// Error type for `hyseg-core`.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A buffer or grid does not have the expected extent.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Mesh connectivity or geometry is invalid.
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// Tensor data could not be read back from the backend.
    #[error("Tensor data error: {0}")]
    TensorData(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an invalid mesh error.
    pub fn invalid_mesh(msg: impl Into<String>) -> Self {
        Self::InvalidMesh(msg.into())
    }

    /// Create a tensor data error.
    pub fn tensor_data(msg: impl Into<String>) -> Self {
        Self::TensorData(msg.into())
    }
}
