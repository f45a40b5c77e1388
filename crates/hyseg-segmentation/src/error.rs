//! Error types for segmentation operations.
//!
//! Only precondition violations surface as errors. Numeric anomalies such as empty
//! classes or unresolved mesh folds are absorbed by the algorithms themselves.

use hyseg_core::CoreError;
use thiserror::Error;

/// Errors raised by the labeller, the solver and the coordinator.
#[derive(Error, Debug)]
pub enum SegmentationError {
    /// A required input was not supplied before the call that needs it.
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// A configuration value outside its admissible range.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Two grids that must share an extent do not. Shapes are `[depth, height, width]`.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A label outside `0..number_of_classes`.
    #[error("Invalid label {label}: expected a value below {classes}")]
    InvalidLabel { label: u16, classes: usize },

    /// Mesh unusable for deformation.
    #[error("Mesh error: {0}")]
    Mesh(String),

    /// The run was cancelled between iterations.
    #[error("Segmentation cancelled after {iterations} iterations")]
    Cancelled { iterations: usize },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for segmentation operations.
pub type Result<T> = std::result::Result<T, SegmentationError>;

impl SegmentationError {
    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub fn mesh(msg: impl Into<String>) -> Self {
        Self::Mesh(msg.into())
    }

    /// Shape mismatch between two grid shapes `[depth, height, width]`.
    pub fn shape_mismatch(expected: [usize; 3], actual: [usize; 3]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SegmentationError::missing_input("potential field");
        assert!(matches!(err, SegmentationError::MissingInput(_)));
    }

    #[test]
    fn test_error_display() {
        let err = SegmentationError::missing_input("potential field");
        assert_eq!(err.to_string(), "Missing input: potential field");

        let err = SegmentationError::InvalidLabel { label: 7, classes: 2 };
        assert_eq!(err.to_string(), "Invalid label 7: expected a value below 2");
    }

    #[test]
    fn test_shape_mismatch() {
        let err = SegmentationError::shape_mismatch([10, 10, 10], [5, 5, 5]);
        let err_str = err.to_string();
        assert!(err_str.contains("expected"));
        assert!(err_str.contains("got"));
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err: SegmentationError = CoreError::invalid_mesh("cell 0 repeats a vertex").into();
        assert_eq!(err.to_string(), "Invalid mesh: cell 0 repeats a vertex");
    }
}
