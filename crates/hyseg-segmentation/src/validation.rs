//! Validation utilities for segmentation inputs.
//!
//! This module provides the precondition checks shared by the configuration,
//! the labeller, the solver and the coordinator.

use hyseg_core::{GridExtent, Label, TriangleMesh};

use crate::error::{Result, SegmentationError};

/// Validate iteration count.
pub fn validate_iterations(iterations: usize) -> Result<()> {
    if iterations == 0 {
        return Err(SegmentationError::invalid_configuration(
            "Iterations must be positive",
        ));
    }

    if iterations > 1_000_000 {
        return Err(SegmentationError::invalid_configuration(
            format!("Iterations too large: {}", iterations),
        ));
    }

    Ok(())
}

/// Validate that a parameter is finite and strictly positive.
pub fn validate_positive(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(SegmentationError::invalid_configuration(format!(
            "{} must be finite and positive, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Validate that a parameter is finite and not negative.
pub fn validate_finite_non_negative(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(SegmentationError::invalid_configuration(format!(
            "{} must be finite and non-negative, got {}",
            name, value
        )));
    }
    Ok(())
}

/// Validate that a label is one of `0..classes`.
pub fn validate_label(label: Label, classes: usize) -> Result<()> {
    if label as usize >= classes {
        return Err(SegmentationError::InvalidLabel { label, classes });
    }
    Ok(())
}

/// Validate that a grid has the same extent as the reference grid.
pub fn validate_extent(expected: GridExtent, actual: GridExtent) -> Result<()> {
    if expected != actual {
        return Err(SegmentationError::shape_mismatch(expected.shape(), actual.shape()));
    }
    Ok(())
}

/// Validate that a grid holds at least one voxel.
pub fn validate_non_empty_extent(extent: GridExtent) -> Result<()> {
    if extent.is_empty() {
        return Err(SegmentationError::invalid_configuration(format!(
            "Grid must not be empty, got shape {:?}",
            extent.shape()
        )));
    }
    Ok(())
}

/// Validate that a mesh can be deformed: it needs cells and finite vertex positions.
pub fn validate_mesh(mesh: &TriangleMesh) -> Result<()> {
    if mesh.num_cells() == 0 {
        return Err(SegmentationError::mesh("mesh has no cells"));
    }
    if let Some(v) = mesh
        .points()
        .iter()
        .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
    {
        return Err(SegmentationError::mesh(format!(
            "vertex {} has a non-finite position",
            v
        )));
    }
    if let Some(v) = (0..mesh.num_vertices()).find(|&v| mesh.vertex_cells(v).is_empty()) {
        return Err(SegmentationError::mesh(format!(
            "vertex {} does not belong to any cell",
            v
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyseg_core::geometry::Point3;

    #[test]
    fn test_validate_iterations() {
        assert!(validate_iterations(100).is_ok());
        assert!(validate_iterations(1000).is_ok());
        assert!(validate_iterations(0).is_err());
        assert!(validate_iterations(2_000_000).is_err());
    }

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive("sigma", 0.5).is_ok());
        assert!(validate_positive("sigma", 0.0).is_err());
        assert!(validate_positive("sigma", f64::NAN).is_err());
        assert!(validate_finite_non_negative("weight", 0.0).is_ok());
        assert!(validate_finite_non_negative("weight", -1.0).is_err());
        assert!(validate_finite_non_negative("weight", f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_label() {
        assert!(validate_label(1, 2).is_ok());
        assert!(matches!(
            validate_label(2, 2),
            Err(SegmentationError::InvalidLabel { label: 2, classes: 2 })
        ));
    }

    #[test]
    fn test_validate_extent() {
        let a = GridExtent::new(4, 4, 4);
        assert!(validate_extent(a, a).is_ok());
        assert!(validate_extent(a, GridExtent::new(4, 4, 3)).is_err());
        assert!(validate_non_empty_extent(GridExtent::new(0, 4, 4)).is_err());
    }

    #[test]
    fn test_validate_mesh() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(5.0, 5.0, 5.0),
        ];
        let dangling = TriangleMesh::new(points.clone(), vec![[0, 1, 2]]).unwrap();
        assert!(validate_mesh(&dangling).is_err());

        let empty = TriangleMesh::new(points, vec![]).unwrap();
        assert!(validate_mesh(&empty).is_err());

        let ok = hyseg_core::mesh::icosphere(Point3::origin(), 1.0, 0).unwrap();
        assert!(validate_mesh(&ok).is_ok());
    }
}
