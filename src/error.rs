//! Error types for lensopt
//!
//! All errors are configuration/validation failures raised before a forward
//! pass begins. The numeric pipeline itself never aborts mid-pass.
//!
//! Author: Moroya Sakamoto

use thiserror::Error;

/// Lens simulation errors
#[derive(Error, Debug)]
pub enum LensError {
    /// A parameter was set outside its documented range
    #[error("{name} = {value} outside [{min}, {max}]")]
    ParamOutOfRange {
        /// Parameter name
        name: &'static str,
        /// Rejected value
        value: f32,
        /// Lower bound (inclusive)
        min: f32,
        /// Upper bound (inclusive)
        max: f32,
    },

    /// Interactive edits are rejected while the optimizer owns the parameters
    #[error("parameter edits are rejected while optimization is running")]
    OptimizationRunning,

    /// Surface index outside the lens stack
    #[error("surface index {index} out of bounds for stack of {len}")]
    SurfaceIndex {
        /// Requested index
        index: usize,
        /// Stack length
        len: usize,
    },

    /// Ray bundle dimensions too small to sample
    #[error("ray bundle needs at least 2 rays per slot and 1 slot, got {rays}x{fovs}")]
    BundleTooSmall {
        /// Rays per field-of-view slot
        rays: usize,
        /// Field-of-view slots
        fovs: usize,
    },

    /// The lens stack contains no surfaces
    #[error("lens stack is empty")]
    EmptyStack,

    /// I/O error while reading a prescription
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed prescription file
    #[error("prescription parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Check a scalar against an inclusive range, by parameter name.
pub(crate) fn check_range(
    name: &'static str,
    value: f32,
    min: f32,
    max: f32,
) -> Result<(), LensError> {
    if value < min || value > max || !value.is_finite() {
        return Err(LensError::ParamOutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_range() {
        assert!(check_range("height", 0.0, -20.0, 10.0).is_ok());
        assert!(check_range("height", -20.0, -20.0, 10.0).is_ok());
        assert!(check_range("height", 10.1, -20.0, 10.0).is_err());
        assert!(check_range("height", f32::NAN, -20.0, 10.0).is_err());
    }

    #[test]
    fn test_error_message() {
        let err = check_range("curvature", 0.5, -0.1, 0.1).unwrap_err();
        assert_eq!(err.to_string(), "curvature = 0.5 outside [-0.1, 0.1]");
    }
}
