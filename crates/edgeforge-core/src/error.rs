//! Error types for edgeforge-core.
//!
//! Covers the failure modes of building tensors and cropping windows:
//! - Buffer length not matching the declared shape
//! - Zero-sized dimensions where a non-empty array is required
//! - Crop windows that leave the tensor bounds
//!
//! # Usage
//!
//! ```rust
//! use edgeforge_core::{Error, Shape4, Tensor4};
//!
//! let err = Tensor4::from_vec(Shape4::new(1, 1, 2, 2), vec![0.0; 3]).unwrap_err();
//! assert!(matches!(err, Error::BufferSizeMismatch { expected: 4, actual: 3 }));
//! ```

use thiserror::Error;

use crate::window::Window;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by tensor construction and windowing.
#[derive(Debug, Error)]
pub enum Error {
    /// Data length does not match `batch * channels * height * width`.
    #[error("buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch {
        /// Element count implied by the shape
        expected: usize,
        /// Element count provided
        actual: usize,
    },

    /// Shape is unusable for the requested operation.
    #[error("invalid dimensions: {shape} ({reason})")]
    InvalidDimensions {
        /// Offending shape, formatted as `BxCxHxW`
        shape: String,
        /// Why the shape was rejected
        reason: String,
    },

    /// Window extends past the spatial bounds of a tensor, or is empty.
    #[error("window {window} exceeds bounds {height}x{width}")]
    WindowOutOfBounds {
        /// Requested window
        window: Window,
        /// Tensor height
        height: usize,
        /// Tensor width
        width: usize,
    },

    /// Two tensors were expected to share a shape.
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Expected shape, formatted as `BxCxHxW`
        expected: String,
        /// Actual shape, formatted as `BxCxHxW`
        actual: String,
    },
}

impl Error {
    /// Creates an [`Error::InvalidDimensions`] error.
    #[inline]
    pub fn invalid_dimensions(shape: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidDimensions {
            shape: shape.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::ShapeMismatch`] error.
    #[inline]
    pub fn shape_mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Returns `true` if this is a bounds-related error.
    #[inline]
    pub fn is_bounds_error(&self) -> bool {
        matches!(self, Self::WindowOutOfBounds { .. })
    }
}
