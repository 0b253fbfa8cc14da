//! Filter operations
//!
//! This module provides filter operations for image processing.

/// Filter kernels
pub mod kernels;

/// Dense 2D convolution
mod convolution;
pub use convolution::*;

/// Separable filter operations
mod separable_filter;
pub use separable_filter::*;
