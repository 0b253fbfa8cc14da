#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// color transformations module.
pub mod color;

/// image enhancement module.
pub mod enhance;

/// image filtering module.
pub mod filter;

/// compute image histogram module.
pub mod histogram;

/// module containing parallization utilities.
pub mod parallel;

/// frame conditioning pipeline module.
pub mod preprocess;

/// utility functions for resizing images.
pub mod resize;

/// operations to threshold images.
pub mod threshold;
