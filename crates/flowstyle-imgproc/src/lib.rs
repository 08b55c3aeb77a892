#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// color transformations module.
pub mod color;

/// image filtering module.
pub mod filter;

/// utilities for interpolation.
pub mod interpolation;

/// image processing metrics module.
pub mod metrics;

/// module containing parallization utilities.
pub mod parallel;

/// Pyramid operations
pub mod pyramid;

/// utility functions for resizing images.
pub mod resize;
