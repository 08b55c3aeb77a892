#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for I/O operations.
pub mod error;

/// Listing the frames of a decoded video.
pub mod frames;

/// High-level image reading functions.
///
/// See [`functional::read_image_rgb8`] for automatic format detection.
pub mod functional;

/// PNG image encoding.
pub mod png;

pub use error::IoError;
