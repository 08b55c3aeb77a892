//! Pixel interpolation methods for image transformations.
//!
//! Sampling at non-integer coordinates follows a clamped bilinear policy: any
//! coordinate, including ones far outside the image, is valid input.
//!
//! # Common Use Cases
//!
//! - Image resizing with `crate::resize`
//! - Flow based warping through [`remap`]

mod bilinear;
pub use bilinear::bilinear_interpolation;

/// Grid generation and coordinate mapping utilities.
///
/// Functions for generating coordinate meshgrids used in image warping
/// and transformation operations.
pub mod grid;

mod remap;
pub use remap::remap;
