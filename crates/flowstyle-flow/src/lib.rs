#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for the flow module.
pub mod error;

/// Dense motion vector fields.
pub mod field;

/// Farneback dense optical flow estimation.
pub mod farneback;

/// Forward-backward occlusion detection.
pub mod occlusion;

/// Local quadratic polynomial expansion of images.
pub mod polynomial;

/// Warping images along a flow field.
pub mod warp;

pub use error::FlowError;
pub use farneback::{Farneback, FarnebackParams, FlowEstimator};
pub use field::{FlowField, FlowPair};
pub use occlusion::{detect_occlusions, OcclusionMask, OcclusionParams};
pub use warp::warp;
