//! Image similarity metrics.
//!
//! Used to quantify how close two frames are, e.g. a stylized frame and the
//! previous stylized frame warped onto it.

mod mse;

pub use mse::mse;
