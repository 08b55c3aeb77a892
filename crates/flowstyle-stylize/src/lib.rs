#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! Every frame of a sequence is stylized by gradient descent on the frame
//! itself. The objective blends a style loss on gram matrices, a content loss on
//! network activations and a temporal loss that keeps the result close to the
//! previous stylized frame, warped along the optical flow and masked where the
//! flow is unreliable.

/// Run configuration.
pub mod config;

/// Error types for the stylize module.
pub mod error;

/// Feature extraction boundary.
pub mod features;

/// Conversions between frames, images and tensors.
pub mod frame;

/// Per frame optimization.
pub mod frame_optimizer;

/// Loss terms of the objective.
pub mod losses;

/// Frame sequence state machine.
pub mod sequence;

/// VGG style convolutional feature extractor.
pub mod vgg;

pub use config::{AdamConfig, StylizeConfig};
pub use error::StylizeError;
pub use features::{FeatureExtractor, Features};
pub use frame_optimizer::{FrameKind, FrameOptimizer};
pub use losses::LossBreakdown;
pub use sequence::{SequenceOrchestrator, SequenceState};
pub use vgg::{Vgg, VggConfig, VggExtractor};
