use flowstyle_flow::FlowError;
use flowstyle_image::{ImageError, ImageSize};

/// An error type for the stylize module.
#[derive(thiserror::Error, Debug)]
pub enum StylizeError {
    /// A frame does not have the size of the sequence it belongs to.
    #[error("Input size mismatch: expected {0}, got {1}")]
    InputMismatch(ImageSize, ImageSize),

    /// The feature extractor rejected or failed on its input.
    #[error("Feature extraction failed: {0}")]
    ExtractionFailure(String),

    /// Extracted features do not line up with their targets.
    #[error("Feature mismatch: {0}")]
    FeatureMismatch(String),

    /// The loss or its gradient is not finite.
    #[error("Non finite {0} during optimization")]
    NumericalDegeneracy(&'static str),

    /// An operation needs a frame that was not set yet.
    #[error("No frame has been set")]
    NotInitialized,

    /// The sequence is done and accepts no more frames.
    #[error("The sequence is finished")]
    SequenceFinished,

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error from the tensor backend.
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),

    /// Error from the flow estimation.
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// Error from the image operations.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Error while reading a configuration file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Error while parsing a configuration file.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
