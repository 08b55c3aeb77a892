use flowstyle_image::{ImageError, ImageSize};

/// An error type for the flow module.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum FlowError {
    /// Two inputs that must share their dimensions do not.
    #[error("Input size mismatch: {0} vs {1}")]
    InputMismatch(ImageSize, ImageSize),

    /// A parameter is outside of its valid range.
    #[error("Invalid flow parameter: {0}")]
    InvalidParameter(String),

    /// Error from the underlying image operations.
    #[error(transparent)]
    Image(#[from] ImageError),
}
