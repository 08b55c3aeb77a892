use candle_core::{Device, Tensor};

use crate::error::StylizeError;

/// Activations of an image at the content and style layers.
#[derive(Clone, Debug)]
pub struct Features {
    /// Activations with shape (1, C, H, W), one per content layer in order.
    pub content: Vec<Tensor>,
    /// Gram matrices with shape (C, C), one per style layer in order.
    pub style: Vec<Tensor>,
}

/// A differentiable network turning an image into content and style features.
///
/// The optimizer only relies on this contract. Gradients flow from the
/// returned tensors back to the input through the tensor graph.
pub trait FeatureExtractor {
    /// The device the network and its inputs live on.
    fn device(&self) -> &Device;

    /// Extract the features of an image tensor with shape (1, 3, H, W) and
    /// values in `[0, 1]`.
    fn extract(&self, image: &Tensor) -> Result<Features, StylizeError>;
}

/// Gram matrix of a feature map with shape (1, C, H, W).
///
/// The pairwise inner products of the flattened channels, divided by the
/// number of spatial locations `H * W`.
pub fn gram_matrix(features: &Tensor) -> Result<Tensor, StylizeError> {
    let (batch, channels, rows, cols) = features.dims4()?;
    if batch != 1 {
        return Err(StylizeError::FeatureMismatch(format!(
            "gram matrices need a single feature map, got a batch of {batch}"
        )));
    }

    let locations = rows * cols;
    if locations == 0 {
        return Err(StylizeError::FeatureMismatch(
            "gram matrix of an empty feature map".to_string(),
        ));
    }

    let flat = features.reshape((channels, locations))?;
    let gram = flat.matmul(&flat.t()?)?;

    Ok(gram.affine(1.0 / locations as f64, 0.0)?)
}
