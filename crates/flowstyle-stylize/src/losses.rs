use candle_core::{DType, Device, Tensor};

use crate::error::StylizeError;

/// Weighted contributions of the loss terms at one optimization step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LossBreakdown {
    /// Weighted content loss.
    pub content: f32,
    /// Weighted style loss.
    pub style: f32,
    /// Weighted temporal loss.
    pub temporal: f32,
    /// Sum of the three weighted terms.
    pub total: f32,
}

impl std::fmt::Display for LossBreakdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "total {:.4} (content {:.4}, style {:.4}, temporal {:.4})",
            self.total, self.content, self.style, self.temporal
        )
    }
}

/// Sum over layers of the mean squared error between features and targets.
///
/// An empty list of layers gives a zero loss.
///
/// # Errors
///
/// [`StylizeError::FeatureMismatch`] if the number of layers or the shape of a
/// layer differ.
pub fn layer_loss(
    features: &[Tensor],
    targets: &[Tensor],
    device: &Device,
) -> Result<Tensor, StylizeError> {
    if features.len() != targets.len() {
        return Err(StylizeError::FeatureMismatch(format!(
            "got {} layers for {} targets",
            features.len(),
            targets.len()
        )));
    }

    let mut loss = Tensor::zeros((), DType::F32, device)?;
    for (feature, target) in features.iter().zip(targets) {
        if feature.dims() != target.dims() {
            return Err(StylizeError::FeatureMismatch(format!(
                "layer of shape {:?} does not match its target of shape {:?}",
                feature.dims(),
                target.dims()
            )));
        }
        loss = loss.add(&candle_nn::loss::mse(feature, target)?)?;
    }

    Ok(loss)
}

/// Occlusion masked mean squared difference between the optimized frame and
/// the warped previous result.
///
/// `image` and `warped` have shape (1, 3, H, W) and `weights` has shape
/// (1, 1, H, W) with 0 on occluded pixels. Occluded pixels still count in the
/// mean, so the result is the per channel masked mean averaged over channels.
pub fn temporal_loss(
    image: &Tensor,
    warped: &Tensor,
    weights: &Tensor,
) -> Result<Tensor, StylizeError> {
    let diff = image.sub(warped)?.sqr()?;
    Ok(diff.broadcast_mul(weights)?.mean_all()?)
}
