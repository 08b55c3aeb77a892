use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{error::FlowError, field::FlowField};
use flowstyle_image::{Image, ImageSize};
use flowstyle_imgproc::{filter::spatial_gradient_central, parallel};

/// Thresholds of the two occlusion checks.
///
/// A pixel fails the forward-backward check when
/// `‖w + b‖² > consistency_alpha · (‖w‖² + ‖b‖²) + consistency_beta`, where `b`
/// is the backward vector and `w` the forward field sampled where `b` points.
/// It lies on a motion boundary when
/// `‖∇b_x‖² + ‖∇b_y‖² > motion_alpha · ‖b‖² + motion_beta`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionParams {
    /// Relative tolerance of the forward-backward check.
    pub consistency_alpha: f32,
    /// Absolute tolerance of the forward-backward check, in squared pixels.
    pub consistency_beta: f32,
    /// Relative tolerance of the motion boundary check.
    pub motion_alpha: f32,
    /// Absolute tolerance of the motion boundary check.
    pub motion_beta: f32,
}

impl Default for OcclusionParams {
    fn default() -> Self {
        Self {
            consistency_alpha: 0.01,
            consistency_beta: 0.5,
            motion_alpha: 0.01,
            motion_beta: 0.002,
        }
    }
}

impl OcclusionParams {
    /// Check every threshold is finite and non negative.
    pub fn validate(&self) -> Result<(), FlowError> {
        let values = [
            self.consistency_alpha,
            self.consistency_beta,
            self.motion_alpha,
            self.motion_beta,
        ];
        if values.iter().any(|v| !(v.is_finite() && *v >= 0.0)) {
            return Err(FlowError::InvalidParameter(format!(
                "occlusion thresholds must be finite and non negative, got {self:?}"
            )));
        }
        Ok(())
    }
}

/// Binary mask of pixels whose motion estimate is unreliable.
///
/// A value of 1 marks an occluded pixel, 0 a trusted one.
#[derive(Clone, Debug, PartialEq)]
pub struct OcclusionMask(Image<u8, 1>);

impl OcclusionMask {
    /// Create a mask with every pixel trusted.
    pub fn empty(size: ImageSize) -> Result<Self, FlowError> {
        Ok(Self(Image::from_size_val(size, 0)?))
    }

    /// Size of the mask in pixels.
    pub fn size(&self) -> ImageSize {
        self.0.size()
    }

    /// Whether the pixel at `(x, y)` is occluded. Out of bounds pixels are not.
    pub fn is_occluded(&self, x: usize, y: usize) -> bool {
        self.0.get([y, x, 0]).is_some_and(|&v| v != 0)
    }

    /// Number of occluded pixels.
    pub fn num_occluded(&self) -> usize {
        self.0.as_slice().iter().filter(|&&v| v != 0).count()
    }

    /// Per pixel weights for a masked loss, `1 - mask`.
    pub fn weights(&self) -> Result<Image<f32, 1>, FlowError> {
        let data = self
            .0
            .as_slice()
            .iter()
            .map(|&v| if v != 0 { 0.0 } else { 1.0 })
            .collect();
        Ok(Image::new(self.size(), data)?)
    }

    /// Borrow the mask as a single channel image.
    pub fn as_image(&self) -> &Image<u8, 1> {
        &self.0
    }
}

/// Detect occluded pixels from the two flow fields of one frame transition.
///
/// A pixel is marked when either the forward-backward consistency check or the
/// motion boundary check of [`OcclusionParams`] fires. The result is a pure
/// function of its inputs.
///
/// # Arguments
///
/// * `backward` - Motion from the current frame to the previous frame.
/// * `forward` - Motion from the previous frame to the current frame.
/// * `params` - The thresholds of the checks.
///
/// # Errors
///
/// [`FlowError::InputMismatch`] if the fields differ in size.
pub fn detect_occlusions(
    backward: &FlowField,
    forward: &FlowField,
    params: &OcclusionParams,
) -> Result<OcclusionMask, FlowError> {
    if backward.size() != forward.size() {
        return Err(FlowError::InputMismatch(backward.size(), forward.size()));
    }

    let size = backward.size();
    let mut grad_x = Image::<f32, 2>::from_size_val(size, 0.0)?;
    let mut grad_y = Image::<f32, 2>::from_size_val(size, 0.0)?;
    spatial_gradient_central(backward.as_image(), &mut grad_x, &mut grad_y)?;

    let mut mask = Image::<u8, 1>::from_size_val(size, 0)?;

    parallel::par_iter_rows_indexed(&mut mask, |x, y, px| {
        let b = backward.as_image().pixel(x, y);
        let b = Vec2::new(b[0], b[1]);
        let w = forward.sample(x as f32 + b.x, y as f32 + b.y);

        let inconsistent = (w + b).length_squared()
            > params.consistency_alpha * (w.length_squared() + b.length_squared())
                + params.consistency_beta;

        let gx = grad_x.pixel(x, y);
        let gy = grad_y.pixel(x, y);
        // ‖∇u‖² + ‖∇v‖²
        let gradient = gx[0] * gx[0] + gy[0] * gy[0] + gx[1] * gx[1] + gy[1] * gy[1];
        let boundary = gradient > params.motion_alpha * b.length_squared() + params.motion_beta;

        px[0] = u8::from(inconsistent || boundary);
    });

    Ok(OcclusionMask(mask))
}
