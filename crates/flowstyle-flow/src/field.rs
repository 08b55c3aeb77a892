use glam::Vec2;

use crate::{error::FlowError, farneback::FlowEstimator};
use flowstyle_image::{Image, ImageSize};
use flowstyle_imgproc::interpolation::bilinear_interpolation;

/// Dense grid of 2D displacement vectors in pixel units.
///
/// Channel 0 holds the horizontal displacement `dx` and channel 1 the
/// vertical displacement `dy`. A field estimated from frame `a` to frame `b`
/// satisfies `a(p) ≈ b(p + d(p))`.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowField(Image<f32, 2>);

impl FlowField {
    /// Wrap a two channel image holding `(dx, dy)` per pixel.
    pub fn new(data: Image<f32, 2>) -> Self {
        Self(data)
    }

    /// Create a field with no motion.
    pub fn zeros(size: ImageSize) -> Result<Self, FlowError> {
        Ok(Self(Image::from_size_val(size, 0.0)?))
    }

    /// Create a field by evaluating `f(x, y) -> [dx, dy]` for every pixel.
    pub fn from_fn(
        size: ImageSize,
        f: impl Fn(usize, usize) -> [f32; 2],
    ) -> Result<Self, FlowError> {
        Ok(Self(Image::from_fn(size, f)?))
    }

    /// Size of the grid in pixels.
    pub fn size(&self) -> ImageSize {
        self.0.size()
    }

    /// Width of the grid in pixels.
    pub fn width(&self) -> usize {
        self.0.width()
    }

    /// Height of the grid in pixels.
    pub fn height(&self) -> usize {
        self.0.height()
    }

    /// Displacement stored at an integer grid position.
    pub fn get(&self, x: usize, y: usize) -> Option<Vec2> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let px = self.0.pixel(x, y);
        Some(Vec2::new(px[0], px[1]))
    }

    /// Displacement at a real valued position.
    ///
    /// Uses bilinear interpolation with clamped borders: when both axes leave
    /// the grid the nearest corner vector is returned, when a single axis does
    /// it is clamped to the first or last index while the other axis is still
    /// interpolated. Any coordinate is valid input.
    pub fn sample(&self, x: f32, y: f32) -> Vec2 {
        let [dx, dy] = bilinear_interpolation(&self.0, x, y);
        Vec2::new(dx, dy)
    }

    /// Borrow the underlying two channel image.
    pub fn as_image(&self) -> &Image<f32, 2> {
        &self.0
    }
}

/// The two flow fields of one frame transition.
///
/// They are estimated independently and are not exact inverses of each other.
#[derive(Clone, Debug, PartialEq)]
pub struct FlowPair {
    /// Motion from the previous frame to the current frame.
    pub forward: FlowField,
    /// Motion from the current frame back to the previous frame.
    pub backward: FlowField,
}

impl FlowPair {
    /// Estimate both directions of the transition `previous -> current`.
    ///
    /// The two estimations run concurrently on the rayon thread pool.
    ///
    /// # Errors
    ///
    /// [`FlowError::InputMismatch`] if the frames differ in size.
    pub fn estimate<E: FlowEstimator + ?Sized>(
        estimator: &E,
        previous: &Image<f32, 1>,
        current: &Image<f32, 1>,
    ) -> Result<Self, FlowError> {
        if previous.size() != current.size() {
            return Err(FlowError::InputMismatch(previous.size(), current.size()));
        }

        let (forward, backward) = rayon::join(
            || estimator.estimate(previous, current),
            || estimator.estimate(current, previous),
        );

        Ok(Self {
            forward: forward?,
            backward: backward?,
        })
    }

    /// Size shared by both fields.
    pub fn size(&self) -> ImageSize {
        self.forward.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> Result<FlowField, FlowError> {
        FlowField::from_fn([5, 4].into(), |x, y| [x as f32 * 0.5, y as f32 - 2.0])
    }

    #[test]
    fn sample_at_grid_points_is_exact() -> Result<(), FlowError> {
        let flow = ramp()?;
        for y in 0..flow.height() {
            for x in 0..flow.width() {
                assert_eq!(Some(flow.sample(x as f32, y as f32)), flow.get(x, y));
            }
        }
        Ok(())
    }

    #[test]
    fn sample_clamps_corners() -> Result<(), FlowError> {
        let flow = ramp()?;
        assert_eq!(Some(flow.sample(-5.0, -5.0)), flow.get(0, 0));
        assert_eq!(
            flow.sample(flow.width() as f32, 0.0),
            flow.sample((flow.width() - 1) as f32, 0.0)
        );
        assert_eq!(Some(flow.sample(100.0, 100.0)), flow.get(4, 3));
        Ok(())
    }

    #[test]
    fn sample_clamps_one_axis() -> Result<(), FlowError> {
        let flow = ramp()?;
        // x is clamped to the last column, y is interpolated
        let v = flow.sample(42.0, 1.5);
        approx::assert_relative_eq!(v.x, 2.0);
        approx::assert_relative_eq!(v.y, -0.5);
        Ok(())
    }

    #[test]
    fn get_out_of_bounds() -> Result<(), FlowError> {
        let flow = FlowField::zeros([2, 2].into())?;
        assert_eq!(flow.get(2, 0), None);
        assert_eq!(flow.get(1, 1), Some(Vec2::ZERO));
        Ok(())
    }
}
