use serde::{Deserialize, Serialize};

use crate::{
    error::FlowError,
    field::FlowField,
    polynomial::{PolynomialCoefficients, PolynomialExpansion},
};
use flowstyle_image::{Image, ImageSize};
use flowstyle_imgproc::{
    filter::box_blur,
    interpolation::bilinear_interpolation,
    parallel,
    pyramid::{pyramid_sizes, pyrdown_scaled},
    resize::resize_bilinear,
};

/// Regularization added to the determinant of the per pixel 2x2 system.
const DET_EPS: f32 = 1e-3;

/// Smallest pyramid level side length.
const MIN_LEVEL_SIZE: usize = 32;

/// Dense optical flow between two greyscale frames.
pub trait FlowEstimator: Send + Sync {
    /// Estimate the displacement of every pixel of `from` into `to`.
    ///
    /// The returned field `d` satisfies `from(p) ≈ to(p + d(p))`. Both images
    /// hold intensities in `[0, 1]` and must share their size.
    fn estimate(&self, from: &Image<f32, 1>, to: &Image<f32, 1>) -> Result<FlowField, FlowError>;
}

/// Parameters of the Farneback estimator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarnebackParams {
    /// Scale between two consecutive pyramid levels, in `(0, 1)`.
    pub pyr_scale: f32,
    /// Number of coarser pyramid levels on top of the full resolution.
    pub levels: usize,
    /// Side length of the averaging window.
    pub win_size: usize,
    /// Refinement iterations per pyramid level.
    pub iterations: usize,
    /// Radius of the polynomial expansion neighbourhood.
    pub poly_n: usize,
    /// Standard deviation of the polynomial expansion applicability.
    pub poly_sigma: f32,
}

impl Default for FarnebackParams {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            win_size: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

impl FarnebackParams {
    /// Check every parameter is in range.
    pub fn validate(&self) -> Result<(), FlowError> {
        if !(self.pyr_scale > 0.0 && self.pyr_scale < 1.0) {
            return Err(FlowError::InvalidParameter(format!(
                "pyr_scale must be in (0, 1), got {}",
                self.pyr_scale
            )));
        }
        if self.win_size == 0 || self.iterations == 0 {
            return Err(FlowError::InvalidParameter(format!(
                "win_size and iterations must be positive, got {} and {}",
                self.win_size, self.iterations
            )));
        }
        if self.poly_n == 0 || !(self.poly_sigma > 0.0) {
            return Err(FlowError::InvalidParameter(format!(
                "poly_n and poly_sigma must be positive, got {} and {}",
                self.poly_n, self.poly_sigma
            )));
        }
        Ok(())
    }
}

/// Gunnar Farneback's two frame motion estimation.
///
/// Every frame is approximated locally by quadratic polynomials, the
/// displacement follows from how the polynomial coefficients change between
/// the frames. The estimate is refined coarse to fine over a gaussian pyramid.
pub struct Farneback {
    params: FarnebackParams,
    expansion: PolynomialExpansion,
}

impl Farneback {
    /// Create a new estimator, validating the parameters.
    pub fn new(params: FarnebackParams) -> Result<Self, FlowError> {
        params.validate()?;
        let expansion = PolynomialExpansion::new(params.poly_n, params.poly_sigma)?;
        Ok(Self { params, expansion })
    }

    /// The parameters of the estimator.
    pub fn params(&self) -> &FarnebackParams {
        &self.params
    }

    fn level(
        &self,
        from: &Image<f32, 1>,
        to: &Image<f32, 1>,
        size: ImageSize,
        flow: &mut Image<f32, 2>,
    ) -> Result<(), FlowError> {
        let mut scaled_from = Image::from_size_val(size, 0.0)?;
        let mut scaled_to = Image::from_size_val(size, 0.0)?;
        pyrdown_scaled(from, &mut scaled_from)?;
        pyrdown_scaled(to, &mut scaled_to)?;

        let r0 = self.expansion.expand(&scaled_from)?;
        let r1 = self.expansion.expand(&scaled_to)?;

        let mut matrices = Image::<f32, 5>::from_size_val(size, 0.0)?;
        let mut blurred = Image::<f32, 5>::from_size_val(size, 0.0)?;
        let win = (self.params.win_size, self.params.win_size);

        for _ in 0..self.params.iterations {
            update_matrices(&r0, &r1, flow, &mut matrices);
            box_blur(&matrices, &mut blurred, win)?;
            update_flow(&blurred, flow);
        }

        Ok(())
    }
}

impl FlowEstimator for Farneback {
    fn estimate(&self, from: &Image<f32, 1>, to: &Image<f32, 1>) -> Result<FlowField, FlowError> {
        if from.size() != to.size() {
            return Err(FlowError::InputMismatch(from.size(), to.size()));
        }

        if from.size().is_empty() {
            return FlowField::zeros(from.size());
        }

        // the regularization is tuned for 8 bit intensities
        let from = from.cast_and_scale::<f32>(255.0)?;
        let to = to.cast_and_scale::<f32>(255.0)?;

        let sizes = pyramid_sizes(
            from.size(),
            self.params.pyr_scale,
            self.params.levels,
            MIN_LEVEL_SIZE,
        );
        log::debug!(
            "farneback: {} pyramid levels for {}",
            sizes.len(),
            from.size()
        );

        let mut flow: Option<Image<f32, 2>> = None;

        for &size in sizes.iter().rev() {
            let mut level_flow = match flow.take() {
                Some(coarse) => upscale_flow(&coarse, size)?,
                None => Image::from_size_val(size, 0.0)?,
            };
            self.level(&from, &to, size, &mut level_flow)?;
            flow = Some(level_flow);
        }

        match flow {
            Some(flow) => Ok(FlowField::new(flow)),
            None => FlowField::zeros(from.size()),
        }
    }
}

/// Resize a coarse flow field and rescale the vectors to the new grid.
fn upscale_flow(coarse: &Image<f32, 2>, size: ImageSize) -> Result<Image<f32, 2>, FlowError> {
    let mut fine = Image::<f32, 2>::from_size_val(size, 0.0)?;
    resize_bilinear(coarse, &mut fine)?;

    let sx = size.width as f32 / coarse.width() as f32;
    let sy = size.height as f32 / coarse.height() as f32;
    fine.as_slice_mut().chunks_exact_mut(2).for_each(|d| {
        d[0] *= sx;
        d[1] *= sy;
    });

    Ok(fine)
}

/// Per pixel normal equations `G d = h` of the displacement, stored as
/// `[g_xx, g_xy, g_yy, h_x, h_y]`.
fn update_matrices(
    r0: &PolynomialCoefficients,
    r1: &PolynomialCoefficients,
    flow: &Image<f32, 2>,
    matrices: &mut Image<f32, 5>,
) {
    parallel::par_iter_rows_indexed(matrices, |x, y, m| {
        let d = flow.pixel(x, y);
        let (dx, dy) = (d[0], d[1]);
        let p0 = r0.pixel(x, y);
        let p1 = bilinear_interpolation(r1, x as f32 + dx, y as f32 + dy);

        let a_xx = 0.5 * (p0[2] + p1[2]);
        let a_yy = 0.5 * (p0[3] + p1[3]);
        let a_xy = 0.5 * (p0[4] + p1[4]);

        let db_x = 0.5 * (p0[0] - p1[0]) + a_xx * dx + a_xy * dy;
        let db_y = 0.5 * (p0[1] - p1[1]) + a_xy * dx + a_yy * dy;

        // A is symmetric so Aᵀ A = A²
        m[0] = a_xx * a_xx + a_xy * a_xy;
        m[1] = (a_xx + a_yy) * a_xy;
        m[2] = a_xy * a_xy + a_yy * a_yy;
        m[3] = a_xx * db_x + a_xy * db_y;
        m[4] = a_xy * db_x + a_yy * db_y;
    });
}

fn update_flow(matrices: &Image<f32, 5>, flow: &mut Image<f32, 2>) {
    parallel::par_iter_rows(matrices, flow, |m, d| {
        let (g_xx, g_xy, g_yy, h_x, h_y) = (m[0], m[1], m[2], m[3], m[4]);
        let idet = 1.0 / (g_xx * g_yy - g_xy * g_xy + DET_EPS);
        d[0] = (g_yy * h_x - g_xy * h_y) * idet;
        d[1] = (g_xx * h_y - g_xy * h_x) * idet;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(size: ImageSize, shift_x: f32) -> Result<Image<f32, 1>, FlowError> {
        Ok(Image::from_fn(size, |x, y| {
            let x = x as f32 - shift_x;
            let y = y as f32;
            [0.5 + 0.2 * (0.35 * x).sin() * (0.3 * y).cos() + 0.1 * (0.2 * (x + y)).sin()]
        })?)
    }

    #[test]
    fn params_validation() {
        assert!(FarnebackParams::default().validate().is_ok());
        let params = FarnebackParams {
            pyr_scale: 1.0,
            ..Default::default()
        };
        assert!(Farneback::new(params).is_err());
        let params = FarnebackParams {
            iterations: 0,
            ..Default::default()
        };
        assert!(Farneback::new(params).is_err());
    }

    #[test]
    fn params_from_partial_json() -> Result<(), Box<dyn std::error::Error>> {
        let params: FarnebackParams = serde_json::from_str(r#"{ "levels": 1 }"#)?;
        assert_eq!(params.levels, 1);
        assert_eq!(params.win_size, 15);
        Ok(())
    }

    #[test]
    fn identical_frames_have_zero_flow() -> Result<(), FlowError> {
        let frame = pattern([40, 36].into(), 0.0)?;
        let flow = Farneback::new(FarnebackParams::default())?.estimate(&frame, &frame)?;

        assert_eq!(flow.size(), frame.size());
        assert!(flow.as_image().as_slice().iter().all(|&v| v == 0.0));
        Ok(())
    }

    #[test]
    fn horizontal_shift_is_recovered() -> Result<(), FlowError> {
        let size = ImageSize {
            width: 48,
            height: 48,
        };
        let from = pattern(size, 0.0)?;
        let to = pattern(size, 1.0)?;

        let flow = Farneback::new(FarnebackParams::default())?.estimate(&from, &to)?;

        // average over the interior, away from the replicated borders
        let (mut sum_x, mut sum_y, mut n) = (0.0, 0.0, 0.0);
        for y in 12..36 {
            for x in 12..36 {
                let d = flow.sample(x as f32, y as f32);
                sum_x += d.x;
                sum_y += d.y;
                n += 1.0;
            }
        }

        approx::assert_abs_diff_eq!(sum_x / n, 1.0, epsilon = 0.25);
        approx::assert_abs_diff_eq!(sum_y / n, 0.0, epsilon = 0.25);
        Ok(())
    }

    #[test]
    fn size_mismatch() -> Result<(), FlowError> {
        let a = Image::<f32, 1>::from_size_val([4, 4].into(), 0.0)?;
        let b = Image::<f32, 1>::from_size_val([4, 5].into(), 0.0)?;
        assert_eq!(
            Farneback::new(FarnebackParams::default())?.estimate(&a, &b).err(),
            Some(FlowError::InputMismatch(a.size(), b.size()))
        );
        Ok(())
    }
}
