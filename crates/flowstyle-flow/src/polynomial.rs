use glam::{Mat3, Vec3};

use crate::error::FlowError;
use flowstyle_image::Image;
use flowstyle_imgproc::{filter::separable_filter, parallel};

/// Channel layout of an expanded image: `[b_x, b_y, a_xx, a_yy, a_xy]`.
///
/// Around every pixel the signal is modelled as `f(p) ≈ pᵀ A p + bᵀ p + c`
/// with `A = [[a_xx, a_xy], [a_xy, a_yy]]` and `b = [b_x, b_y]`.
pub type PolynomialCoefficients = Image<f32, 5>;

/// Weighted least squares fit of a quadratic polynomial in every neighbourhood.
///
/// The neighbourhood spans `2 * n + 1` pixels per axis and is weighted by a
/// separable gaussian applicability.
pub struct PolynomialExpansion {
    g: Vec<f32>,
    xg: Vec<f32>,
    xxg: Vec<f32>,
    // inverse of the coupled normal equations for (1, x², y²)
    inv_even: Mat3,
    inv_m2: f32,
    inv_m22: f32,
}

impl PolynomialExpansion {
    /// Create the expansion for a neighbourhood radius `n` and gaussian `sigma`.
    pub fn new(n: usize, sigma: f32) -> Result<Self, FlowError> {
        if n == 0 || !(sigma > 0.0) {
            return Err(FlowError::InvalidParameter(format!(
                "polynomial expansion needs n > 0 and sigma > 0, got n = {n} sigma = {sigma}"
            )));
        }

        let radius = n as isize;
        let mut g = (-radius..=radius)
            .map(|x| (-((x * x) as f32) / (2.0 * sigma * sigma)).exp())
            .collect::<Vec<_>>();
        let norm = g.iter().sum::<f32>();
        g.iter_mut().for_each(|v| *v /= norm);

        let offsets = (-radius..=radius).map(|x| x as f32).collect::<Vec<_>>();
        let xg = g.iter().zip(&offsets).map(|(g, x)| g * x).collect::<Vec<_>>();
        let xxg = g
            .iter()
            .zip(&offsets)
            .map(|(g, x)| g * x * x)
            .collect::<Vec<_>>();

        // moments of the 2D applicability
        let s0 = g.iter().sum::<f32>();
        let s2 = xxg.iter().sum::<f32>();
        let s4 = xxg.iter().zip(&offsets).map(|(v, x)| v * x * x).sum::<f32>();
        let m0 = s0 * s0;
        let m2 = s2 * s0;
        let m4 = s4 * s0;
        let m22 = s2 * s2;

        let even = Mat3::from_cols(
            Vec3::new(m0, m2, m2),
            Vec3::new(m2, m4, m22),
            Vec3::new(m2, m22, m4),
        );

        if even.determinant().abs() <= f32::EPSILON * m4 * m4 * m0 {
            return Err(FlowError::InvalidParameter(format!(
                "polynomial expansion with n = {n} sigma = {sigma} is degenerate"
            )));
        }

        Ok(Self {
            g,
            xg,
            xxg,
            inv_even: even.inverse(),
            inv_m2: 1.0 / m2,
            inv_m22: 1.0 / m22,
        })
    }

    /// Expand a single channel image into its polynomial coefficients.
    pub fn expand(&self, src: &Image<f32, 1>) -> Result<PolynomialCoefficients, FlowError> {
        let correlate = |kernel_x: &[f32], kernel_y: &[f32]| -> Result<Image<f32, 1>, FlowError> {
            let mut dst = Image::from_size_val(src.size(), 0.0)?;
            separable_filter(src, &mut dst, kernel_x, kernel_y)?;
            Ok(dst)
        };

        let c_f = correlate(&self.g, &self.g)?;
        let c_x = correlate(&self.xg, &self.g)?;
        let c_y = correlate(&self.g, &self.xg)?;
        let c_xx = correlate(&self.xxg, &self.g)?;
        let c_yy = correlate(&self.g, &self.xxg)?;
        let c_xy = correlate(&self.xg, &self.xg)?;

        let mut coeffs = PolynomialCoefficients::from_size_val(src.size(), 0.0)?;
        let cols = src.cols();

        parallel::par_iter_rows_indexed(&mut coeffs, |x, y, px| {
            let i = y * cols + x;
            let even = self.inv_even
                * Vec3::new(
                    c_f.as_slice()[i],
                    c_xx.as_slice()[i],
                    c_yy.as_slice()[i],
                );
            px[0] = c_x.as_slice()[i] * self.inv_m2;
            px[1] = c_y.as_slice()[i] * self.inv_m2;
            px[2] = even.y;
            px[3] = even.z;
            // the xy monomial carries twice the off diagonal of A
            px[4] = 0.5 * c_xy.as_slice()[i] * self.inv_m22;
        });

        Ok(coeffs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowstyle_image::ImageSize;

    #[test]
    fn invalid_parameters() {
        assert!(PolynomialExpansion::new(0, 1.2).is_err());
        assert!(PolynomialExpansion::new(2, 0.0).is_err());
        assert!(PolynomialExpansion::new(2, f32::NAN).is_err());
    }

    #[test]
    fn quadratic_is_recovered() -> Result<(), FlowError> {
        let size = ImageSize {
            width: 15,
            height: 15,
        };
        // f = 0.5 x² + 0.25 y² + 0.3 x y + 2 x - y + 4, centred on the image
        let src = Image::<f32, 1>::from_fn(size, |x, y| {
            let (x, y) = (x as f32 - 7.0, y as f32 - 7.0);
            [0.5 * x * x + 0.25 * y * y + 0.3 * x * y + 2.0 * x - y + 4.0]
        })?;

        let expansion = PolynomialExpansion::new(2, 1.2)?;
        let coeffs = expansion.expand(&src)?;

        // at the centre the local fit is exact
        let px = coeffs.pixel(7, 7);
        approx::assert_relative_eq!(px[0], 2.0, epsilon = 1e-3);
        approx::assert_relative_eq!(px[1], -1.0, epsilon = 1e-3);
        approx::assert_relative_eq!(px[2], 0.5, epsilon = 1e-3);
        approx::assert_relative_eq!(px[3], 0.25, epsilon = 1e-3);
        approx::assert_relative_eq!(px[4], 0.15, epsilon = 1e-3);
        Ok(())
    }

    #[test]
    fn constant_has_no_structure() -> Result<(), FlowError> {
        let src = Image::<f32, 1>::from_size_val([8, 8].into(), 3.0)?;
        let coeffs = PolynomialExpansion::new(2, 1.2)?.expand(&src)?;
        for v in coeffs.as_slice() {
            assert!(v.abs() < 1e-4);
        }
        Ok(())
    }
}
