use flowstyle_image::{Image, ImageError};

use super::{kernels, separable_filter};
use crate::parallel;

/// Blur an image using a box blur filter
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `kernel_size` - The size of the kernel (kernel_x, kernel_y).
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn box_blur<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    kernel_size: (usize, usize),
) -> Result<(), ImageError> {
    let kernel_x = kernels::box_blur_kernel_1d(kernel_size.0);
    let kernel_y = kernels::box_blur_kernel_1d(kernel_size.1);
    separable_filter(src, dst, &kernel_x, &kernel_y)?;
    Ok(())
}

/// Blur an image using a gaussian blur filter
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `kernel_size` - The size of the kernel (kernel_x, kernel_y).
/// * `sigma` - The sigma of the gaussian kernel.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn gaussian_blur<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    kernel_size: (usize, usize),
    sigma: (f32, f32),
) -> Result<(), ImageError> {
    let kernel_x = kernels::gaussian_kernel_1d(kernel_size.0, sigma.0);
    let kernel_y = kernels::gaussian_kernel_1d(kernel_size.1, sigma.1);
    separable_filter(src, dst, &kernel_x, &kernel_y)?;
    Ok(())
}

/// Compute the first order derivative in x and y with central differences.
///
/// Interior pixels use `(f[i + 1] - f[i - 1]) / 2`, border pixels use the one
/// sided difference towards the interior. Axes with a single sample have a
/// zero derivative.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dx` - The derivative along the columns with shape (H, W, C).
/// * `dy` - The derivative along the rows with shape (H, W, C).
pub fn spatial_gradient_central<const C: usize>(
    src: &Image<f32, C>,
    dx: &mut Image<f32, C>,
    dy: &mut Image<f32, C>,
) -> Result<(), ImageError> {
    if src.size() != dx.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dx.cols(),
            dx.rows(),
        ));
    }

    if src.size() != dy.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dy.cols(),
            dy.rows(),
        ));
    }

    let (cols, rows) = (src.cols(), src.rows());

    // returns the two neighbours and the spacing between them
    let stencil = |i: usize, n: usize| -> Option<(usize, usize, f32)> {
        if n < 2 {
            None
        } else if i == 0 {
            Some((0, 1, 1.0))
        } else if i == n - 1 {
            Some((n - 2, n - 1, 1.0))
        } else {
            Some((i - 1, i + 1, 2.0))
        }
    };

    parallel::par_iter_rows_indexed(dx, |x, y, out| match stencil(x, cols) {
        Some((x0, x1, h)) => {
            let p0 = src.pixel(x0, y);
            let p1 = src.pixel(x1, y);
            for c in 0..C {
                out[c] = (p1[c] - p0[c]) / h;
            }
        }
        None => out.iter_mut().for_each(|v| *v = 0.0),
    });

    parallel::par_iter_rows_indexed(dy, |x, y, out| match stencil(y, rows) {
        Some((y0, y1, h)) => {
            let p0 = src.pixel(x, y0);
            let p1 = src.pixel(x, y1);
            for c in 0..C {
                out[c] = (p1[c] - p0[c]) / h;
            }
        }
        None => out.iter_mut().for_each(|v| *v = 0.0),
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowstyle_image::ImageSize;

    #[test]
    fn test_box_blur() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 5,
            height: 5,
        };

        #[rustfmt::skip]
        let img = Image::new(
            size,
            vec![
                0.0, 0.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 9.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 0.0, 0.0,
            ],
        )?;
        let mut dst = Image::<_, 1>::from_size_val(size, 0.0)?;

        box_blur(&img, &mut dst, (3, 3))?;

        #[rustfmt::skip]
        let expected = [
            0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 1.0, 1.0, 0.0,
            0.0, 1.0, 1.0, 1.0, 0.0,
            0.0, 1.0, 1.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0,
        ];
        for (a, b) in dst.as_slice().iter().zip(expected.iter()) {
            approx::assert_relative_eq!(a, b, epsilon = 1e-5);
        }

        Ok(())
    }

    #[test]
    fn test_spatial_gradient_central() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 4,
            height: 3,
        };

        // f(x, y) = x^2 + 3 y
        let img = Image::<f32, 1>::from_fn(size, |x, y| [(x * x) as f32 + 3.0 * y as f32])?;
        let mut dx = Image::<f32, 1>::from_size_val(size, 0.0)?;
        let mut dy = Image::<f32, 1>::from_size_val(size, 0.0)?;

        spatial_gradient_central(&img, &mut dx, &mut dy)?;

        // columns: one sided 1, central 2, central 4, one sided 5
        assert_eq!(&dx.as_slice()[0..4], &[1.0, 2.0, 4.0, 5.0]);
        assert!(dy.as_slice().iter().all(|&v| v == 3.0));

        Ok(())
    }

    #[test]
    fn test_spatial_gradient_single_row() -> Result<(), ImageError> {
        let img = Image::<f32, 1>::new([3, 1].into(), vec![1.0, 2.0, 4.0])?;
        let mut dx = Image::<f32, 1>::from_size_val(img.size(), 0.0)?;
        let mut dy = Image::<f32, 1>::from_size_val(img.size(), 1.0)?;

        spatial_gradient_central(&img, &mut dx, &mut dy)?;

        assert_eq!(dx.as_slice(), &[1.0, 1.5, 2.0]);
        assert_eq!(dy.as_slice(), &[0.0, 0.0, 0.0]);

        Ok(())
    }
}
