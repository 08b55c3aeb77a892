use crate::filter::{gaussian_blur, kernels::gaussian_kernel_size};
use crate::resize::resize_bilinear;
use flowstyle_image::{Image, ImageError, ImageSize};

/// Sizes of a geometric image pyramid.
///
/// The first entry is `size` itself. Every further level multiplies the
/// original size by `scale` once more and is rounded to the nearest pixel. The
/// pyramid stops after `max_levels` extra levels or as soon as a level would be
/// smaller than `min_size` along either axis.
///
/// # Example
///
/// ```
/// use flowstyle_image::ImageSize;
/// use flowstyle_imgproc::pyramid::pyramid_sizes;
///
/// let sizes = pyramid_sizes([128, 64].into(), 0.5, 3, 32);
/// assert_eq!(sizes, vec![[128, 64].into(), [64, 32].into()]);
/// ```
pub fn pyramid_sizes(
    size: ImageSize,
    scale: f32,
    max_levels: usize,
    min_size: usize,
) -> Vec<ImageSize> {
    let mut sizes = vec![size];
    if !(scale > 0.0 && scale < 1.0) {
        return sizes;
    }

    let mut level_scale = 1.0f32;
    for _ in 0..max_levels {
        level_scale *= scale;
        let width = size.width as f32 * level_scale;
        let height = size.height as f32 * level_scale;
        if width < min_size as f32 || height < min_size as f32 {
            break;
        }
        sizes.push(ImageSize {
            width: width.round() as usize,
            height: height.round() as usize,
        });
    }

    sizes
}

/// Smooth and downsample an image to the size of `dst` by an arbitrary factor.
///
/// The image is first low passed with a gaussian whose sigma grows with the
/// reduction factor `s` as `(1 / s - 1) / 2`, then resized bilinearly.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `dst` - The destination image, no larger than `src`.
pub fn pyrdown_scaled<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
) -> Result<(), ImageError> {
    if dst.width() > src.width() || dst.height() > src.height() {
        return Err(ImageError::InvalidImageSize(
            src.width(),
            src.height(),
            dst.width(),
            dst.height(),
        ));
    }

    if src.size().is_empty() {
        return Err(ImageError::EmptyImage(src.width(), src.height()));
    }

    let scale = dst.width() as f32 / src.width() as f32;
    let sigma = (1.0 / scale - 1.0) * 0.5;

    if sigma <= f32::EPSILON {
        return resize_bilinear(src, dst);
    }

    let kernel_size = gaussian_kernel_size(sigma);
    let mut blurred = Image::<f32, C>::from_size_val(src.size(), 0.0)?;
    gaussian_blur(
        src,
        &mut blurred,
        (kernel_size, kernel_size),
        (sigma, sigma),
    )?;

    resize_bilinear(&blurred, dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pyramid_sizes() {
        let sizes = pyramid_sizes([100, 80].into(), 0.5, 3, 32);
        assert_eq!(
            sizes,
            vec![
                ImageSize {
                    width: 100,
                    height: 80
                },
                ImageSize {
                    width: 50,
                    height: 40
                },
            ]
        );

        // small images keep the base level only
        assert_eq!(pyramid_sizes([20, 20].into(), 0.5, 3, 32).len(), 1);

        // degenerate scales disable the pyramid
        assert_eq!(pyramid_sizes([512, 512].into(), 1.0, 3, 32).len(), 1);
    }

    #[test]
    fn test_pyrdown_scaled_constant() -> Result<(), ImageError> {
        let src = Image::<f32, 1>::from_size_val([64, 48].into(), 3.0)?;
        let mut dst = Image::<f32, 1>::from_size_val([32, 24].into(), 0.0)?;

        pyrdown_scaled(&src, &mut dst)?;

        for v in dst.as_slice() {
            approx::assert_relative_eq!(*v, 3.0, epsilon = 1e-4);
        }

        Ok(())
    }

    #[test]
    fn test_pyrdown_scaled_rejects_upscale() -> Result<(), ImageError> {
        let src = Image::<f32, 1>::from_size_val([4, 4].into(), 0.0)?;
        let mut dst = Image::<f32, 1>::from_size_val([8, 8].into(), 0.0)?;
        assert!(pyrdown_scaled(&src, &mut dst).is_err());
        Ok(())
    }
}
