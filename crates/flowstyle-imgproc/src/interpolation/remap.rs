use crate::parallel;

use super::bilinear::bilinear_interpolation;
use flowstyle_image::{Image, ImageError};

/// Apply generic geometric transformation to an image.
///
/// Every destination pixel `(x, y)` is sampled from `src` at
/// `(map_x[y, x], map_y[y, x])` with clamped bilinear interpolation, so
/// coordinates outside the source image are valid.
///
/// # Arguments
///
/// * `src` - The input image container with shape (height, width, C).
/// * `dst` - The output image container with shape (height, width, C).
/// * `map_x` - The x coordinates of the pixels to interpolate.
/// * `map_y` - The y coordinates of the pixels to interpolate.
///
/// # Errors
///
/// * The map_x and map_y must have the same size.
/// * The output image must have the same size as the map_x and map_y.
pub fn remap<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    map_x: &Image<f32, 1>,
    map_y: &Image<f32, 1>,
) -> Result<(), ImageError> {
    if map_x.size() != map_y.size() {
        return Err(ImageError::InvalidImageSize(
            map_x.cols(),
            map_x.rows(),
            map_y.cols(),
            map_y.rows(),
        ));
    }

    if dst.size() != map_x.size() {
        return Err(ImageError::InvalidImageSize(
            map_x.cols(),
            map_x.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    // parallelize the remap operation by rows
    parallel::par_iter_rows_resample(dst, map_x, map_y, |&x, &y, dst_pixel| {
        dst_pixel.copy_from_slice(&bilinear_interpolation(src, x, y));
    });

    Ok(())
}
