use crate::interpolation::{grid::meshgrid_resize, remap};
use flowstyle_image::{Image, ImageError};

/// Resize an image to the size of `dst` with bilinear interpolation.
///
/// Pixel centres are aligned, i.e. destination pixel `x` samples the source at
/// `(x + 0.5) * src_width / dst_width - 0.5`. Samples near the border are
/// clamped to the image.
///
/// # Arguments
///
/// * `src` - The input image container.
/// * `dst` - The output image container, already allocated with the new size.
///
/// # Example
///
/// ```
/// use flowstyle_image::{Image, ImageSize};
/// use flowstyle_imgproc::resize::resize_bilinear;
///
/// let image = Image::<_, 3>::new(
///     ImageSize {
///         width: 4,
///         height: 5,
///     },
///     vec![0f32; 4 * 5 * 3],
/// )
/// .unwrap();
///
/// let new_size = ImageSize {
///     width: 2,
///     height: 3,
/// };
///
/// let mut image_resized = Image::<_, 3>::from_size_val(new_size, 0.0).unwrap();
///
/// resize_bilinear(&image, &mut image_resized).unwrap();
///
/// assert_eq!(image_resized.num_channels(), 3);
/// assert_eq!(image_resized.size().width, 2);
/// assert_eq!(image_resized.size().height, 3);
/// ```
pub fn resize_bilinear<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
) -> Result<(), ImageError> {
    if src.size().is_empty() {
        return Err(ImageError::EmptyImage(src.width(), src.height()));
    }

    if src.size() == dst.size() {
        dst.as_slice_mut().copy_from_slice(src.as_slice());
        return Ok(());
    }

    let (map_x, map_y) = meshgrid_resize(src.size(), dst.size())?;
    remap(src, dst, &map_x, &map_y)
}
