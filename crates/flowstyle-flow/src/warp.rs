use crate::{error::FlowError, field::FlowField};
use flowstyle_image::Image;
use flowstyle_imgproc::{interpolation::remap, parallel};

/// Warp an image along a flow field.
///
/// Destination pixel `p` is resampled from `image` at `p + flow(p)` with
/// clamped bilinear interpolation, i.e. the result shows where every pixel
/// moved from.
///
/// # Arguments
///
/// * `image` - The image to warp with shape (H, W, C).
/// * `flow` - The flow field with the same height and width as `image`.
///
/// # Errors
///
/// [`FlowError::InputMismatch`] if the image and the field differ in size.
///
/// # Example
///
/// ```
/// use flowstyle_flow::{warp, FlowField};
/// use flowstyle_image::Image;
///
/// let image = Image::<f32, 1>::new([3, 1].into(), vec![1.0, 2.0, 3.0]).unwrap();
/// let flow = FlowField::from_fn(image.size(), |_, _| [1.0, 0.0]).unwrap();
///
/// let warped = warp(&image, &flow).unwrap();
/// assert_eq!(warped.as_slice(), &[2.0, 3.0, 3.0]);
/// ```
pub fn warp<const C: usize>(
    image: &Image<f32, C>,
    flow: &FlowField,
) -> Result<Image<f32, C>, FlowError> {
    if image.size() != flow.size() {
        return Err(FlowError::InputMismatch(image.size(), flow.size()));
    }

    let mut map_x = Image::<f32, 1>::from_size_val(flow.size(), 0.0)?;
    let mut map_y = Image::<f32, 1>::from_size_val(flow.size(), 0.0)?;

    parallel::par_iter_rows_indexed(&mut map_x, |x, y, px| {
        px[0] = x as f32 + flow.as_image().pixel(x, y)[0];
    });
    parallel::par_iter_rows_indexed(&mut map_y, |x, y, px| {
        px[0] = y as f32 + flow.as_image().pixel(x, y)[1];
    });

    let mut warped = Image::<f32, C>::from_size_val(image.size(), 0.0)?;
    remap(image, &mut warped, &map_x, &map_y)?;

    Ok(warped)
}
