use candle_core::{Device, Tensor};

use crate::error::StylizeError;
use flowstyle_image::{ops, Image, ImageError, ImageSize};
use flowstyle_imgproc::{color::gray_from_rgb, resize::resize_bilinear};

/// Size of a frame once its longest side is scaled to `max_image_size`.
///
/// The longest side becomes exactly `max_image_size`, the other side is scaled
/// by the same factor and truncated, never below one pixel. `None` keeps the
/// size.
pub fn working_size(size: ImageSize, max_image_size: Option<usize>) -> ImageSize {
    let Some(max_side) = max_image_size else {
        return size;
    };

    let long_side = size.width.max(size.height);
    if long_side == 0 || long_side == max_side {
        return size;
    }

    let scale_side = |side: usize| (side * max_side / long_side).max(1);
    if size.width >= size.height {
        ImageSize {
            width: max_side,
            height: scale_side(size.height),
        }
    } else {
        ImageSize {
            width: scale_side(size.width),
            height: max_side,
        }
    }
}

/// Prepare a raw 8 bit RGB frame for the optimizer.
///
/// The values are scaled to `[0, 1]` and the frame is resized bilinearly so
/// its longest side equals `max_image_size`.
///
/// # Example
///
/// ```
/// use flowstyle_image::Image;
/// use flowstyle_stylize::frame::prepare_frame;
///
/// let raw = Image::<u8, 3>::from_size_val([8, 4].into(), 255).unwrap();
/// let frame = prepare_frame(&raw, Some(4)).unwrap();
///
/// assert_eq!(frame.width(), 4);
/// assert_eq!(frame.height(), 2);
/// assert!(frame.as_slice().iter().all(|&v| (v - 1.0).abs() < 1e-6));
/// ```
pub fn prepare_frame(
    frame: &Image<u8, 3>,
    max_image_size: Option<usize>,
) -> Result<Image<f32, 3>, StylizeError> {
    if frame.size().is_empty() {
        return Err(ImageError::EmptyImage(frame.width(), frame.height()).into());
    }

    let frame = frame.cast_and_scale::<f32>(1.0 / 255.0)?;

    let size = working_size(frame.size(), max_image_size);
    if size == frame.size() {
        return Ok(frame);
    }

    let mut resized = Image::<f32, 3>::from_size_val(size, 0.0)?;
    resize_bilinear(&frame, &mut resized)?;

    Ok(resized)
}

/// Greyscale derivative of a prepared frame, used for flow estimation.
pub fn grey_frame(frame: &Image<f32, 3>) -> Result<Image<f32, 1>, StylizeError> {
    let mut grey = Image::<f32, 1>::from_size_val(frame.size(), 0.0)?;
    gray_from_rgb(frame, &mut grey)?;
    Ok(grey)
}

/// Convert a stylized frame in `[0, 1]` to 8 bit RGB.
pub fn to_rgb8(frame: &Image<f32, 3>) -> Result<Image<u8, 3>, StylizeError> {
    let mut rgb8 = Image::<u8, 3>::from_size_val(frame.size(), 0)?;
    ops::quantize_u8(frame, &mut rgb8, 255.0)?;
    Ok(rgb8)
}

/// Convert an image with shape (H, W, C) into a tensor with shape (1, C, H, W).
pub fn image_to_tensor<const C: usize>(
    image: &Image<f32, C>,
    device: &Device,
) -> Result<Tensor, StylizeError> {
    let tensor = Tensor::from_slice(image.as_slice(), (image.rows(), image.cols(), C), device)?;

    // permute the image to the shape (1, c, h, w)
    Ok(tensor.permute((2, 0, 1))?.unsqueeze(0)?)
}

/// Convert a tensor with shape (1, C, H, W) into an image with shape (H, W, C).
pub fn tensor_to_image<const C: usize>(tensor: &Tensor) -> Result<Image<f32, C>, StylizeError> {
    let (batch, channels, rows, cols) = tensor.dims4()?;
    if batch != 1 || channels != C {
        return Err(StylizeError::FeatureMismatch(format!(
            "expected a tensor of shape (1, {C}, H, W), got {:?}",
            tensor.dims()
        )));
    }

    let data = tensor
        .squeeze(0)?
        .permute((1, 2, 0))?
        .flatten_all()?
        .to_vec1::<f32>()?;

    Ok(Image::new([cols, rows].into(), data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_size_keeps_aspect() {
        assert_eq!(
            working_size([1024, 768].into(), Some(512)),
            ImageSize {
                width: 512,
                height: 384
            }
        );
        assert_eq!(
            working_size([100, 300].into(), Some(512)),
            ImageSize {
                width: 170,
                height: 512
            }
        );
        assert_eq!(working_size([7, 5].into(), None), [7, 5].into());
        assert_eq!(working_size([8, 8].into(), Some(3)), [3, 3].into());
        assert_eq!(working_size([1000, 1].into(), Some(10)), [10, 1].into());
    }

    #[test]
    fn working_size_hits_the_long_side_exactly() -> Result<(), StylizeError> {
        // a float scale factor truncates these long sides to 511
        assert_eq!(working_size([425, 240].into(), Some(512)), [512, 289].into());
        assert_eq!(working_size([49, 30].into(), Some(512)), [512, 313].into());
        assert_eq!(working_size([240, 474].into(), Some(512)), [259, 512].into());
        assert_eq!(working_size([1920, 1080].into(), Some(512)), [512, 288].into());

        for long_side in [425, 474, 499, 644] {
            let size = working_size([long_side, 100].into(), Some(512));
            assert_eq!(size.width, 512);
        }

        let raw = Image::<u8, 3>::from_size_val([425, 240].into(), 10)?;
        assert_eq!(prepare_frame(&raw, Some(512))?.size(), [512, 289].into());
        Ok(())
    }

    #[test]
    fn prepare_frame_scales_values() -> Result<(), StylizeError> {
        let raw = Image::<u8, 3>::new([2, 1].into(), vec![0, 51, 255, 102, 153, 204])?;
        let frame = prepare_frame(&raw, None)?;
        let expected = [0.0, 0.2, 1.0, 0.4, 0.6, 0.8];
        for (a, b) in frame.as_slice().iter().zip(expected.iter()) {
            approx::assert_relative_eq!(a, b, epsilon = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn prepare_frame_rejects_empty() -> Result<(), StylizeError> {
        let raw = Image::<u8, 3>::new([0, 0].into(), vec![])?;
        assert!(matches!(
            prepare_frame(&raw, Some(512)),
            Err(StylizeError::Image(ImageError::EmptyImage(0, 0)))
        ));
        Ok(())
    }

    #[test]
    fn rgb8_roundtrip_is_lossless() -> Result<(), StylizeError> {
        let raw = Image::<u8, 3>::from_fn([4, 3].into(), |x, y| {
            [(x * 60) as u8, (y * 100) as u8, 7]
        })?;
        let frame = prepare_frame(&raw, None)?;
        assert_eq!(to_rgb8(&frame)?, raw);
        Ok(())
    }

    #[test]
    fn tensor_layout() -> Result<(), StylizeError> {
        let image = Image::<f32, 3>::from_fn([3, 2].into(), |x, y| {
            [x as f32, y as f32, (x + 10 * y) as f32]
        })?;

        let tensor = image_to_tensor(&image, &Device::Cpu)?;
        assert_eq!(tensor.dims(), &[1, 3, 2, 3]);

        // channel 2, row 1, column 2
        let v = tensor.get(0)?.get(2)?.get(1)?.get(2)?.to_scalar::<f32>()?;
        assert_eq!(v, 12.0);

        let back: Image<f32, 3> = tensor_to_image(&tensor)?;
        assert_eq!(back, image);
        Ok(())
    }

    #[test]
    fn grey_frame_weights() -> Result<(), StylizeError> {
        let image = Image::<f32, 3>::new([1, 1].into(), vec![0.0, 1.0, 0.0])?;
        let grey = grey_frame(&image)?;
        approx::assert_relative_eq!(grey.as_slice()[0], 0.587, epsilon = 1e-6);
        Ok(())
    }
}
