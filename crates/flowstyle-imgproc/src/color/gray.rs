use crate::parallel;
use flowstyle_image::{Image, ImageError};

/// Define the RGB weights for the grayscale conversion.
const RW: f64 = 0.299;
const GW: f64 = 0.587;
const BW: f64 = 0.114;

/// Convert an RGB image to grayscale using the formula:
///
/// Y = 0.299 * R + 0.587 * G + 0.114 * B
///
/// # Arguments
///
/// * `src` - The input RGB image.
/// * `dst` - The output grayscale image.
///
/// Precondition: the input and output images must have the same size.
///
/// # Example
///
/// ```
/// use flowstyle_image::{Image, ImageSize};
/// use flowstyle_imgproc::color::gray_from_rgb;
///
/// let image = Image::<f32, 3>::new(
///     ImageSize {
///         width: 4,
///         height: 5,
///     },
///     vec![0f32; 4 * 5 * 3],
/// )
/// .unwrap();
///
/// let mut gray = Image::<f32, 1>::from_size_val(image.size(), 0.0).unwrap();
///
/// gray_from_rgb(&image, &mut gray).unwrap();
/// assert_eq!(gray.num_channels(), 1);
/// assert_eq!(gray.size().width, 4);
/// assert_eq!(gray.size().height, 5);
/// ```
pub fn gray_from_rgb<T>(src: &Image<T, 3>, dst: &mut Image<T, 1>) -> Result<(), ImageError>
where
    T: Send + Sync + num_traits::Float,
{
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let rw = T::from(RW).ok_or(ImageError::CastError("gray weight".to_string()))?;
    let gw = T::from(GW).ok_or(ImageError::CastError("gray weight".to_string()))?;
    let bw = T::from(BW).ok_or(ImageError::CastError("gray weight".to_string()))?;

    // parallelize the grayscale conversion by rows
    parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
        let r = src_pixel[0];
        let g = src_pixel[1];
        let b = src_pixel[2];
        dst_pixel[0] = rw * r + gw * g + bw * b;
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use flowstyle_image::{Image, ImageError, ImageSize};

    #[test]
    fn gray_from_rgb() -> Result<(), ImageError> {
        let image = Image::<f32, 3>::new(
            ImageSize {
                width: 2,
                height: 1,
            },
            vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0],
        )?;

        let mut gray = Image::<f32, 1>::from_size_val(image.size(), 0.0)?;
        super::gray_from_rgb(&image, &mut gray)?;

        approx::assert_relative_eq!(gray.as_slice()[0], 1.0, epsilon = 1e-6);
        approx::assert_relative_eq!(gray.as_slice()[1], 0.299, epsilon = 1e-6);

        Ok(())
    }

    #[test]
    fn gray_size_mismatch() -> Result<(), ImageError> {
        let image = Image::<f32, 3>::from_size_val([2, 2].into(), 0.0)?;
        let mut gray = Image::<f32, 1>::from_size_val([2, 3].into(), 0.0)?;
        assert!(super::gray_from_rgb(&image, &mut gray).is_err());

        Ok(())
    }
}
