use flowstyle_image::{Image, ImageError, ImageSize};

/// Create the sampling grid that maps `dst_size` pixel centres onto `src_size`.
///
/// Pixel `x` of the destination samples the source at
/// `(x + 0.5) * src_width / dst_width - 0.5`, the same for rows.
pub fn meshgrid_resize(
    src_size: ImageSize,
    dst_size: ImageSize,
) -> Result<(Image<f32, 1>, Image<f32, 1>), ImageError> {
    let scale_x = src_size.width as f32 / dst_size.width.max(1) as f32;
    let scale_y = src_size.height as f32 / dst_size.height.max(1) as f32;

    let map_x = Image::from_fn(dst_size, |x, _| [(x as f32 + 0.5) * scale_x - 0.5])?;
    let map_y = Image::from_fn(dst_size, |_, y| [(y as f32 + 0.5) * scale_y - 0.5])?;

    Ok((map_x, map_y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meshgrid_resize() -> Result<(), ImageError> {
        let (map_x, map_y) = meshgrid_resize([4, 2].into(), [2, 2].into())?;
        assert_eq!(map_x.as_slice(), &[0.5, 2.5, 0.5, 2.5]);
        assert_eq!(map_y.as_slice(), &[0.0, 0.0, 1.0, 1.0]);
        Ok(())
    }
}
