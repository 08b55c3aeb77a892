use std::path::Path;

use flowstyle_image::{Image, ImageSize};
use image::{ExtendedColorType, ImageFormat};

use crate::error::IoError;

/// Writes the given PNG _(rgb8)_ data to the given file path.
///
/// # Arguments
///
/// - `file_path` - The path to the PNG image.
/// - `image` - The tensor containing the PNG image data.
pub fn write_image_png_rgb8(
    file_path: impl AsRef<Path>,
    image: &Image<u8, 3>,
) -> Result<(), IoError> {
    write_png_impl(
        file_path,
        image.as_slice(),
        image.size(),
        ExtendedColorType::Rgb8,
    )
}

/// Writes the given PNG _(gray8)_ data to the given file path.
///
/// # Arguments
///
/// - `file_path` - The path to the PNG image.
/// - `image` - The tensor containing the PNG image data.
pub fn write_image_png_gray8(
    file_path: impl AsRef<Path>,
    image: &Image<u8, 1>,
) -> Result<(), IoError> {
    write_png_impl(
        file_path,
        image.as_slice(),
        image.size(),
        ExtendedColorType::L8,
    )
}

fn write_png_impl(
    file_path: impl AsRef<Path>,
    image_data: &[u8],
    image_size: ImageSize,
    color_type: ExtendedColorType,
) -> Result<(), IoError> {
    image::save_buffer_with_format(
        file_path,
        image_data,
        image_size.width as u32,
        image_size.height as u32,
        color_type,
        ImageFormat::Png,
    )
    .map_err(|e| IoError::PngEncodingError(e.to_string()))
}
