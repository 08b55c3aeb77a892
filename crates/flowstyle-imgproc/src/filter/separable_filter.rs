use flowstyle_image::{Image, ImageError};
use rayon::prelude::*;

/// A separable 2D filter that applies horizontal and vertical 1D correlations sequentially.
///
/// Borders are handled by replicating the outermost pixel.
struct SeparableFilter<'a> {
    kernel_x: &'a [f32],
    kernel_y: &'a [f32],
    half_x: isize,
    half_y: isize,
}

impl<'a> SeparableFilter<'a> {
    fn new(kernel_x: &'a [f32], kernel_y: &'a [f32]) -> Self {
        Self {
            kernel_x,
            kernel_y,
            half_x: (kernel_x.len() / 2) as isize,
            half_y: (kernel_y.len() / 2) as isize,
        }
    }

    fn apply<const C: usize>(&self, src: &Image<f32, C>, dst: &mut Image<f32, C>) {
        let rows = src.rows();
        let cols = src.cols();
        if rows == 0 || cols == 0 {
            return;
        }

        let src_data = src.as_slice();
        let mut temp = vec![0.0f32; src_data.len()];
        let max_x = cols as isize - 1;
        let max_y = rows as isize - 1;

        // horizontal pass
        temp.par_chunks_exact_mut(cols * C)
            .zip(src_data.par_chunks_exact(cols * C))
            .for_each(|(row_temp, row_src)| {
                for c in 0..cols {
                    let mut acc = [0.0f32; C];
                    for (i, &k) in self.kernel_x.iter().enumerate() {
                        let x = (c as isize + i as isize - self.half_x).clamp(0, max_x) as usize;
                        let px = &row_src[x * C..x * C + C];
                        for (a, &v) in acc.iter_mut().zip(px.iter()) {
                            *a += v * k;
                        }
                    }
                    row_temp[c * C..c * C + C].copy_from_slice(&acc);
                }
            });

        // vertical pass
        dst.as_slice_mut()
            .par_chunks_exact_mut(cols * C)
            .enumerate()
            .for_each(|(r, row_dst)| {
                row_dst.iter_mut().for_each(|v| *v = 0.0);
                for (i, &k) in self.kernel_y.iter().enumerate() {
                    let y = (r as isize + i as isize - self.half_y).clamp(0, max_y) as usize;
                    let row_temp = &temp[y * cols * C..(y + 1) * cols * C];
                    for (d, &t) in row_dst.iter_mut().zip(row_temp.iter()) {
                        *d += t * k;
                    }
                }
            });
    }
}

/// Apply a separable filter to an image.
///
/// The kernels are applied as correlations: tap `i` weights the pixel at offset
/// `i - len / 2`. Out of range pixels replicate the nearest border pixel.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `kernel_x` - The horizontal kernel.
/// * `kernel_y` - The vertical kernel.
pub fn separable_filter<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    kernel_x: &[f32],
    kernel_y: &[f32],
) -> Result<(), ImageError> {
    if kernel_x.is_empty() || kernel_y.is_empty() {
        return Err(ImageError::InvalidKernelLength(
            kernel_x.len(),
            kernel_y.len(),
        ));
    }

    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    SeparableFilter::new(kernel_x, kernel_y).apply(src, dst);

    Ok(())
}
