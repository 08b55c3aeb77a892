use flowstyle_image::Image;

/// Kernel for bilinear interpolation with clamped borders.
///
/// The sampling policy is:
///
/// * both axes outside `[0, len - 1)`: the nearest corner pixel.
/// * one axis outside: that axis is clamped to `0` or `len - 1` and the other
///   axis is interpolated linearly.
/// * otherwise: the standard four neighbour bilinear interpolation.
///
/// Non-finite coordinates are treated as out of range on the far side.
///
/// # Arguments
///
/// * `image` - The input image container.
/// * `u` - The x coordinate of the pixel to interpolate.
/// * `v` - The y coordinate of the pixel to interpolate.
///
/// # Returns
///
/// The interpolated pixel values. An empty image yields zeros.
pub fn bilinear_interpolation<const C: usize>(image: &Image<f32, C>, u: f32, v: f32) -> [f32; C] {
    let (rows, cols) = (image.rows(), image.cols());
    let mut pixel = [0.0; C];

    if rows == 0 || cols == 0 {
        return pixel;
    }

    let max_u = (cols - 1) as f32;
    let max_v = (rows - 1) as f32;

    let u_inside = u >= 0.0 && u < max_u;
    let v_inside = v >= 0.0 && v < max_v;

    let clamp_index = |t: f32, max_index: usize| if t < 0.0 { 0 } else { max_index };

    match (u_inside, v_inside) {
        (false, false) => {
            let iu = clamp_index(u, cols - 1);
            let iv = clamp_index(v, rows - 1);
            pixel.copy_from_slice(image.pixel(iu, iv));
        }
        (false, true) => {
            let iu = clamp_index(u, cols - 1);
            let iv0 = v.floor() as usize;
            let frac_v = v - iv0 as f32;
            let p0 = image.pixel(iu, iv0);
            let p1 = image.pixel(iu, iv0 + 1);
            for k in 0..C {
                pixel[k] = p0[k] + frac_v * (p1[k] - p0[k]);
            }
        }
        (true, false) => {
            let iv = clamp_index(v, rows - 1);
            let iu0 = u.floor() as usize;
            let frac_u = u - iu0 as f32;
            let p0 = image.pixel(iu0, iv);
            let p1 = image.pixel(iu0 + 1, iv);
            for k in 0..C {
                pixel[k] = p0[k] + frac_u * (p1[k] - p0[k]);
            }
        }
        (true, true) => {
            let iu0 = u.floor() as usize;
            let iv0 = v.floor() as usize;

            let frac_u = u - iu0 as f32;
            let frac_v = v - iv0 as f32;
            let frac_uu = 1.0 - frac_u;
            let frac_vv = 1.0 - frac_v;

            let w00 = frac_uu * frac_vv;
            let w01 = frac_u * frac_vv;
            let w10 = frac_uu * frac_v;
            let w11 = frac_u * frac_v;

            let p00 = image.pixel(iu0, iv0);
            let p01 = image.pixel(iu0 + 1, iv0);
            let p10 = image.pixel(iu0, iv0 + 1);
            let p11 = image.pixel(iu0 + 1, iv0 + 1);

            for k in 0..C {
                pixel[k] = p00[k] * w00 + p01[k] * w01 + p10[k] * w10 + p11[k] * w11;
            }
        }
    }

    pixel
}
