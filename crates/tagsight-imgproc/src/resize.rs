use tagsight_image::{Image, ImageError};

use crate::parallel;

/// Resize a floating point image using bilinear interpolation.
///
/// Pixel centres are aligned, so shrinking by an integer factor samples
/// between the source pixels that fold into each destination pixel.
///
/// # Arguments
///
/// * `src` - The input image.
/// * `dst` - The output image. Its size sets the target resolution.
///
/// # Errors
///
/// Returns an error if either image is empty.
///
/// # Example
///
/// ```
/// use tagsight_image::{Image, ImageSize};
/// use tagsight_imgproc::resize::resize_bilinear;
///
/// let src = Image::<f32, 1>::from_size_val(ImageSize { width: 4, height: 4 }, 0.5).unwrap();
/// let mut dst = Image::<f32, 1>::from_size_val(ImageSize { width: 2, height: 2 }, 0.0).unwrap();
///
/// resize_bilinear(&src, &mut dst).unwrap();
/// assert_eq!(dst.as_slice(), &[0.5, 0.5, 0.5, 0.5]);
/// ```
pub fn resize_bilinear<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
) -> Result<(), ImageError> {
    if src.size().is_empty() {
        return Err(ImageError::EmptyImage(src.cols(), src.rows()));
    }
    if dst.size().is_empty() {
        return Err(ImageError::EmptyImage(dst.cols(), dst.rows()));
    }

    if src.size() == dst.size() {
        dst.as_slice_mut().copy_from_slice(src.as_slice());
        return Ok(());
    }

    let (src_w, src_h) = (src.cols(), src.rows());
    let scale_x = src_w as f32 / dst.cols() as f32;
    let scale_y = src_h as f32 / dst.rows() as f32;
    let src_data = src.as_slice();

    parallel::par_rows_indexed(dst, |y, dst_row| {
        let fy = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (src_h - 1) as f32);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let wy = fy - y0 as f32;

        for (x, dst_pixel) in dst_row.chunks_exact_mut(C).enumerate() {
            let fx = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (src_w - 1) as f32);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let wx = fx - x0 as f32;

            for (ch, out) in dst_pixel.iter_mut().enumerate() {
                let p00 = src_data[(y0 * src_w + x0) * C + ch];
                let p01 = src_data[(y0 * src_w + x1) * C + ch];
                let p10 = src_data[(y1 * src_w + x0) * C + ch];
                let p11 = src_data[(y1 * src_w + x1) * C + ch];
                let top = p00 + (p01 - p00) * wx;
                let bottom = p10 + (p11 - p10) * wx;
                *out = top + (bottom - top) * wy;
            }
        }
    });

    Ok(())
}
