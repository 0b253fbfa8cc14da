use crate::parallel;
use tagsight_image::{Image, ImageError};

/// Define the RGB weights for the grayscale conversion.
const RW: f32 = 0.299;
const GW: f32 = 0.587;
const BW: f32 = 0.114;

/// Convert an RGBA8 frame to a normalized floating point grayscale image using the formula:
///
/// Y = (0.299 * R + 0.587 * G + 0.114 * B) / 255
///
/// The alpha channel is ignored.
///
/// # Arguments
///
/// * `src` - The input RGBA8 image.
/// * `dst` - The output grayscale image with values in [0, 1].
///
/// Precondition: the input and output images must have the same size.
///
/// # Example
///
/// ```
/// use tagsight_image::{Image, ImageSize};
/// use tagsight_imgproc::color::gray_from_rgba8;
///
/// let image = Image::<u8, 4>::new(
///     ImageSize {
///         width: 1,
///         height: 1,
///     },
///     vec![255, 255, 255, 0],
/// )
/// .unwrap();
///
/// let mut gray = Image::<f32, 1>::from_size_val(image.size(), 0.0).unwrap();
///
/// gray_from_rgba8(&image, &mut gray).unwrap();
/// assert!((gray.as_slice()[0] - 1.0).abs() < 1e-6);
/// ```
pub fn gray_from_rgba8(src: &Image<u8, 4>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    // parallelize the grayscale conversion by rows
    parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
        let r = src_pixel[0] as f32;
        let g = src_pixel[1] as f32;
        let b = src_pixel[2] as f32;
        dst_pixel[0] = (RW * r + GW * g + BW * b) / 255.0;
    });

    Ok(())
}

/// Expand a normalized grayscale image into an opaque RGBA8 image.
///
/// The intensity is replicated across the three color channels and alpha is set to 255.
/// Values outside [0, 1] are clamped.
///
/// Precondition: the input and output images must have the same size.
pub fn rgba8_from_gray(src: &Image<f32, 1>, dst: &mut Image<u8, 4>) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    parallel::par_iter_rows(src, dst, |src_pixel, dst_pixel| {
        let v = (src_pixel[0].clamp(0.0, 1.0) * 255.0).round() as u8;
        dst_pixel[0] = v;
        dst_pixel[1] = v;
        dst_pixel[2] = v;
        dst_pixel[3] = 255;
    });

    Ok(())
}
