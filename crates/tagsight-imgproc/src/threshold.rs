use tagsight_image::{Image, ImageError};

use crate::{
    filter::{kernels::box_blur_kernel_1d, separable_filter},
    parallel,
};

/// Binarize a normalized image against its local mean.
///
/// Each pixel becomes 1.0 when it is brighter than the mean of the
/// `block_size × block_size` window centred on it minus `constant / 255`,
/// otherwise 0.0. Borders replicate the nearest edge pixel.
///
/// # Arguments
///
/// * `src` - The input image with values in [0, 1].
/// * `dst` - The binarized output image.
/// * `block_size` - Odd window side length.
/// * `constant` - Offset subtracted from the local mean, in 8-bit intensity units.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn adaptive_threshold_mean(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    block_size: usize,
    constant: f32,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    // an even window has no centre pixel
    let block_size = block_size.max(1) | 1;
    let kernel = box_blur_kernel_1d(block_size);

    let mut local_mean = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    separable_filter(src, &mut local_mean, &kernel, &kernel)?;

    let offset = constant / 255.0;
    parallel::par_iter_rows_val_two(src, &local_mean, dst, |&v, &mean, out| {
        *out = if v > mean - offset { 1.0 } else { 0.0 };
    });

    Ok(())
}
