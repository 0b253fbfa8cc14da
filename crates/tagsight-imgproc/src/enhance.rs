use tagsight_image::{Image, ImageError};

use crate::{
    filter::{filter2d, kernels::laplacian_kernel},
    parallel,
};

/// Performs weighted addition of two images `src1` and `src2` with weights `alpha`
/// and `beta`, and an optional scalar `gamma`. The formula used is:
///
/// dst(x,y,c) = (src1(x,y,c) * alpha + src2(x,y,c) * beta + gamma)
///
/// # Arguments
///
/// * `src1` - The first input image.
/// * `alpha` - Weight of the first image elements to be multiplied.
/// * `src2` - The second input image.
/// * `beta` - Weight of the second image elements to be multiplied.
/// * `gamma` - Scalar added to each sum.
/// * `dst` - The output image.
///
/// # Errors
///
/// Returns an error if the sizes of `src1`, `src2` and `dst` do not match.
pub fn add_weighted<const C: usize>(
    src1: &Image<f32, C>,
    alpha: f32,
    src2: &Image<f32, C>,
    beta: f32,
    gamma: f32,
    dst: &mut Image<f32, C>,
) -> Result<(), ImageError> {
    if src1.size() != src2.size() {
        return Err(ImageError::InvalidImageSize(
            src1.cols(),
            src1.rows(),
            src2.cols(),
            src2.rows(),
        ));
    }

    if src1.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src1.width(),
            src1.height(),
            dst.width(),
            dst.height(),
        ));
    }

    // compute the weighted sum
    parallel::par_iter_rows_val_two(src1, src2, dst, |&src1_pixel, &src2_pixel, dst_pixel| {
        *dst_pixel = (src1_pixel * alpha) + (src2_pixel * beta) + gamma;
    });

    Ok(())
}

/// Sharpen a normalized image by adding its laplacian response.
///
/// dst(x,y) = clamp(src(x,y) + strength * laplacian(x,y), 0, 1)
///
/// Flat regions are unchanged; edges get steeper. A `strength` of zero is the identity.
///
/// # Arguments
///
/// * `src` - The input image with values in [0, 1].
/// * `dst` - The output image.
/// * `strength` - Sharpening gain.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn edge_enhance(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    strength: f32,
) -> Result<(), ImageError> {
    let mut response = Image::<f32, 1>::from_size_val(src.size(), 0.0)?;
    filter2d(src, &mut response, &laplacian_kernel())?;

    add_weighted(src, 1.0, &response, strength, 0.0, dst)?;
    dst.as_slice_mut()
        .iter_mut()
        .for_each(|v| *v = v.clamp(0.0, 1.0));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tagsight_image::ImageSize;

    #[test]
    fn test_add_weighted() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 2,
            height: 2,
        };
        let src1 = Image::<f32, 1>::new(size, vec![1.0, 2.0, 3.0, 4.0])?;
        let src2 = Image::<f32, 1>::new(size, vec![4.0, 3.0, 2.0, 1.0])?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;

        add_weighted(&src1, 0.5, &src2, 0.5, 1.0, &mut dst)?;
        assert_eq!(dst.as_slice(), &[3.5, 3.5, 3.5, 3.5]);

        Ok(())
    }

    #[test]
    fn test_edge_enhance_steepens_step() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 4,
            height: 1,
        };
        let src = Image::<f32, 1>::new(size, vec![0.25, 0.25, 0.75, 0.75])?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;

        edge_enhance(&src, &mut dst, 0.5)?;

        // dark side of the edge gets darker, bright side brighter
        assert!(dst.as_slice()[1] < 0.25);
        assert!(dst.as_slice()[2] > 0.75);
        assert_relative_eq!(dst.as_slice()[0], 0.25, epsilon = 1e-6);
        assert_relative_eq!(dst.as_slice()[3], 0.75, epsilon = 1e-6);

        Ok(())
    }

    #[test]
    fn test_edge_enhance_zero_strength_identity() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 3,
            height: 3,
        };
        let src = Image::<f32, 1>::new(size, (0..9).map(|i| i as f32 / 8.0).collect())?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;

        edge_enhance(&src, &mut dst, 0.0)?;
        for (a, b) in src.as_slice().iter().zip(dst.as_slice()) {
            assert_relative_eq!(a, b, epsilon = 1e-6);
        }

        Ok(())
    }
}
