use tagsight_image::{Image, ImageError};

use super::kernels::Kernel2d;
use crate::parallel;

/// Clamp a signed coordinate into `[0, len)`, replicating the border pixels.
#[inline]
pub(crate) fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

/// Convolve a single channel image with a dense 2D kernel.
///
/// Out-of-bounds samples replicate the nearest border pixel, so a constant
/// image is preserved by any kernel whose weights sum to one.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, 1).
/// * `dst` - The destination image with shape (H, W, 1).
/// * `kernel` - The 2D kernel.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn filter2d(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    kernel: &Kernel2d,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let rows = src.rows();
    let cols = src.cols();
    let r = kernel.radius() as isize;
    let src_data = src.as_slice();

    parallel::par_rows_indexed(dst, |y, dst_row| {
        for (x, out) in dst_row.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for dy in -r..=r {
                let sy = clamp_index(y as isize + dy, rows);
                let row_offset = sy * cols;
                for dx in -r..=r {
                    let sx = clamp_index(x as isize + dx, cols);
                    acc += src_data[row_offset + sx] * kernel.at(dx, dy);
                }
            }
            *out = acc;
        }
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::kernels::{gaussian_kernel_2d, laplacian_kernel};
    use approx::assert_relative_eq;
    use tagsight_image::ImageSize;

    #[test]
    fn test_filter2d_constant_image_preserved() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 6,
            height: 4,
        };
        let src = Image::<f32, 1>::from_size_val(size, 0.42)?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;

        filter2d(&src, &mut dst, &gaussian_kernel_2d(2, 1.0))?;
        for &v in dst.as_slice() {
            assert_relative_eq!(v, 0.42, epsilon = 1e-5);
        }

        Ok(())
    }

    #[test]
    fn test_filter2d_impulse_spreads_kernel() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 5,
            height: 5,
        };
        let mut data = vec![0.0f32; 25];
        data[12] = 1.0;
        let src = Image::<f32, 1>::new(size, data)?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;

        let kernel = gaussian_kernel_2d(1, 1.0);
        filter2d(&src, &mut dst, &kernel)?;

        assert_relative_eq!(dst.as_slice()[12], kernel.at(0, 0), epsilon = 1e-6);
        assert_relative_eq!(dst.as_slice()[11], kernel.at(1, 0), epsilon = 1e-6);
        assert_relative_eq!(dst.as_slice()[6], kernel.at(1, 1), epsilon = 1e-6);
        assert_relative_eq!(dst.as_slice()[0], 0.0);

        Ok(())
    }

    #[test]
    fn test_filter2d_laplacian_flat_is_zero() -> Result<(), ImageError> {
        let src = Image::<f32, 1>::from_size_val([3, 3].into(), 0.7)?;
        let mut dst = Image::<f32, 1>::from_size_val([3, 3].into(), 1.0)?;
        filter2d(&src, &mut dst, &laplacian_kernel())?;
        for &v in dst.as_slice() {
            assert_relative_eq!(v, 0.0, epsilon = 1e-6);
        }

        Ok(())
    }

    #[test]
    fn test_filter2d_size_mismatch() -> Result<(), ImageError> {
        let src = Image::<f32, 1>::from_size_val([3, 3].into(), 0.0)?;
        let mut dst = Image::<f32, 1>::from_size_val([2, 3].into(), 0.0)?;
        assert!(filter2d(&src, &mut dst, &laplacian_kernel()).is_err());

        Ok(())
    }
}
