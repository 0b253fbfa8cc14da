use rayon::prelude::*;
use tagsight_image::{Image, ImageError};

use super::convolution::clamp_index;

/// A separable 2D filter that applies horizontal and vertical 1D convolutions sequentially.
///
/// This struct caches the kernel data and precomputed offsets for efficient filtering.
struct SeparableFilter<'a> {
    kernel_x: &'a [f32],
    kernel_y: &'a [f32],
    offsets_x: Vec<isize>,
    offsets_y: Vec<isize>,
}

impl<'a> SeparableFilter<'a> {
    fn new(kernel_x: &'a [f32], kernel_y: &'a [f32]) -> Self {
        let half_x = kernel_x.len() / 2;
        let half_y = kernel_y.len() / 2;

        let offsets_x = (0..kernel_x.len())
            .map(|i| i as isize - half_x as isize)
            .collect();

        let offsets_y = (0..kernel_y.len())
            .map(|i| i as isize - half_y as isize)
            .collect();

        Self {
            kernel_x,
            kernel_y,
            offsets_x,
            offsets_y,
        }
    }

    /// Performs horizontal filtering followed by vertical filtering using a temporary buffer.
    fn apply(&self, src: &[f32], dst: &mut [f32], rows: usize, cols: usize) {
        let mut temp = vec![0.0f32; src.len()];

        // Horizontal
        temp.par_chunks_mut(cols)
            .zip(src.par_chunks(cols))
            .for_each(|(row_temp, row_src)| {
                for (c, out) in row_temp.iter_mut().enumerate() {
                    let mut acc = 0.0f32;
                    for (&k, &off) in self.kernel_x.iter().zip(self.offsets_x.iter()) {
                        acc += row_src[clamp_index(c as isize + off, cols)] * k;
                    }
                    *out = acc;
                }
            });

        // Vertical
        dst.par_chunks_mut(cols)
            .enumerate()
            .for_each(|(r, row_dst)| {
                for (c, out) in row_dst.iter_mut().enumerate() {
                    let mut acc = 0.0f32;
                    for (&k, &off) in self.kernel_y.iter().zip(self.offsets_y.iter()) {
                        let y = clamp_index(r as isize + off, rows);
                        acc += temp[y * cols + c] * k;
                    }
                    *out = acc;
                }
            });
    }
}

/// Apply a separable filter to a single channel image.
///
/// Borders replicate the nearest edge pixel.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, 1).
/// * `dst` - The destination image with shape (H, W, 1).
/// * `kernel_x` - The horizontal kernel.
/// * `kernel_y` - The vertical kernel.
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn separable_filter(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    kernel_x: &[f32],
    kernel_y: &[f32],
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    if src.size().is_empty() {
        return Ok(());
    }

    let filter = SeparableFilter::new(kernel_x, kernel_y);
    filter.apply(src.as_slice(), dst.as_slice_mut(), src.rows(), src.cols());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{filter2d, kernels::GaussianKernel};
    use approx::assert_relative_eq;
    use tagsight_image::ImageSize;

    #[test]
    fn test_separable_filter_matches_dense() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 7,
            height: 5,
        };
        let src = Image::<f32, 1>::new(size, (0..35).map(|x| (x % 9) as f32 / 9.0).collect())?;

        let kernel = GaussianKernel::new(2, 1.3);
        let mut dense = Image::<f32, 1>::from_size_val(size, 0.0)?;
        let mut separable = Image::<f32, 1>::from_size_val(size, 0.0)?;

        filter2d(&src, &mut dense, &kernel.weights_2d)?;
        separable_filter(&src, &mut separable, &kernel.weights_1d, &kernel.weights_1d)?;

        for (a, b) in dense.as_slice().iter().zip(separable.as_slice()) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }

        Ok(())
    }

    #[test]
    fn test_separable_box_mean() -> Result<(), ImageError> {
        let size = ImageSize {
            width: 3,
            height: 1,
        };
        let src = Image::<f32, 1>::new(size, vec![0.0, 3.0, 6.0])?;
        let mut dst = Image::<f32, 1>::from_size_val(size, 0.0)?;
        let k = [1.0 / 3.0; 3];

        separable_filter(&src, &mut dst, &k, &[1.0])?;

        // borders replicate: [0, 0, 3] and [3, 6, 6]
        assert_relative_eq!(dst.as_slice()[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(dst.as_slice()[1], 3.0, epsilon = 1e-6);
        assert_relative_eq!(dst.as_slice()[2], 5.0, epsilon = 1e-6);

        Ok(())
    }
}
