use rayon::prelude::*;
use tagsight_image::{Image, ImageError};

use crate::parallel;

/// Number of intensity bins used by the equalization pass.
pub const NUM_INTENSITY_BINS: usize = 256;

/// Map a normalized intensity to its 8-bit bin.
#[inline]
fn intensity_bin(v: f32) -> usize {
    (v.clamp(0.0, 1.0) * 255.0).round() as usize
}

/// Compute the 256-bin intensity histogram of a normalized floating point image.
///
/// Values are clamped to [0, 1] and rounded to the nearest 8-bit level.
pub fn compute_histogram_f32(src: &Image<f32, 1>) -> [usize; NUM_INTENSITY_BINS] {
    let counts = accumulate(src.as_slice(), NUM_INTENSITY_BINS, |v| intensity_bin(*v));
    let mut hist = [0usize; NUM_INTENSITY_BINS];
    hist.copy_from_slice(&counts);
    hist
}

fn accumulate<T: Sync>(
    data: &[T],
    num_bins: usize,
    bin_of: impl Fn(&T) -> usize + Send + Sync,
) -> Vec<usize> {
    data.par_chunks(4096)
        .fold(
            || vec![0usize; num_bins],
            |mut local, chunk| {
                for px in chunk {
                    local[bin_of(px)] += 1;
                }
                local
            },
        )
        .reduce(
            || vec![0usize; num_bins],
            |mut a, b| {
                for (i, val) in b.iter().enumerate() {
                    a[i] += val;
                }
                a
            },
        )
}

/// Build the equalization lookup table from a histogram.
///
/// Each entry maps an 8-bit level to `(cdf(v) - cdf_min) / (N - cdf_min)`, the
/// classic CDF remapping. A histogram with a single occupied level has no
/// spread to redistribute and yields the identity table.
pub fn equalization_lut(hist: &[usize; NUM_INTENSITY_BINS]) -> [f32; NUM_INTENSITY_BINS] {
    let mut lut = [0.0f32; NUM_INTENSITY_BINS];

    let total: usize = hist.iter().sum();
    let cdf_min = hist.iter().copied().find(|&c| c > 0).unwrap_or(0);
    let denom = total.saturating_sub(cdf_min);

    if denom == 0 {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as f32 / 255.0;
        }
        return lut;
    }

    let mut cdf = 0usize;
    for (i, v) in lut.iter_mut().enumerate() {
        cdf += hist[i];
        *v = cdf.saturating_sub(cdf_min) as f32 / denom as f32;
    }

    lut
}

/// Equalize the histogram of a normalized image, blended with the input.
///
/// dst(x,y) = src(x,y) * (1 - strength) + equalized(x,y) * strength
///
/// `strength = 0` leaves the image untouched and `strength = 1` is full
/// CDF-based equalization.
///
/// # Arguments
///
/// * `src` - The input image with values in [0, 1].
/// * `dst` - The output image.
/// * `strength` - Blend factor, clamped to [0, 1].
///
/// PRECONDITION: `src` and `dst` must have the same shape.
pub fn equalize_histogram(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    strength: f32,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let strength = strength.clamp(0.0, 1.0);
    let lut = equalization_lut(&compute_histogram_f32(src));

    parallel::par_iter_rows_val(src, dst, |&v, out| {
        let equalized = lut[intensity_bin(v)];
        *out = v * (1.0 - strength) + equalized * strength;
    });

    Ok(())
}
