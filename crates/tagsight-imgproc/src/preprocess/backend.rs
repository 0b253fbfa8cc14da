use tagsight_image::{Image, ImageError};

use crate::{
    color, enhance,
    filter::{self, kernels::GaussianKernel},
    histogram, resize, threshold,
};

/// A device capable of running the conditioning passes.
///
/// Each pass reads `src` and writes `dst`; the two never alias. The pipeline
/// calls passes strictly in order and treats each call as complete on return.
pub trait ComputeBackend {
    /// Human readable backend name used in logs.
    fn name(&self) -> &str;

    /// Whether the device can run passes right now.
    fn is_available(&self) -> bool;

    /// Luma conversion of an RGBA8 frame into a normalized single channel buffer.
    fn grayscale(&self, src: &Image<u8, 4>, dst: &mut Image<f32, 1>) -> Result<(), ImageError>;

    /// Resample `src` into the resolution of `dst`.
    fn resample(&self, src: &Image<f32, 1>, dst: &mut Image<f32, 1>) -> Result<(), ImageError>;

    /// Gaussian blur with a precomputed kernel.
    fn gaussian_blur(
        &self,
        src: &Image<f32, 1>,
        dst: &mut Image<f32, 1>,
        kernel: &GaussianKernel,
    ) -> Result<(), ImageError>;

    /// Histogram equalization blended with the input by `strength`.
    fn equalize_histogram(
        &self,
        src: &Image<f32, 1>,
        dst: &mut Image<f32, 1>,
        strength: f32,
    ) -> Result<(), ImageError>;

    /// Laplacian sharpening.
    fn edge_enhance(
        &self,
        src: &Image<f32, 1>,
        dst: &mut Image<f32, 1>,
        strength: f32,
    ) -> Result<(), ImageError>;

    /// Local mean binarization.
    fn adaptive_threshold(
        &self,
        src: &Image<f32, 1>,
        dst: &mut Image<f32, 1>,
        block_size: usize,
        constant: f32,
    ) -> Result<(), ImageError>;

    /// Expand the single channel buffer into the RGBA8 frame the detector consumes.
    fn to_rgba(&self, src: &Image<f32, 1>, dst: &mut Image<u8, 4>) -> Result<(), ImageError>;
}

/// Runs every pass on the CPU, parallelized over rows with rayon.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend {
    /// Use the dense 2D kernel instead of the separable factorization.
    pub dense_blur: bool,
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn grayscale(&self, src: &Image<u8, 4>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
        color::gray_from_rgba8(src, dst)
    }

    fn resample(&self, src: &Image<f32, 1>, dst: &mut Image<f32, 1>) -> Result<(), ImageError> {
        resize::resize_bilinear(src, dst)
    }

    fn gaussian_blur(
        &self,
        src: &Image<f32, 1>,
        dst: &mut Image<f32, 1>,
        kernel: &GaussianKernel,
    ) -> Result<(), ImageError> {
        if self.dense_blur {
            filter::filter2d(src, dst, &kernel.weights_2d)
        } else {
            filter::separable_filter(src, dst, &kernel.weights_1d, &kernel.weights_1d)
        }
    }

    fn equalize_histogram(
        &self,
        src: &Image<f32, 1>,
        dst: &mut Image<f32, 1>,
        strength: f32,
    ) -> Result<(), ImageError> {
        histogram::equalize_histogram(src, dst, strength)
    }

    fn edge_enhance(
        &self,
        src: &Image<f32, 1>,
        dst: &mut Image<f32, 1>,
        strength: f32,
    ) -> Result<(), ImageError> {
        enhance::edge_enhance(src, dst, strength)
    }

    fn adaptive_threshold(
        &self,
        src: &Image<f32, 1>,
        dst: &mut Image<f32, 1>,
        block_size: usize,
        constant: f32,
    ) -> Result<(), ImageError> {
        threshold::adaptive_threshold_mean(src, dst, block_size, constant)
    }

    fn to_rgba(&self, src: &Image<f32, 1>, dst: &mut Image<u8, 4>) -> Result<(), ImageError> {
        color::rgba8_from_gray(src, dst)
    }
}
