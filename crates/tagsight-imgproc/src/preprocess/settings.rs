use serde::{Deserialize, Serialize};

/// Options controlling which conditioning passes run before detection.
///
/// Defaults mirror what detects most reliably in practice: blur and histogram
/// equalization on, sharpening and binarization off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingSettings {
    /// Binarize against the local mean.
    pub enable_adaptive_threshold: bool,
    /// Window side for the local mean, odd in 3..=21.
    pub adaptive_block_size: usize,
    /// Offset subtracted from the local mean in 8-bit units, in -10..=10.
    pub adaptive_constant: f32,
    /// Run histogram equalization.
    pub enable_histogram_equalization: bool,
    /// Blend between input (0) and fully equalized (1).
    pub histogram_strength: f32,
    /// Run the gaussian blur.
    pub enable_noise_reduction: bool,
    /// Gaussian radius in pixels, 1..=5.
    pub blur_radius: usize,
    /// Gaussian sigma, 0.5..=3.
    pub blur_sigma: f32,
    /// Run laplacian sharpening.
    pub enable_edge_enhancement: bool,
    /// Sharpening gain, 0..=2.
    pub edge_strength: f32,
    /// Store intermediate buffers at half precision.
    pub use_half_precision: bool,
    /// Shrink the frame during the grayscale pass.
    pub enable_downsampling: bool,
    /// Downsampling scale, 0.25..=1.
    pub downsample_factor: f32,
}

impl Default for PreprocessingSettings {
    fn default() -> Self {
        Self {
            enable_adaptive_threshold: false,
            adaptive_block_size: 11,
            adaptive_constant: 2.0,
            enable_histogram_equalization: true,
            histogram_strength: 0.5,
            enable_noise_reduction: true,
            blur_radius: 1,
            blur_sigma: 1.0,
            enable_edge_enhancement: false,
            edge_strength: 0.5,
            use_half_precision: false,
            enable_downsampling: false,
            downsample_factor: 0.5,
        }
    }
}

impl PreprocessingSettings {
    /// Return a copy with every option clamped into its supported range.
    ///
    /// An even block size is bumped to the next odd value.
    pub fn sanitized(&self) -> Self {
        let mut block = self.adaptive_block_size.clamp(3, 21);
        if block % 2 == 0 {
            block += 1;
        }

        Self {
            adaptive_block_size: block,
            adaptive_constant: self.adaptive_constant.clamp(-10.0, 10.0),
            histogram_strength: self.histogram_strength.clamp(0.0, 1.0),
            blur_radius: self.blur_radius.clamp(1, 5),
            blur_sigma: self.blur_sigma.clamp(0.5, 3.0),
            edge_strength: self.edge_strength.clamp(0.0, 2.0),
            downsample_factor: self.downsample_factor.clamp(0.25, 1.0),
            ..self.clone()
        }
    }

    /// Effective scale applied by the grayscale pass.
    pub fn effective_scale(&self) -> f32 {
        if self.enable_downsampling {
            self.downsample_factor
        } else {
            1.0
        }
    }
}
