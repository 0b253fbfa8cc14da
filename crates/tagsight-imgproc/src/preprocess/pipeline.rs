use log::{debug, warn};
use tagsight_image::{Image, ImageError, ImageSize};

use super::{
    backend::ComputeBackend,
    buffers::{quantize_half, DoubleBuffer},
    settings::PreprocessingSettings,
    PreprocessError,
};
use crate::filter::kernels::GaussianKernel;

/// Largest frame the pipeline accepts, by pixel count.
pub const MAX_INPUT_SIZE: ImageSize = ImageSize {
    width: 1920,
    height: 1080,
};

/// A conditioning pass, in the order the pipeline runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Luma conversion, optionally downsampled.
    Grayscale,
    /// Gaussian blur.
    NoiseReduction,
    /// Histogram equalization.
    HistogramEqualization,
    /// Laplacian sharpening.
    EdgeEnhancement,
    /// Local mean binarization.
    AdaptiveThreshold,
    /// Expansion into the detector's RGBA input.
    ConvertToRgba,
}

/// Why a frame produced no processed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The frame has no pixels yet.
    EmptyFrame,
    /// The compute backend cannot run passes.
    BackendUnavailable,
    /// The frame exceeds [`MAX_INPUT_SIZE`].
    FrameTooLarge(ImageSize),
}

/// Result of running the pipeline on one frame.
#[derive(Debug)]
pub enum PreprocessOutput<'a> {
    /// The conditioned RGBA frame.
    Processed(&'a Image<u8, 4>),
    /// Nothing was produced; the caller decides whether to detect on the raw frame.
    Skipped(SkipReason),
}

impl<'a> PreprocessOutput<'a> {
    /// The conditioned frame, if any.
    pub fn image(&self) -> Option<&'a Image<u8, 4>> {
        match self {
            PreprocessOutput::Processed(image) => Some(image),
            PreprocessOutput::Skipped(_) => None,
        }
    }
}

/// Counters of GPU-style resource recreation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceStats {
    /// Times the gaussian kernel was (re)generated.
    pub kernel_builds: usize,
    /// Times the intermediate buffers were (re)allocated.
    pub buffer_allocations: usize,
}

/// Runs the conditioning passes over each frame before detection.
///
/// Resources are created lazily on the first frame and recreated only when
/// the settings or the input resolution require it.
pub struct PreprocessingPipeline {
    backend: Box<dyn ComputeBackend>,
    settings: PreprocessingSettings,
    max_input_size: ImageSize,
    kernel: Option<GaussianKernel>,
    buffers: Option<DoubleBuffer>,
    native: Option<Image<f32, 1>>,
    output: Option<Image<u8, 4>>,
    input_size: Option<ImageSize>,
    allocated_scale: f32,
    stats: ResourceStats,
    unavailable_logged: bool,
}

impl PreprocessingPipeline {
    /// Create a pipeline running on `backend`.
    pub fn new(backend: Box<dyn ComputeBackend>, settings: PreprocessingSettings) -> Self {
        Self {
            backend,
            settings: settings.sanitized(),
            max_input_size: MAX_INPUT_SIZE,
            kernel: None,
            buffers: None,
            native: None,
            output: None,
            input_size: None,
            allocated_scale: 1.0,
            stats: ResourceStats::default(),
            unavailable_logged: false,
        }
    }

    /// Override the largest accepted frame.
    pub fn with_max_input_size(mut self, size: ImageSize) -> Self {
        self.max_input_size = size;
        self
    }

    /// The active, sanitized settings.
    pub fn settings(&self) -> &PreprocessingSettings {
        &self.settings
    }

    /// Replace the settings. Affected resources are rebuilt on the next frame.
    pub fn set_settings(&mut self, settings: PreprocessingSettings) {
        self.settings = settings.sanitized();
    }

    /// Name of the backend running the passes.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Resource recreation counters.
    pub fn stats(&self) -> ResourceStats {
        self.stats
    }

    /// The passes that run for the current settings, in order.
    pub fn stages(&self) -> Vec<Stage> {
        let s = &self.settings;
        let mut stages = vec![Stage::Grayscale];
        if s.enable_noise_reduction {
            stages.push(Stage::NoiseReduction);
        }
        if s.enable_histogram_equalization {
            stages.push(Stage::HistogramEqualization);
        }
        if s.enable_edge_enhancement {
            stages.push(Stage::EdgeEnhancement);
        }
        if s.enable_adaptive_threshold {
            stages.push(Stage::AdaptiveThreshold);
        }
        stages.push(Stage::ConvertToRgba);
        stages
    }

    fn ensure_resources(&mut self, input_size: ImageSize) -> Result<(), ImageError> {
        if self.settings.enable_noise_reduction {
            let (radius, sigma) = (self.settings.blur_radius, self.settings.blur_sigma);
            let stale = self
                .kernel
                .as_ref()
                .map_or(true, |k| !k.matches(radius, sigma));
            if stale {
                debug!("building gaussian kernel radius={radius} sigma={sigma}");
                self.kernel = Some(GaussianKernel::new(radius, sigma));
                self.stats.kernel_builds += 1;
            }
        }

        let scale = self.settings.effective_scale();
        let reallocate = self.buffers.is_none()
            || self.input_size != Some(input_size)
            || self.allocated_scale != scale;

        if reallocate {
            let work_size = if scale < 1.0 {
                input_size.scaled(scale)
            } else {
                input_size
            };
            debug!("allocating preprocessing buffers input={input_size} work={work_size}");

            self.buffers = Some(DoubleBuffer::new(work_size)?);
            self.output = Some(Image::from_size_val(work_size, 0)?);
            self.native = if work_size != input_size {
                Some(Image::from_size_val(input_size, 0.0)?)
            } else {
                None
            };
            self.input_size = Some(input_size);
            self.allocated_scale = scale;
            self.stats.buffer_allocations += 1;
        }

        Ok(())
    }

    /// Condition one RGBA frame for the detector.
    ///
    /// Returns [`PreprocessOutput::Skipped`] for empty or oversized frames and
    /// when the backend is unavailable; errors are reserved for failing passes.
    pub fn process(&mut self, frame: &Image<u8, 4>) -> Result<PreprocessOutput<'_>, PreprocessError> {
        let input_size = frame.size();
        if input_size.is_empty() {
            return Ok(PreprocessOutput::Skipped(SkipReason::EmptyFrame));
        }

        if !self.backend.is_available() {
            if !self.unavailable_logged {
                warn!(
                    "compute backend '{}' unavailable, skipping preprocessing",
                    self.backend.name()
                );
                self.unavailable_logged = true;
            }
            return Ok(PreprocessOutput::Skipped(SkipReason::BackendUnavailable));
        }

        if input_size.area() > self.max_input_size.area() {
            debug!("frame {input_size} exceeds {}, skipping", self.max_input_size);
            return Ok(PreprocessOutput::Skipped(SkipReason::FrameTooLarge(
                input_size,
            )));
        }

        self.ensure_resources(input_size)?;

        let Self {
            backend,
            settings,
            kernel,
            buffers,
            native,
            output,
            ..
        } = self;
        let (Some(buffers), Some(output)) = (buffers.as_mut(), output.as_mut()) else {
            return Err(PreprocessError::ResourcesMissing);
        };
        let backend = backend.as_ref();
        let half = settings.use_half_precision;

        buffers.reset();
        match native.as_mut() {
            Some(native) => {
                backend.grayscale(frame, native)?;
                backend.resample(native, buffers.front_mut())?;
            }
            None => backend.grayscale(frame, buffers.front_mut())?,
        }
        if half {
            quantize_half(buffers.front_mut());
        }

        if settings.enable_noise_reduction {
            let kernel = kernel.as_ref().ok_or(PreprocessError::ResourcesMissing)?;
            run_pass(buffers, half, |src, dst| {
                backend.gaussian_blur(src, dst, kernel)
            })?;
        }
        if settings.enable_histogram_equalization {
            let strength = settings.histogram_strength;
            run_pass(buffers, half, |src, dst| {
                backend.equalize_histogram(src, dst, strength)
            })?;
        }
        if settings.enable_edge_enhancement {
            let strength = settings.edge_strength;
            run_pass(buffers, half, |src, dst| {
                backend.edge_enhance(src, dst, strength)
            })?;
        }
        if settings.enable_adaptive_threshold {
            let (block, constant) = (settings.adaptive_block_size, settings.adaptive_constant);
            run_pass(buffers, half, |src, dst| {
                backend.adaptive_threshold(src, dst, block, constant)
            })?;
        }

        backend.to_rgba(buffers.front(), output)?;

        Ok(PreprocessOutput::Processed(output))
    }
}

fn run_pass(
    buffers: &mut DoubleBuffer,
    half: bool,
    pass: impl FnOnce(&Image<f32, 1>, &mut Image<f32, 1>) -> Result<(), ImageError>,
) -> Result<(), ImageError> {
    let (src, dst) = buffers.split();
    pass(src, dst)?;
    if half {
        quantize_half(dst);
    }
    buffers.swap();
    Ok(())
}
