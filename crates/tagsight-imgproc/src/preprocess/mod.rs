mod backend;
mod buffers;
mod pipeline;
mod settings;

pub use backend::{ComputeBackend, CpuBackend};
pub use buffers::{quantize_half, DoubleBuffer};
pub use pipeline::{
    PreprocessOutput, PreprocessingPipeline, ResourceStats, SkipReason, Stage, MAX_INPUT_SIZE,
};
pub use settings::PreprocessingSettings;

use tagsight_image::ImageError;

/// An error type for the preprocessing pipeline.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PreprocessError {
    /// A pass failed on the input or intermediate buffers.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// Buffers or kernels were not prepared before running the passes.
    #[error("preprocessing resources are not allocated")]
    ResourcesMissing,
}
