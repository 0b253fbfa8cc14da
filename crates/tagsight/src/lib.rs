#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Configuration of detection, pose estimation, anchoring and preprocessing.
pub mod config;

/// Host capability status.
pub mod context;

/// Tag detector capability and detections.
pub mod detector;

/// Per-frame detection to world pose pipeline.
pub mod pipeline;

/// Session orchestration of the pipeline and the anchor state machine.
pub mod session;

/// Camera frames and their source.
pub mod source;

/// Detector invocation rate limiting.
pub mod throttle;

/// Per-tag visualization handles.
pub mod visual;

pub use config::{ConfigError, DetectorConfig, TagFamily, TagsightConfig};
pub use context::CapabilityContext;
pub use detector::{Detection, DetectionParams, DetectorError, TagDetector};
pub use pipeline::{DetectionPipeline, FrameReport, WorldTagPose};
pub use session::{TagsightSession, TickReport};
pub use source::{Frame, FrameSource};
pub use throttle::DetectionThrottle;
pub use visual::{VisualHandle, VisualRegistry};

pub use tagsight_3d as geometry;
pub use tagsight_anchor as anchor;
pub use tagsight_image as image;
pub use tagsight_imgproc as imgproc;
