use glam::Vec2;
use tagsight_3d::Pose;
use tagsight_image::{Image, ImageError};

use crate::config::{DetectorConfig, TagFamily};

/// Decision margin mapped to a confidence of 1.
pub const FULL_CONFIDENCE_MARGIN: f32 = 100.0;

/// Errors that can occur while running a detector.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// Error related to the input frame.
    #[error(transparent)]
    Image(#[from] ImageError),

    /// The detector backend failed.
    #[error("detector backend failed: {0}")]
    Backend(String),
}

/// One detected tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Decoded tag ID.
    pub tag_id: u32,
    /// Pixel corners in the detector's order, in the frame the detector saw.
    pub corners: Option<[Vec2; 4]>,
    /// Tag pose in the vision camera frame (X right, Y down, Z forward).
    pub raw_pose: Option<Pose>,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Per-call detector inputs besides the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Family to decode.
    pub family: TagFamily,
    /// Tag edge length, meters.
    pub tag_size: f32,
    /// Downscaling applied by the detector.
    pub decimation: u32,
    /// Horizontal field of view of the frame, degrees.
    pub horizontal_fov_deg: f32,
}

impl From<&DetectorConfig> for DetectionParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            family: config.family,
            tag_size: config.tag_size,
            decimation: config.decimation,
            horizontal_fov_deg: config.horizontal_fov_deg,
        }
    }
}

/// Host tag detector capability.
pub trait TagDetector {
    /// Detect tags in an RGBA8 frame. An empty result is not an error.
    fn detect(
        &mut self,
        frame: &Image<u8, 4>,
        params: &DetectionParams,
    ) -> Result<Vec<Detection>, DetectorError>;
}

impl<T: TagDetector + ?Sized> TagDetector for Box<T> {
    fn detect(
        &mut self,
        frame: &Image<u8, 4>,
        params: &DetectionParams,
    ) -> Result<Vec<Detection>, DetectorError> {
        (**self).detect(frame, params)
    }
}

/// Map an AprilTag decision margin onto `[0, 1]`.
pub fn confidence_from_decision_margin(decision_margin: f32) -> f32 {
    if decision_margin.is_nan() {
        return 0.0;
    }
    (decision_margin / FULL_CONFIDENCE_MARGIN).clamp(0.0, 1.0)
}
