use std::time::Duration;

use tagsight_3d::{CameraIntrinsics, Pose};
use tagsight_image::Image;

/// One camera frame with the rig state it was captured at.
#[derive(Clone)]
pub struct Frame {
    /// RGBA8 pixels.
    pub image: Image<u8, 4>,
    /// World pose of the camera at capture.
    pub camera_pose: Pose,
    /// Calibrated intrinsics, when the host provides them.
    pub intrinsics: Option<CameraIntrinsics>,
    /// Session time of capture.
    pub timestamp: Duration,
}

impl Frame {
    /// Whether the frame carries no pixels.
    pub fn is_empty(&self) -> bool {
        self.image.size().is_empty()
    }
}

/// Host camera capability.
pub trait FrameSource {
    /// The latest frame, or `None` when none is ready this tick.
    fn next_frame(&mut self) -> Option<Frame>;
}
