use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::{
    camera::{
        CameraIntrinsics, CameraModel, DepthRange, DistanceCurve, IdentityDistanceCurve,
        PiecewiseDistanceCurve,
    },
    corners,
    direct::{self, DirectCalibration},
    pose::Pose,
    raycast::EnvironmentRaycaster,
};

/// Which positioning strategy the estimator may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseMode {
    /// Corners first, then the direct pose, then the apparent size.
    #[default]
    Auto,
    /// Corner reconstruction only.
    CornersOnly,
    /// Detector pose only.
    DirectOnly,
}

/// Strategy that produced a world pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseSource {
    /// Reconstructed from the four corners.
    Corners,
    /// The detector's camera-relative pose.
    Direct,
    /// Corner centroid at the depth implied by the tag's apparent size.
    ApparentSize,
}

/// Pose estimation options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseSettings {
    /// Positioning strategy.
    pub mode: PoseMode,
    /// Offset added to the camera-relative position, meters.
    pub position_offset: Vec3,
    /// Rotation offset, Euler degrees (x, y, z).
    pub rotation_offset_deg: Vec3,
    /// Uniform scale of the camera-relative position.
    pub position_scale: f32,
    /// Correct detector distances with the piecewise curve.
    pub apply_distance_scaling: bool,
    /// Valid detection distances.
    pub depth_range: DepthRange,
    /// Ignore camera pitch and roll when composing the direct pose.
    pub world_locked_rotation: bool,
    /// Per-frame blend towards the new pose, 0 keeps the previous pose, 1 disables smoothing.
    pub smoothing: f32,
}

impl Default for PoseSettings {
    fn default() -> Self {
        Self {
            mode: PoseMode::Auto,
            position_offset: Vec3::ZERO,
            rotation_offset_deg: Vec3::ZERO,
            position_scale: 1.0,
            apply_distance_scaling: true,
            depth_range: DepthRange::default(),
            world_locked_rotation: false,
            smoothing: 1.0,
        }
    }
}

impl PoseSettings {
    /// Calibration used by the direct pose.
    pub fn direct_calibration(&self) -> DirectCalibration {
        DirectCalibration {
            position_offset: self.position_offset,
            rotation_offset_deg: self.rotation_offset_deg,
            position_scale: self.position_scale,
            world_locked_rotation: self.world_locked_rotation,
            depth_range: self.depth_range,
        }
    }
}

/// Turns a detection into a world pose.
pub struct PoseEstimator {
    model: CameraModel,
    tag_size: f32,
    settings: PoseSettings,
    curve: Box<dyn DistanceCurve>,
}

impl PoseEstimator {
    /// Create an estimator for tags of edge `tag_size` meters.
    pub fn new(intrinsics: CameraIntrinsics, tag_size: f32, settings: PoseSettings) -> Self {
        let curve: Box<dyn DistanceCurve> = if settings.apply_distance_scaling {
            Box::new(PiecewiseDistanceCurve)
        } else {
            Box::new(IdentityDistanceCurve)
        };
        Self {
            model: CameraModel::new(intrinsics, settings.depth_range),
            tag_size,
            settings,
            curve,
        }
    }

    /// Replace the distance calibration curve.
    pub fn with_distance_curve(mut self, curve: Box<dyn DistanceCurve>) -> Self {
        self.curve = curve;
        self
    }

    /// The camera model.
    pub fn model(&self) -> &CameraModel {
        &self.model
    }

    /// Active settings.
    pub fn settings(&self) -> &PoseSettings {
        &self.settings
    }

    /// Swap the intrinsics, e.g. after a resolution change.
    pub fn set_intrinsics(&mut self, intrinsics: CameraIntrinsics) {
        self.model.intrinsics = intrinsics;
    }

    /// Estimate the world pose of a tag.
    ///
    /// `corners` are the detector's pixel corners in its own order and
    /// `raw_pose` its pose in the vision camera frame. Returns `None` when no
    /// allowed strategy yields a finite pose.
    pub fn estimate(
        &self,
        corners: Option<&[Vec2; 4]>,
        raw_pose: Option<&Pose>,
        camera_pose: &Pose,
        raycaster: &dyn EnvironmentRaycaster,
    ) -> Option<(Pose, PoseSource)> {
        let mode = self.settings.mode;

        if mode != PoseMode::DirectOnly {
            if let Some(pixels) = corners {
                let pose = corners::reconstruct_pose(
                    &self.model,
                    self.tag_size,
                    self.curve.as_ref(),
                    pixels,
                    raw_pose,
                    camera_pose,
                    raycaster,
                );
                if let Some(pose) = pose {
                    return Some((pose, PoseSource::Corners));
                }
            }
        }

        if mode != PoseMode::CornersOnly {
            if let Some(raw) = raw_pose {
                let pose = direct::direct_world_pose(
                    raw,
                    camera_pose,
                    &self.settings.direct_calibration(),
                    self.curve.as_ref(),
                );
                if let Some(pose) = pose {
                    return Some((pose, PoseSource::Direct));
                }
            }
        }

        if mode == PoseMode::Auto {
            if let Some(pixels) = corners {
                return self
                    .apparent_size_pose(pixels, camera_pose)
                    .map(|pose| (pose, PoseSource::ApparentSize));
            }
        }

        None
    }

    // centroid ray at the apparent-size depth, facing the viewer
    fn apparent_size_pose(&self, pixels: &[Vec2; 4], camera_pose: &Pose) -> Option<Pose> {
        let center = pixels.iter().copied().sum::<Vec2>() / 4.0;
        let ray = self.model.ray_through_pixel(center, camera_pose)?;
        let depth =
            corners::apparent_size_depth(&self.model, self.tag_size, self.curve.as_ref(), pixels)?;
        Some(Pose::new(
            ray.at(depth),
            Quat::from_rotation_arc(Vec3::Y, -ray.direction),
        ))
    }
}
