use glam::{UVec2, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{pose::Pose, raycast::Ray};

/// Error types for camera operations.
#[derive(Debug, Error, PartialEq)]
pub enum CameraError {
    /// Focal lengths must be positive and finite.
    #[error("Invalid focal length ({0}, {1})")]
    InvalidFocalLength(f32, f32),

    /// Both image dimensions must be non zero.
    #[error("Invalid resolution {0}x{1}")]
    InvalidResolution(u32, u32),

    /// Field of view must lie in (0, 180) degrees.
    #[error("Invalid field of view {0} degrees")]
    InvalidFieldOfView(f32),

    /// Depth bounds must satisfy `0 < min < max`.
    #[error("Invalid depth range [{0}, {1}]")]
    InvalidDepthRange(f32, f32),
}

/// Distances in meters at which a tag can be detected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthRange {
    /// Nearest valid distance.
    pub min: f32,
    /// Farthest valid distance.
    pub max: f32,
}

impl Default for DepthRange {
    fn default() -> Self {
        Self {
            min: 0.3,
            max: 20.0,
        }
    }
}

impl DepthRange {
    /// Create a validated range.
    pub fn new(min: f32, max: f32) -> Result<Self, CameraError> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    /// Check `0 < min < max`.
    pub fn validate(&self) -> Result<(), CameraError> {
        if !(self.min > 0.0 && self.min < self.max && self.max.is_finite()) {
            return Err(CameraError::InvalidDepthRange(self.min, self.max));
        }
        Ok(())
    }

    /// Clamp a distance into the range.
    pub fn clamp(&self, distance: f32) -> f32 {
        distance.clamp(self.min, self.max)
    }

    /// Whether `distance` lies inside the range.
    pub fn contains(&self, distance: f32) -> bool {
        distance >= self.min && distance <= self.max
    }
}

/// Calibration curve correcting distances reported by the detector.
pub trait DistanceCurve: Send + Sync {
    /// Corrected distance for a raw distance in meters.
    fn apply(&self, distance: f32) -> f32;
}

/// Piecewise linear correction of the detector's depth non-linearity.
///
/// | raw distance | factor |
/// |---|---|
/// | `d <= 1` | 0.9 |
/// | `1 < d <= 5` | 1.0 |
/// | `5 < d <= 10` | 1.1 |
/// | `d > 10` | 1.2 |
///
/// Tuned for 0.3 m to 20 m.
#[derive(Debug, Clone, Copy, Default)]
pub struct PiecewiseDistanceCurve;

impl DistanceCurve for PiecewiseDistanceCurve {
    fn apply(&self, distance: f32) -> f32 {
        let factor = if distance <= 1.0 {
            0.9
        } else if distance <= 5.0 {
            1.0
        } else if distance <= 10.0 {
            1.1
        } else {
            1.2
        };
        distance * factor
    }
}

/// Leaves distances unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityDistanceCurve;

impl DistanceCurve for IdentityDistanceCurve {
    fn apply(&self, distance: f32) -> f32 {
        distance
    }
}

/// Intrinsic parameters of a pinhole camera, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length (fx, fy).
    pub focal_length: Vec2,
    /// Principal point (cx, cy).
    pub principal_point: Vec2,
    /// Axis skew.
    pub skew: f32,
    /// Image (width, height).
    pub resolution: UVec2,
}

impl CameraIntrinsics {
    /// Create validated intrinsics.
    pub fn new(
        focal_length: Vec2,
        principal_point: Vec2,
        skew: f32,
        resolution: UVec2,
    ) -> Result<Self, CameraError> {
        if !(focal_length.x > 0.0 && focal_length.y > 0.0 && focal_length.is_finite()) {
            return Err(CameraError::InvalidFocalLength(
                focal_length.x,
                focal_length.y,
            ));
        }
        if resolution.x == 0 || resolution.y == 0 {
            return Err(CameraError::InvalidResolution(resolution.x, resolution.y));
        }
        Ok(Self {
            focal_length,
            principal_point,
            skew,
            resolution,
        })
    }

    /// Square-pixel intrinsics from a horizontal field of view, principal point centered.
    pub fn from_horizontal_fov(fov_deg: f32, resolution: UVec2) -> Result<Self, CameraError> {
        if !(fov_deg > 0.0 && fov_deg < 180.0) {
            return Err(CameraError::InvalidFieldOfView(fov_deg));
        }
        let half_width = resolution.x as f32 / 2.0;
        let f = half_width / (fov_deg.to_radians() / 2.0).tan();
        Self::new(
            Vec2::splat(f),
            Vec2::new(half_width, resolution.y as f32 / 2.0),
            0.0,
            resolution,
        )
    }

    /// Resolution as floats.
    pub fn size(&self) -> Vec2 {
        self.resolution.as_vec2()
    }

    /// Depth at which an edge of `tag_size` meters spans `edge_px` pixels.
    ///
    /// Returns `None` for edges too short to measure.
    pub fn estimate_distance(&self, edge_px: f32, tag_size: f32) -> Option<f32> {
        if !(edge_px > 1e-3) || !(tag_size > 0.0) {
            return None;
        }
        Some(self.focal_length.x * tag_size / edge_px)
    }
}

/// Camera intrinsics together with the depth range detections are valid in.
///
/// Camera space follows the vision convention: X right, Y down, Z forward.
/// Viewport coordinates are normalized to `[0, 1]` with the origin at the
/// bottom left, as the host's ray casting expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraModel {
    /// Pinhole intrinsics.
    pub intrinsics: CameraIntrinsics,
    /// Valid detection distances.
    pub depth_range: DepthRange,
}

impl CameraModel {
    /// Create a camera model.
    pub fn new(intrinsics: CameraIntrinsics, depth_range: DepthRange) -> Self {
        Self {
            intrinsics,
            depth_range,
        }
    }

    /// Clamp a depth into the detection range.
    pub fn clamp_depth(&self, depth: f32) -> f32 {
        self.depth_range.clamp(depth)
    }

    /// Project a camera space point to pixel coordinates.
    ///
    /// The depth is clamped into the detection range before the division and
    /// the result is clamped to the image.
    pub fn project(&self, point: Vec3) -> Vec2 {
        let k = &self.intrinsics;
        let z = self.clamp_depth(point.z);
        let (x, y) = (point.x / z, point.y / z);

        let u = k.focal_length.x * x + k.skew * y + k.principal_point.x;
        let v = k.focal_length.y * y + k.principal_point.y;

        let max = k.size() - Vec2::ONE;
        Vec2::new(u.clamp(0.0, max.x), v.clamp(0.0, max.y))
    }

    /// Back-project a pixel to the camera space point at `depth`.
    pub fn unproject(&self, pixel: Vec2, depth: f32) -> Vec3 {
        self.normalized(pixel).extend(1.0) * self.clamp_depth(depth)
    }

    /// Normalized image coordinates `(X/Z, Y/Z)` of a pixel.
    pub fn normalized(&self, pixel: Vec2) -> Vec2 {
        let k = &self.intrinsics;
        let y = (pixel.y - k.principal_point.y) / k.focal_length.y;
        let x = (pixel.x - k.principal_point.x - k.skew * y) / k.focal_length.x;
        Vec2::new(x, y)
    }

    /// Pixel (origin top left, Y down) to viewport (origin bottom left, Y up).
    pub fn pixel_to_viewport(&self, pixel: Vec2) -> Vec2 {
        let size = self.intrinsics.size();
        Vec2::new(pixel.x / size.x, 1.0 - pixel.y / size.y)
    }

    /// Inverse of [`CameraModel::pixel_to_viewport`].
    pub fn viewport_to_pixel(&self, viewport: Vec2) -> Vec2 {
        let size = self.intrinsics.size();
        Vec2::new(viewport.x * size.x, (1.0 - viewport.y) * size.y)
    }

    /// Ray direction through a viewport point in the rig camera frame (X right, Y up, Z forward).
    pub fn viewport_direction(&self, viewport: Vec2) -> Vec3 {
        let n = self.normalized(self.viewport_to_pixel(viewport));
        Vec3::new(n.x, -n.y, 1.0)
    }

    /// World ray through a viewport point for a camera at `camera_pose`.
    pub fn ray_through_viewport(&self, viewport: Vec2, camera_pose: &Pose) -> Option<Ray> {
        Ray::new(
            camera_pose.position,
            camera_pose.transform_vector(self.viewport_direction(viewport)),
        )
    }

    /// World ray through a pixel for a camera at `camera_pose`.
    pub fn ray_through_pixel(&self, pixel: Vec2, camera_pose: &Pose) -> Option<Ray> {
        self.ray_through_viewport(self.pixel_to_viewport(pixel), camera_pose)
    }
}
