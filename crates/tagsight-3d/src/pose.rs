use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A rigid transform: rotation followed by translation.
///
/// Used both for world poses of tags and for the pose of the camera rig, where
/// it maps points from the rig camera frame (X right, Y up, Z forward) into
/// the world.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Translation in meters.
    pub position: Vec3,
    /// Unit rotation.
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    /// The identity transform.
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Create a pose from a position and a rotation.
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Pose with no rotation.
    pub fn from_translation(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    /// Map a point from the local frame of this pose.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.position
    }

    /// Rotate a direction from the local frame of this pose.
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }

    /// `self ∘ other`: express `other`, given in the local frame of `self`, in the parent frame.
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose {
            position: self.transform_point(other.position),
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    /// The inverse transform.
    pub fn inverse(&self) -> Pose {
        let rotation = self.rotation.inverse();
        Pose {
            position: rotation * -self.position,
            rotation,
        }
    }

    /// Interpolate towards `other`: lerp on position, slerp on rotation.
    pub fn interpolate(&self, other: &Pose, t: f32) -> Pose {
        let t = t.clamp(0.0, 1.0);
        Pose {
            position: self.position.lerp(other.position, t),
            rotation: self.rotation.slerp(other.rotation, t),
        }
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite()
    }

    /// Convert a pose expressed in the vision camera frame (Y down) into the
    /// rig camera frame (Y up).
    ///
    /// This is the reflection `diag(1, -1, 1)` applied on both sides.
    pub fn vision_to_rig(&self) -> Pose {
        let q = self.rotation;
        Pose {
            position: Vec3::new(self.position.x, -self.position.y, self.position.z),
            rotation: Quat::from_xyzw(-q.x, q.y, -q.z, q.w),
        }
    }
}
