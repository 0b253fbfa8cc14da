use glam::{EulerRot, Quat, Vec3};

use crate::{
    camera::{DepthRange, DistanceCurve},
    pose::Pose,
};

/// Calibration applied to the detector's camera-relative pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectCalibration {
    /// Added to the camera-relative position after scaling, rig frame, meters.
    pub position_offset: Vec3,
    /// Euler angles in degrees (x, y, z), applied after the detector rotation.
    pub rotation_offset_deg: Vec3,
    /// Uniform scale of the camera-relative position.
    pub position_scale: f32,
    /// Compose with the camera's yaw only.
    pub world_locked_rotation: bool,
    /// Bounds of the corrected distance.
    pub depth_range: DepthRange,
}

impl Default for DirectCalibration {
    fn default() -> Self {
        Self {
            position_offset: Vec3::ZERO,
            rotation_offset_deg: Vec3::ZERO,
            position_scale: 1.0,
            world_locked_rotation: false,
            depth_range: DepthRange::default(),
        }
    }
}

/// Rotation about the vertical axis matching the heading of `rotation`.
pub fn yaw_only(rotation: Quat) -> Quat {
    let forward = rotation * Vec3::Z;
    if forward.x.abs() < 1e-6 && forward.z.abs() < 1e-6 {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_y(forward.x.atan2(forward.z))
}

/// Euler offset in degrees, applied as yaw, then pitch, then roll.
pub fn rotation_offset(degrees: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::YXZ,
        degrees.y.to_radians(),
        degrees.x.to_radians(),
        degrees.z.to_radians(),
    )
}

/// World pose of a tag from the detector's pose in the vision camera frame.
///
/// The pose is converted to the rig frame, scaled and offset, its distance is
/// corrected by `curve` and clamped to the depth range, and the result is
/// composed with the camera pose.
pub fn direct_world_pose(
    raw: &Pose,
    camera_pose: &Pose,
    calibration: &DirectCalibration,
    curve: &dyn DistanceCurve,
) -> Option<Pose> {
    let rig = raw.vision_to_rig();

    let mut position = rig.position * calibration.position_scale + calibration.position_offset;
    let distance = position.length();
    if distance > f32::EPSILON {
        let corrected = calibration.depth_range.clamp(curve.apply(distance));
        position *= corrected / distance;
    }

    let camera_rotation = if calibration.world_locked_rotation {
        yaw_only(camera_pose.rotation)
    } else {
        camera_pose.rotation
    };

    let pose = Pose {
        position: camera_pose.transform_point(position),
        rotation: (camera_rotation
            * rig.rotation
            * rotation_offset(calibration.rotation_offset_deg))
        .normalize(),
    };

    pose.is_finite().then_some(pose)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{IdentityDistanceCurve, PiecewiseDistanceCurve};
    use approx::assert_relative_eq;

    #[test]
    fn test_direct_identity_camera() -> Result<(), &'static str> {
        let raw = Pose::from_translation(Vec3::new(0.0, 0.5, 3.0));
        let pose = direct_world_pose(
            &raw,
            &Pose::IDENTITY,
            &DirectCalibration::default(),
            &IdentityDistanceCurve,
        )
        .ok_or("expected pose")?;

        // below the optical axis in the image is below in the world
        assert_relative_eq!(pose.position.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(pose.position.y, -0.5, epsilon = 1e-6);
        assert_relative_eq!(pose.position.z, 3.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_direct_distance_scaling_and_clamp() -> Result<(), &'static str> {
        let calibration = DirectCalibration::default();

        let far = Pose::from_translation(Vec3::new(0.0, 0.0, 7.0));
        let pose = direct_world_pose(&far, &Pose::IDENTITY, &calibration, &PiecewiseDistanceCurve)
            .ok_or("expected pose")?;
        assert_relative_eq!(pose.position.z, 7.7, epsilon = 1e-5);

        let beyond = Pose::from_translation(Vec3::new(0.0, 0.0, 30.0));
        let pose = direct_world_pose(&beyond, &Pose::IDENTITY, &calibration, &PiecewiseDistanceCurve)
            .ok_or("expected pose")?;
        assert_relative_eq!(pose.position.z, 20.0, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_direct_scale_offset_and_camera() -> Result<(), &'static str> {
        let calibration = DirectCalibration {
            position_offset: Vec3::new(0.0, 0.0, 0.5),
            position_scale: 0.5,
            ..Default::default()
        };
        let camera = Pose::new(Vec3::new(1.0, 1.6, 0.0), Quat::from_rotation_y(90f32.to_radians()));
        let raw = Pose::from_translation(Vec3::new(0.0, 0.0, 4.0));

        let pose = direct_world_pose(&raw, &camera, &calibration, &IdentityDistanceCurve)
            .ok_or("expected pose")?;
        // 4 * 0.5 + 0.5 along the camera's forward axis (+X)
        assert_relative_eq!(pose.position.x, 3.5, epsilon = 1e-5);
        assert_relative_eq!(pose.position.y, 1.6, epsilon = 1e-5);
        assert_relative_eq!(pose.position.z, 0.0, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_world_locked_ignores_head_tilt() -> Result<(), &'static str> {
        let raw = Pose::from_translation(Vec3::new(0.0, 0.0, 2.0));
        let tilted = Pose::new(
            Vec3::ZERO,
            Quat::from_euler(EulerRot::YXZ, 0.5, 0.3, 0.2),
        );
        let calibration = DirectCalibration {
            world_locked_rotation: true,
            ..Default::default()
        };

        let pose = direct_world_pose(&raw, &tilted, &calibration, &IdentityDistanceCurve)
            .ok_or("expected pose")?;
        let expected = Quat::from_rotation_y(0.5);
        assert_relative_eq!(pose.rotation.dot(expected).abs(), 1.0, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_rotation_offset_degrees() {
        let q = rotation_offset(Vec3::new(0.0, 90.0, 0.0));
        let forward = q * Vec3::Z;
        assert_relative_eq!(forward.x, 1.0, epsilon = 1e-5);
    }
}
