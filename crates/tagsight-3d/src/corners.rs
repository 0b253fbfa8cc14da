//! Pose of a planar tag from its four corners.
//!
//! Each image corner is lifted into the world, preferably by casting a ray
//! against the environment. The orientation then follows from the two edges
//! leaving corner 0:
//!
//! ```text
//! v1 = c1 - c0        v2 = c3 - c0
//! normal = |v1 x v2|  right = |v1|  up = |normal x right|
//! ```
//!
//! The look rotation built from `(forward = normal, up)` is turned by 90
//! degrees about its local X axis so that the tag's local Y axis is the
//! surface normal.

use glam::{Mat3, Quat, Vec2, Vec3};
use log::debug;

use crate::{
    camera::{CameraModel, DistanceCurve},
    pose::Pose,
    raycast::EnvironmentRaycaster,
};

/// Vectors shorter than this are treated as degenerate.
pub const DEGENERACY_EPSILON: f32 = 1e-3;

/// Corners of a square tag of side `tag_size` in its own frame, on the plane z = 0.
///
/// Order: `[-s, s]`, `[s, s]`, `[s, -s]`, `[-s, -s]` with `s = tag_size / 2`.
pub fn tag_corners_local(tag_size: f32) -> [Vec3; 4] {
    let h = tag_size / 2.0;
    [
        Vec3::new(-h, h, 0.0),
        Vec3::new(h, h, 0.0),
        Vec3::new(h, -h, 0.0),
        Vec3::new(-h, -h, 0.0),
    ]
}

/// Mean of the four corners.
pub fn centroid(corners: &[Vec3; 4]) -> Vec3 {
    corners.iter().copied().sum::<Vec3>() / 4.0
}

/// Orientation of the quad spanned by `corners`, in the order produced by the detector.
///
/// Returns `None` when an edge or the normal is shorter than [`DEGENERACY_EPSILON`].
pub fn orientation_from_corners(corners: &[Vec3; 4]) -> Option<Quat> {
    let v1 = corners[1] - corners[0];
    let v2 = corners[3] - corners[0];
    if v1.length() < DEGENERACY_EPSILON || v2.length() < DEGENERACY_EPSILON {
        return None;
    }

    let cross = v1.cross(v2);
    if !(cross.length() >= DEGENERACY_EPSILON) {
        return None;
    }
    let normal = cross.normalize();
    let right = v1.normalize();
    let up = normal.cross(right).try_normalize()?;

    let look = Quat::from_mat3(&Mat3::from_cols(up.cross(normal), up, normal));
    let rotation = (look * Quat::from_rotation_x(90f32.to_radians())).normalize();

    rotation.is_finite().then_some(rotation)
}

/// Position and orientation of the quad: centroid and [`orientation_from_corners`].
pub fn pose_from_corners(corners: &[Vec3; 4]) -> Option<Pose> {
    let rotation = orientation_from_corners(corners)?;
    Some(Pose::new(centroid(corners), rotation))
}

/// How a corner was lifted into the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CornerSource {
    /// Ray hit on an environment surface.
    Surface,
    /// Corner of the detector's own camera-relative pose.
    DetectorPose,
    /// Ray point at the depth estimated from the tag's apparent size.
    ApparentSize,
}

/// Lift the four image corners of a tag into world space.
///
/// Per corner, the first available of: environment ray hit, the naive corner
/// of `raw_pose` (vision camera frame), the point along the ray at the
/// distance-corrected apparent-size depth.
pub fn world_corners(
    model: &CameraModel,
    tag_size: f32,
    curve: &dyn DistanceCurve,
    pixels: &[Vec2; 4],
    raw_pose: Option<&Pose>,
    camera_pose: &Pose,
    raycaster: &dyn EnvironmentRaycaster,
) -> Option<([Vec3; 4], [CornerSource; 4])> {
    let local = tag_corners_local(tag_size);
    let mut points = [Vec3::ZERO; 4];
    let mut sources = [CornerSource::Surface; 4];
    let mut apparent_depth = None;

    for i in 0..4 {
        let ray = model.ray_through_pixel(pixels[i], camera_pose)?;

        if let Some(hit) = raycaster.raycast(&ray) {
            points[i] = hit;
            sources[i] = CornerSource::Surface;
        } else if let Some(raw) = raw_pose {
            let in_camera = raw.compose(&Pose::from_translation(local[i])).vision_to_rig();
            points[i] = camera_pose.transform_point(in_camera.position);
            sources[i] = CornerSource::DetectorPose;
        } else {
            let depth = match apparent_depth {
                Some(depth) => depth,
                None => {
                    let depth = apparent_size_depth(model, tag_size, curve, pixels)?;
                    apparent_depth = Some(depth);
                    depth
                }
            };
            points[i] = ray.at(depth);
            sources[i] = CornerSource::ApparentSize;
        }
    }

    Some((points, sources))
}

/// Distance-corrected depth from the mean edge length of the quad in pixels.
pub fn apparent_size_depth(
    model: &CameraModel,
    tag_size: f32,
    curve: &dyn DistanceCurve,
    pixels: &[Vec2; 4],
) -> Option<f32> {
    let perimeter: f32 = (0..4).map(|i| pixels[i].distance(pixels[(i + 1) % 4])).sum();
    let distance = model
        .intrinsics
        .estimate_distance(perimeter / 4.0, tag_size)?;
    Some(model.clamp_depth(curve.apply(distance)))
}

/// Reconstruct the world pose of a tag from its image corners.
///
/// Returns `None` when the corners cannot be lifted or the quad is degenerate;
/// the caller then falls back to the direct pose.
pub fn reconstruct_pose(
    model: &CameraModel,
    tag_size: f32,
    curve: &dyn DistanceCurve,
    pixels: &[Vec2; 4],
    raw_pose: Option<&Pose>,
    camera_pose: &Pose,
    raycaster: &dyn EnvironmentRaycaster,
) -> Option<Pose> {
    let (points, sources) = world_corners(
        model,
        tag_size,
        curve,
        pixels,
        raw_pose,
        camera_pose,
        raycaster,
    )?;

    let pose = pose_from_corners(&points);
    if pose.is_none() {
        debug!("degenerate corner quad {points:?} from {sources:?}");
    }
    pose
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        camera::{CameraIntrinsics, DepthRange, IdentityDistanceCurve, PiecewiseDistanceCurve},
        raycast::{NoSurface, PlaneRaycaster},
    };
    use approx::assert_relative_eq;
    use glam::UVec2;

    fn model() -> CameraModel {
        CameraModel::new(
            CameraIntrinsics {
                focal_length: Vec2::splat(500.0),
                principal_point: Vec2::new(320.0, 240.0),
                skew: 0.0,
                resolution: UVec2::new(640, 480),
            },
            DepthRange::default(),
        )
    }

    // pixels of a 0.2 m square at 2 m in front of an identity camera
    fn square_pixels() -> [Vec2; 4] {
        [
            Vec2::new(295.0, 215.0),
            Vec2::new(345.0, 215.0),
            Vec2::new(345.0, 265.0),
            Vec2::new(295.0, 265.0),
        ]
    }

    fn assert_orthonormal(rotation: Quat) {
        let m = Mat3::from_quat(rotation);
        for (a, b) in [
            (m.x_axis, m.y_axis),
            (m.y_axis, m.z_axis),
            (m.z_axis, m.x_axis),
        ] {
            assert_relative_eq!(a.length(), 1.0, epsilon = 1e-5);
            assert_relative_eq!(a.dot(b), 0.0, epsilon = 1e-5);
        }
        assert_relative_eq!(m.determinant(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_orientation_is_orthonormal() -> Result<(), &'static str> {
        let quads = [
            [
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(0.1, 0.0, 1.0),
                Vec3::new(0.1, -0.1, 1.0),
                Vec3::new(0.0, -0.1, 1.0),
            ],
            [
                Vec3::new(0.3, 1.0, 2.0),
                Vec3::new(0.4, 1.05, 2.2),
                Vec3::new(0.45, 0.9, 2.3),
                Vec3::new(0.32, 0.88, 2.05),
            ],
        ];

        for quad in quads.iter() {
            let rotation = orientation_from_corners(quad).ok_or("expected orientation")?;
            assert_orthonormal(rotation);

            // local Y is the surface normal
            let normal = (quad[1] - quad[0]).cross(quad[3] - quad[0]).normalize();
            let y = rotation * Vec3::Y;
            assert_relative_eq!(y.dot(normal), 1.0, epsilon = 1e-4);
        }
        Ok(())
    }

    #[test]
    fn test_degenerate_quads_rejected() {
        let p = Vec3::new(0.5, 0.5, 2.0);
        assert!(orientation_from_corners(&[p; 4]).is_none());

        // corners 0, 1 and 3 collinear
        let collinear = [
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
        ];
        assert!(orientation_from_corners(&collinear).is_none());

        // edge below the epsilon
        let tiny = [
            Vec3::ZERO,
            Vec3::new(1e-4, 0.0, 0.0),
            Vec3::new(1e-4, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        assert!(pose_from_corners(&tiny).is_none());
    }

    #[test]
    fn test_reconstruct_on_wall() -> Result<(), &'static str> {
        let wall = PlaneRaycaster::new(Vec3::new(0.0, 0.0, 2.0), Vec3::NEG_Z);
        let pose = reconstruct_pose(
            &model(),
            0.2,
            &PiecewiseDistanceCurve,
            &square_pixels(),
            None,
            &Pose::IDENTITY,
            &wall,
        )
        .ok_or("expected pose")?;

        assert_relative_eq!(pose.position.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(pose.position.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(pose.position.z, 2.0, epsilon = 1e-4);

        // the tag faces the viewer
        let normal = pose.rotation * Vec3::Y;
        assert_relative_eq!(normal.z, -1.0, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn test_corner_chain_without_surface() -> Result<(), &'static str> {
        let model = model();
        let pixels = square_pixels();

        // no surface and no raw pose: apparent size, 50 px for 0.2 m at f = 500 is 2 m
        let (points, sources) = world_corners(
            &model,
            0.2,
            &IdentityDistanceCurve,
            &pixels,
            None,
            &Pose::IDENTITY,
            &NoSurface,
        )
        .ok_or("expected corners")?;
        assert_eq!(sources, [CornerSource::ApparentSize; 4]);
        let depth = centroid(&points).length();
        assert!(depth > 1.9 && depth < 2.1);

        // the detector pose takes precedence over the apparent size
        let raw = Pose::from_translation(Vec3::new(0.0, 0.0, 1.5));
        let (points, sources) = world_corners(
            &model,
            0.2,
            &IdentityDistanceCurve,
            &pixels,
            Some(&raw),
            &Pose::IDENTITY,
            &NoSurface,
        )
        .ok_or("expected corners")?;
        assert_eq!(sources, [CornerSource::DetectorPose; 4]);
        assert_relative_eq!(centroid(&points).z, 1.5, epsilon = 1e-5);
        // vision corner [-s, s] lies below the center in the rig frame
        assert_relative_eq!(points[0].y, -0.1, epsilon = 1e-5);
        Ok(())
    }

    #[test]
    fn test_reconstruct_degenerate_pixels() {
        let p = Vec2::new(320.0, 240.0);
        let pose = reconstruct_pose(
            &model(),
            0.2,
            &PiecewiseDistanceCurve,
            &[p; 4],
            None,
            &Pose::IDENTITY,
            &PlaneRaycaster::new(Vec3::new(0.0, 0.0, 2.0), Vec3::NEG_Z),
        );
        assert!(pose.is_none());
    }
}
