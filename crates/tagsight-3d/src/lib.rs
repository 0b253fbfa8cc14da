#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Pinhole camera model, depth range and distance calibration.
pub mod camera;

/// Orientation and position from the four corners of a detected tag.
pub mod corners;

/// Camera-relative detector pose converted into the world.
pub mod direct;

/// Strategy selection between corner reconstruction and the direct pose.
pub mod estimator;

/// Rigid transforms.
pub mod pose;

/// Environment surface queries.
pub mod raycast;

pub use camera::{
    CameraError, CameraIntrinsics, CameraModel, DepthRange, DistanceCurve, IdentityDistanceCurve,
    PiecewiseDistanceCurve,
};
pub use estimator::{PoseEstimator, PoseMode, PoseSettings, PoseSource};
pub use pose::Pose;
pub use raycast::{EnvironmentRaycaster, NoSurface, PlaneRaycaster, Ray};
