use std::collections::{HashMap, HashSet};

use glam::{UVec2, Vec2};
use log::{debug, info, warn};
use tagsight_3d::{
    CameraIntrinsics, DistanceCurve, EnvironmentRaycaster, Pose, PoseEstimator, PoseSettings,
    PoseSource,
};
use tagsight_imgproc::preprocess::{
    CpuBackend, PreprocessOutput, PreprocessingPipeline, SkipReason,
};

use crate::{
    config::TagsightConfig,
    context::CapabilityContext,
    detector::{Detection, DetectionParams, TagDetector},
    source::Frame,
    throttle::DetectionThrottle,
    visual::VisualRegistry,
};

/// World pose of one detected tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldTagPose {
    /// Decoded tag ID.
    pub tag_id: u32,
    /// Pose in the world frame, after smoothing.
    pub pose: Pose,
    /// Strategy that produced the pose.
    pub source: PoseSource,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f32,
}

/// What one call to [`DetectionPipeline::process_frame`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// The detector was invoked on this frame.
    pub detector_ran: bool,
    /// The detector saw the conditioned frame rather than the raw one.
    pub preprocessed: bool,
    /// Tag poses, from this frame or repeated from the last detector run.
    pub poses: Vec<WorldTagPose>,
    /// Tags whose visual was created or shown again.
    pub shown: Vec<u32>,
    /// Tags whose visual was hidden.
    pub hidden: Vec<u32>,
}

/// Turns camera frames into world tag poses and keeps the per-tag visuals in sync.
pub struct DetectionPipeline<D: TagDetector> {
    detector: D,
    params: DetectionParams,
    pose_settings: PoseSettings,
    estimator: Option<PoseEstimator>,
    distance_curve: Option<Box<dyn DistanceCurve>>,
    preprocessor: Option<PreprocessingPipeline>,
    throttle: DetectionThrottle,
    visuals: VisualRegistry,
    last_poses: Vec<WorldTagPose>,
    smoothed: HashMap<u32, Pose>,
}

impl<D: TagDetector> DetectionPipeline<D> {
    /// Create a pipeline from a validated configuration.
    ///
    /// Conditioning runs on the CPU backend when enabled.
    pub fn new(config: &TagsightConfig, detector: D) -> Self {
        let preprocessor = config.preprocessing_enabled.then(|| {
            PreprocessingPipeline::new(
                Box::new(CpuBackend::default()),
                config.preprocessing.clone(),
            )
        });
        Self {
            detector,
            params: DetectionParams::from(&config.detector),
            pose_settings: config.pose,
            estimator: None,
            distance_curve: None,
            preprocessor,
            throttle: DetectionThrottle::new(config.detector.max_detections_per_second),
            visuals: VisualRegistry::new(),
            last_poses: Vec::new(),
            smoothed: HashMap::new(),
        }
    }

    /// Replace the conditioning pipeline, e.g. with another compute backend.
    pub fn with_preprocessor(mut self, preprocessor: PreprocessingPipeline) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    /// Replace the distance calibration curve used by every pose strategy.
    ///
    /// Takes precedence over `apply_distance_scaling`.
    pub fn with_distance_curve(mut self, curve: Box<dyn DistanceCurve>) -> Self {
        match self.estimator.take() {
            Some(estimator) => self.estimator = Some(estimator.with_distance_curve(curve)),
            None => self.distance_curve = Some(curve),
        }
        self
    }

    /// The detector.
    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Mutable access to the detector.
    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// The per-tag visuals.
    pub fn visuals(&self) -> &VisualRegistry {
        &self.visuals
    }

    /// Poses of the last detector run.
    pub fn last_poses(&self) -> &[WorldTagPose] {
        &self.last_poses
    }

    /// Whether frames are still conditioned before detection.
    pub fn preprocessing_active(&self) -> bool {
        self.preprocessor.is_some()
    }

    /// Destroy every visual and forget all per-tag state.
    pub fn teardown(&mut self) {
        self.visuals.destroy_all();
        self.last_poses.clear();
        self.smoothed.clear();
        self.throttle.reset();
    }

    /// Process one frame.
    ///
    /// Nothing here fails: missing permissions, empty frames and detector
    /// errors leave the visuals as they are, and unavailable compute falls back
    /// to detecting on the raw frame for the rest of the session.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        context: &CapabilityContext,
        raycaster: &dyn EnvironmentRaycaster,
    ) -> FrameReport {
        if !context.camera_permitted || frame.is_empty() {
            return FrameReport::default();
        }

        if !self.throttle.try_acquire(frame.timestamp) {
            return self.idle_report();
        }

        let frame_size = frame.image.size();
        let mut disable_reason = None;
        let mut preprocessed = false;
        let mut input = &frame.image;
        if let Some(preprocessor) = self.preprocessor.as_mut() {
            if !context.compute_available {
                disable_reason = Some("compute capability unavailable");
            } else {
                match preprocessor.process(&frame.image) {
                    Ok(PreprocessOutput::Processed(image)) => {
                        input = image;
                        preprocessed = true;
                    }
                    Ok(PreprocessOutput::Skipped(SkipReason::BackendUnavailable)) => {
                        disable_reason = Some("compute backend unavailable");
                    }
                    Ok(PreprocessOutput::Skipped(reason)) => {
                        debug!("preprocessing skipped: {reason:?}");
                    }
                    Err(err) => warn!("preprocessing failed, detecting on the raw frame: {err}"),
                }
            }
        }
        let input_size = input.size();
        let detections = self.detector.detect(input, &self.params);

        if let Some(reason) = disable_reason {
            info!("{reason}, preprocessing disabled for this session");
            self.preprocessor = None;
        }

        let mut detections = match detections {
            Ok(detections) => detections,
            Err(err) => {
                warn!("tag detection failed: {err}");
                return self.idle_report();
            }
        };

        if input_size != frame_size {
            let scale = Vec2::new(
                frame_size.width as f32 / input_size.width as f32,
                frame_size.height as f32 / input_size.height as f32,
            );
            for detection in detections.iter_mut() {
                if let Some(corners) = detection.corners.as_mut() {
                    corners.iter_mut().for_each(|c| *c *= scale);
                }
            }
        }

        let resolution = UVec2::new(frame_size.width as u32, frame_size.height as u32);
        let intrinsics = match frame.intrinsics {
            Some(intrinsics) => intrinsics,
            None => {
                match CameraIntrinsics::from_horizontal_fov(self.params.horizontal_fov_deg, resolution)
                {
                    Ok(intrinsics) => intrinsics,
                    Err(err) => {
                        warn!("cannot derive camera intrinsics: {err}");
                        return self.idle_report();
                    }
                }
            }
        };

        let poses = self.estimate_poses(&detections, &intrinsics, &frame.camera_pose, raycaster);
        let (shown, hidden) = self.sync_visuals(&poses);
        self.last_poses.clone_from(&poses);

        FrameReport {
            detector_ran: true,
            preprocessed,
            poses,
            shown,
            hidden,
        }
    }

    fn idle_report(&self) -> FrameReport {
        FrameReport {
            poses: self.last_poses.clone(),
            ..Default::default()
        }
    }

    fn estimate_poses(
        &mut self,
        detections: &[Detection],
        intrinsics: &CameraIntrinsics,
        camera_pose: &Pose,
        raycaster: &dyn EnvironmentRaycaster,
    ) -> Vec<WorldTagPose> {
        if self.estimator.is_none() {
            let mut estimator =
                PoseEstimator::new(*intrinsics, self.params.tag_size, self.pose_settings);
            if let Some(curve) = self.distance_curve.take() {
                estimator = estimator.with_distance_curve(curve);
            }
            self.estimator = Some(estimator);
        }
        let Some(estimator) = self.estimator.as_mut() else {
            return Vec::new();
        };
        if estimator.model().intrinsics != *intrinsics {
            estimator.set_intrinsics(*intrinsics);
        }

        let smoothing = self.pose_settings.smoothing;
        let mut seen = HashSet::new();
        let mut poses = Vec::with_capacity(detections.len());
        for detection in detections {
            if !seen.insert(detection.tag_id) {
                debug!("duplicate detection of tag {}, keeping the first", detection.tag_id);
                continue;
            }
            let estimate = estimator.estimate(
                detection.corners.as_ref(),
                detection.raw_pose.as_ref(),
                camera_pose,
                raycaster,
            );
            let Some((pose, source)) = estimate else {
                debug!("no usable pose for tag {} this frame", detection.tag_id);
                continue;
            };

            let pose = match self.smoothed.get(&detection.tag_id) {
                Some(previous) if smoothing < 1.0 => previous.interpolate(&pose, smoothing),
                _ => pose,
            };
            self.smoothed.insert(detection.tag_id, pose);

            poses.push(WorldTagPose {
                tag_id: detection.tag_id,
                pose,
                source,
                confidence: detection.confidence,
            });
        }
        poses
    }

    fn sync_visuals(&mut self, poses: &[WorldTagPose]) -> (Vec<u32>, Vec<u32>) {
        let mut shown = Vec::new();
        for tag in poses {
            if self.visuals.show(tag.tag_id, tag.pose) {
                shown.push(tag.tag_id);
            }
        }

        let present: HashSet<u32> = poses.iter().map(|p| p.tag_id).collect();
        let absent: Vec<u32> = self
            .visuals
            .ids()
            .filter(|id| !present.contains(id))
            .collect();
        let mut hidden = Vec::new();
        for tag_id in absent {
            self.smoothed.remove(&tag_id);
            if self.visuals.hide(tag_id) {
                hidden.push(tag_id);
            }
        }
        (shown, hidden)
    }
}
