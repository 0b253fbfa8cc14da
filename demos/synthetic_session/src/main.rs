use std::{cell::Cell, path::PathBuf, rc::Rc, time::Duration};

use argh::FromArgs;
use glam::{Quat, UVec2, Vec3};
use tagsight::{
    anchor::{AnchorChange, JsonFileStore, KeyValueStore, MemoryStore, SimulatedAnchorStore},
    detector::confidence_from_decision_margin,
    geometry::{CameraIntrinsics, CameraModel, DepthRange, PlaneRaycaster, Pose},
    image::{Image, ImageError, ImageSize},
    CapabilityContext, Detection, DetectionParams, DetectorError, Frame, FrameSource,
    TagDetector, TagsightConfig, TagsightSession,
};

/// Runs a tagsight session against a simulated camera looking at a wall of tags
#[derive(Debug, FromArgs)]
struct Args {
    /// path to a JSON configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// number of frames to simulate
    #[argh(option, short = 'n', default = "240")]
    frames: u32,

    /// simulated frames per second
    #[argh(option, default = "30.0")]
    fps: f32,

    /// file the anchor records are persisted to
    #[argh(option, short = 'p')]
    persistence: Option<PathBuf>,

    /// clear every anchor halfway through the run
    #[argh(switch)]
    clear_midway: bool,
}

const WALL_DISTANCE: f32 = 3.0;
const RESOLUTION: UVec2 = UVec2::new(640, 480);

/// Tags printed on the wall, world positions.
const TAGS: [(u32, Vec3); 3] = [
    (3, Vec3::new(-0.8, 0.0, WALL_DISTANCE)),
    (7, Vec3::new(0.0, 0.3, WALL_DISTANCE)),
    (42, Vec3::new(0.8, -0.2, WALL_DISTANCE)),
];

/// Camera sweeping its yaw back and forth in front of the wall.
struct SweepingCamera {
    pose: Rc<Cell<Pose>>,
    intrinsics: CameraIntrinsics,
    frame_interval: Duration,
    frame_index: u32,
}

impl SweepingCamera {
    fn camera_pose(&self, t: f32) -> Pose {
        let yaw = 0.35 * (0.5 * t).sin();
        Pose::new(Vec3::ZERO, Quat::from_rotation_y(yaw))
    }

    fn blank(&self) -> Result<Image<u8, 4>, ImageError> {
        let size = ImageSize {
            width: self.intrinsics.resolution.x as usize,
            height: self.intrinsics.resolution.y as usize,
        };
        Image::from_size_val(size, 96)
    }
}

impl FrameSource for SweepingCamera {
    fn next_frame(&mut self) -> Option<Frame> {
        let timestamp = self.frame_interval * self.frame_index;
        self.frame_index += 1;

        let camera_pose = self.camera_pose(timestamp.as_secs_f32());
        self.pose.set(camera_pose);

        let image = match self.blank() {
            Ok(image) => image,
            Err(err) => {
                log::warn!("could not allocate frame: {err}");
                return None;
            }
        };
        Some(Frame {
            image,
            camera_pose,
            intrinsics: Some(self.intrinsics),
            timestamp,
        })
    }
}

/// Projects the known wall tags through the current camera pose.
struct SimulatedDetector {
    pose: Rc<Cell<Pose>>,
}

impl TagDetector for SimulatedDetector {
    fn detect(
        &mut self,
        frame: &Image<u8, 4>,
        params: &DetectionParams,
    ) -> Result<Vec<Detection>, DetectorError> {
        let resolution = UVec2::new(frame.width() as u32, frame.height() as u32);
        let intrinsics = CameraIntrinsics::from_horizontal_fov(params.horizontal_fov_deg, resolution)
            .map_err(|err| DetectorError::Backend(err.to_string()))?;
        let model = CameraModel::new(intrinsics, DepthRange::default());
        let to_camera = self.pose.get().inverse();
        let half = params.tag_size / 2.0;

        let mut detections = Vec::new();
        for (tag_id, center) in TAGS {
            // rig camera frame is Y up, the detector reports Y down
            let rig = to_camera.transform_point(center);
            let vision = Vec3::new(rig.x, -rig.y, rig.z);
            if vision.z <= model.depth_range.min {
                continue;
            }

            let corners = [
                Vec3::new(-half, -half, 0.0),
                Vec3::new(half, -half, 0.0),
                Vec3::new(half, half, 0.0),
                Vec3::new(-half, half, 0.0),
            ]
            .map(|offset| model.project(vision + offset));
            let size = intrinsics.size();
            let inside = corners
                .iter()
                .all(|c| c.x > 0.0 && c.y > 0.0 && c.x < size.x - 1.0 && c.y < size.y - 1.0);
            if !inside {
                continue;
            }

            let margin = 110.0 - 5.0 * vision.length();
            detections.push(Detection {
                tag_id,
                corners: Some(corners),
                raw_pose: Some(Pose::from_translation(vision)),
                confidence: confidence_from_decision_margin(margin),
            });
        }
        Ok(detections)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => TagsightConfig::from_json_file(path)?,
        None => TagsightConfig::default(),
    };

    let shared_pose = Rc::new(Cell::new(Pose::IDENTITY));
    let mut camera = SweepingCamera {
        pose: shared_pose.clone(),
        intrinsics: CameraIntrinsics::from_horizontal_fov(
            config.detector.horizontal_fov_deg,
            RESOLUTION,
        )?,
        frame_interval: Duration::from_secs_f32(1.0 / args.fps.max(1.0)),
        frame_index: 0,
    };
    let detector = SimulatedDetector { pose: shared_pose };
    let persistence: Box<dyn KeyValueStore> = match &args.persistence {
        Some(path) => Box::new(JsonFileStore::new(path)),
        None => Box::new(MemoryStore::new()),
    };
    let wall = PlaneRaycaster::new(Vec3::new(0.0, 0.0, WALL_DISTANCE), Vec3::NEG_Z);

    let mut session = TagsightSession::with_persistence(
        &config,
        detector,
        SimulatedAnchorStore::new(),
        persistence,
    );
    session.start(CapabilityContext::granted())?;

    for index in 0..args.frames {
        if args.clear_midway && index == args.frames / 2 {
            session.clear_anchors();
        }

        let frame = camera.next_frame();
        let now = frame
            .as_ref()
            .map(|f| f.timestamp)
            .unwrap_or(camera.frame_interval * index);
        let report = session.tick(now, frame.as_ref(), &wall);

        for change in report.changes {
            match change {
                AnchorChange::Placed(anchor) => println!(
                    "[{:>6.2}s] placed tag {} at {:?}",
                    now.as_secs_f32(),
                    anchor.tag_id,
                    anchor.pose.position
                ),
                AnchorChange::Restored(anchor) => println!(
                    "[{:>6.2}s] restored tag {} at {:?}",
                    now.as_secs_f32(),
                    anchor.tag_id,
                    anchor.pose.position
                ),
                AnchorChange::PlacementFailed { tag_id, reason } => {
                    println!("[{:>6.2}s] tag {tag_id} failed: {reason}", now.as_secs_f32())
                }
                AnchorChange::Cleared => println!("[{:>6.2}s] anchors cleared", now.as_secs_f32()),
            }
        }
    }

    println!("placed anchors:");
    for anchor in session.anchors().placed_anchors() {
        let p = anchor.pose.position;
        let normal = anchor.pose.rotation * Vec3::Y;
        println!(
            "  tag {:>3}  {}  position ({:.3}, {:.3}, {:.3})  normal ({:.2}, {:.2}, {:.2})",
            anchor.tag_id, anchor.id, p.x, p.y, p.z, normal.x, normal.y, normal.z
        );
    }
    let visible = session.pipeline().visuals().visible_ids();
    println!("visible tags at the end: {visible:?}");

    session.shutdown()?;
    if let Some(path) = &args.persistence {
        println!("anchor records written to {}", path.display());
    }

    Ok(())
}
