//! One tagsight session: frames in, visuals and persistent anchors out.
//!
//! The host drives the session from its frame loop by calling
//! [`TagsightSession::tick`] once per frame with the current session time.

use std::time::Duration;

use log::{debug, info, warn};
use tagsight_3d::{DistanceCurve, EnvironmentRaycaster};
use tagsight_anchor::{
    AnchorChange, AnchorError, AnchorManager, AnchorStore, KeyValueStore, PlacementOutcome,
};

use crate::{
    config::TagsightConfig,
    context::CapabilityContext,
    detector::TagDetector,
    pipeline::{DetectionPipeline, FrameReport},
    source::Frame,
};

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Detection and visualization work on the frame.
    pub frame: FrameReport,
    /// Placement outcome per tag fed to the anchor state machine.
    pub outcomes: Vec<(u32, PlacementOutcome)>,
    /// Anchor changes completed during the tick.
    pub changes: Vec<AnchorChange>,
}

/// Detection pipeline and anchor placement driven by a single frame loop.
pub struct TagsightSession<D: TagDetector, S: AnchorStore> {
    pipeline: DetectionPipeline<D>,
    anchors: AnchorManager<S>,
    context: CapabilityContext,
    restore_pending: bool,
}

impl<D: TagDetector, S: AnchorStore> TagsightSession<D, S> {
    /// Create a session whose anchor records only live in memory.
    pub fn new(config: &TagsightConfig, detector: D, store: S) -> Self {
        Self {
            pipeline: DetectionPipeline::new(config, detector),
            anchors: AnchorManager::new(config.anchor_settings(), store),
            context: CapabilityContext::default(),
            restore_pending: false,
        }
    }

    /// Create a session persisting anchor records into `persistence`.
    pub fn with_persistence(
        config: &TagsightConfig,
        detector: D,
        store: S,
        persistence: Box<dyn KeyValueStore>,
    ) -> Self {
        Self {
            pipeline: DetectionPipeline::new(config, detector),
            anchors: AnchorManager::with_persistence(config.anchor_settings(), store, persistence),
            context: CapabilityContext::default(),
            restore_pending: false,
        }
    }

    /// Replace the distance calibration curve of the pose estimation.
    pub fn with_distance_curve(mut self, curve: Box<dyn DistanceCurve>) -> Self {
        self.pipeline = self.pipeline.with_distance_curve(curve);
        self
    }

    /// Begin the session under `context`.
    ///
    /// Persisted anchors are requested right away when the anchor subsystem
    /// is ready, otherwise on the first tick after it becomes ready.
    pub fn start(&mut self, context: CapabilityContext) -> Result<(), AnchorError> {
        self.context = context;
        self.restore_pending = true;
        if context.spatial_anchors_ready {
            self.restore()?;
        }
        Ok(())
    }

    /// Replace the capability context, e.g. after a permission change.
    pub fn set_context(&mut self, context: CapabilityContext) {
        if context != self.context {
            debug!("capability context changed to {context:?}");
        }
        self.context = context;
    }

    /// The current capability context.
    pub fn context(&self) -> &CapabilityContext {
        &self.context
    }

    /// The detection pipeline.
    pub fn pipeline(&self) -> &DetectionPipeline<D> {
        &self.pipeline
    }

    /// Mutable access to the detection pipeline.
    pub fn pipeline_mut(&mut self) -> &mut DetectionPipeline<D> {
        &mut self.pipeline
    }

    /// The anchor state machine.
    pub fn anchors(&self) -> &AnchorManager<S> {
        &self.anchors
    }

    /// Mutable access to the anchor state machine.
    pub fn anchors_mut(&mut self) -> &mut AnchorManager<S> {
        &mut self.anchors
    }

    /// Advance the session to `now`.
    ///
    /// `frame` is `None` when the camera had nothing for this tick. Anchors
    /// are only fed from frames the detector actually ran on.
    pub fn tick(
        &mut self,
        now: Duration,
        frame: Option<&Frame>,
        raycaster: &dyn EnvironmentRaycaster,
    ) -> TickReport {
        let frame_report = match frame {
            Some(frame) => self.pipeline.process_frame(frame, &self.context, raycaster),
            None => FrameReport::default(),
        };

        let mut report = TickReport {
            frame: frame_report,
            ..Default::default()
        };
        if !self.context.spatial_anchors_ready {
            return report;
        }

        if self.restore_pending {
            if let Err(err) = self.restore() {
                warn!("could not restore anchors: {err}");
            }
        }

        if report.frame.detector_ran {
            for tag in &report.frame.poses {
                let outcome = self
                    .anchors
                    .observe(tag.tag_id, tag.pose, tag.confidence, now);
                report.outcomes.push((tag.tag_id, outcome));
            }
            for tag_id in &report.frame.hidden {
                self.anchors.mark_lost(*tag_id);
            }
        }

        report.changes = self.anchors.update(now);
        report
    }

    /// Erase every anchor. Returns `false` when a clear is already running.
    pub fn clear_anchors(&mut self) -> bool {
        self.anchors.clear_all()
    }

    /// Erase the anchor of `tag_id`. Returns `false` when it has none.
    pub fn remove_anchor(&mut self, tag_id: u32) -> bool {
        self.anchors.remove_anchor(tag_id)
    }

    /// End the session: write the anchor records and destroy every visual.
    pub fn shutdown(&mut self) -> Result<(), AnchorError> {
        self.pipeline.teardown();
        self.anchors.persist()?;
        info!(
            "session ended with {} placed anchor(s)",
            self.anchors.placed_anchors().len()
        );
        Ok(())
    }

    fn restore(&mut self) -> Result<(), AnchorError> {
        self.restore_pending = false;
        let requested = self.anchors.restore()?;
        if requested > 0 {
            debug!("waiting for {requested} anchor(s) to load");
        }
        Ok(())
    }
}
