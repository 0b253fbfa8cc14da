//! Decides per tag when to commit a persistent anchor.
//!
//! ```text
//! Unseen -> Tracking -> Placed      (terminal until cleared)
//!              |-> Abandoned        (timeout without placement)
//! ```
//!
//! All time is passed in explicitly as the session clock, so the manager never
//! reads a wall clock itself.

use std::{collections::HashMap, time::Duration};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tagsight_3d::Pose;

use crate::{
    error::AnchorError,
    persistence::{AnchorCollection, AnchorRecord, KeyValueStore, MemoryStore, ANCHORS_KEY},
    store::{AnchorEvent, AnchorId, AnchorStore, RequestId},
    zone::KeepOutZones,
};

/// Anchor placement options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorSettings {
    /// Minimum detection confidence for a frame to count as stable.
    pub confidence_threshold: f32,
    /// Consecutive stable frames required before committing.
    pub required_stable_frames: u32,
    /// Give up on a tag not placed this long after its first detection, seconds.
    pub max_detection_timeout_secs: f32,
    /// Drop unplaced tracking state not refreshed for this long, seconds.
    pub stale_grace_secs: f32,
    /// Edge length of the tags, meters. Taken from the detector configuration.
    #[serde(skip)]
    pub tag_size: f32,
    /// Keep-out radius as a multiple of the tag size.
    pub keep_out_multiplier: f32,
    /// Smallest keep-out radius, meters.
    pub keep_out_min_radius: f32,
    /// Largest keep-out radius, meters.
    pub keep_out_max_radius: f32,
    /// Age after which a keep-out zone expires, seconds.
    pub keep_out_max_age_secs: f32,
    /// Pause after a bulk clear before placements resume, seconds.
    pub clear_cooldown_secs: f32,
    /// Write placed anchors to the key-value store.
    pub persistence_enabled: bool,
}

impl Default for AnchorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            required_stable_frames: 10,
            max_detection_timeout_secs: 10.0,
            stale_grace_secs: 2.0,
            tag_size: 0.1,
            keep_out_multiplier: 3.0,
            keep_out_min_radius: 0.15,
            keep_out_max_radius: 1.0,
            keep_out_max_age_secs: 300.0,
            clear_cooldown_secs: 1.0,
            persistence_enabled: true,
        }
    }
}

fn secs(value: f32) -> Duration {
    Duration::try_from_secs_f32(value.max(0.0)).unwrap_or(Duration::MAX)
}

/// Per-tag tracking record.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingState {
    /// The tag.
    pub tag_id: u32,
    /// Consecutive frames at or above the confidence threshold.
    pub stable_frame_count: u32,
    /// Session time of the first detection in this cycle.
    pub first_detection_time: Duration,
    /// Session time of the latest detection.
    pub last_detection_time: Duration,
    /// Latest world pose.
    pub last_pose: Pose,
    /// Latest confidence.
    pub last_confidence: f32,
    /// An anchor has been committed for the tag.
    pub is_placed: bool,
    /// A create request is in flight.
    pub placement_in_progress: bool,
}

impl TrackingState {
    fn new(tag_id: u32, now: Duration, pose: Pose) -> Self {
        Self {
            tag_id,
            stable_frame_count: 0,
            first_detection_time: now,
            last_detection_time: now,
            last_pose: pose,
            last_confidence: 0.0,
            is_placed: false,
            placement_in_progress: false,
        }
    }
}

/// A committed anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedAnchor {
    /// Tag the anchor belongs to.
    pub tag_id: u32,
    /// Host anchor identifier.
    pub id: AnchorId,
    /// World pose of the anchor.
    pub pose: Pose,
}

/// What an observation did to the tag's placement state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// Accumulating stable frames.
    Tracking,
    /// A create request was issued this frame.
    PlacementRequested,
    /// The tag already has an anchor.
    AlreadyPlaced,
    /// A create request is still in flight.
    PlacementPending,
    /// Ready, but inside another tag's keep-out zone.
    BlockedByKeepOut,
    /// Placements are paused after a bulk clear.
    CoolingDown,
    /// A bulk clear is in progress.
    Clearing,
    /// Not placed within the detection timeout; state dropped.
    Abandoned,
}

/// Notable transitions reported by [`AnchorManager::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorChange {
    /// An anchor was committed.
    Placed(PlacedAnchor),
    /// A create request failed; the tag may retry.
    PlacementFailed {
        /// The tag.
        tag_id: u32,
        /// Reason reported by the store.
        reason: String,
    },
    /// A persisted anchor was located again.
    Restored(PlacedAnchor),
    /// A bulk clear completed; the cooldown has started.
    Cleared,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClearPhase {
    Idle,
    Clearing,
    CoolingDown { until: Duration },
}

#[derive(Debug, Clone, Copy)]
struct PendingCreate {
    tag_id: u32,
    pose: Pose,
    generation: u64,
}

/// Anchor placement state machine over a host [`AnchorStore`].
pub struct AnchorManager<S: AnchorStore> {
    settings: AnchorSettings,
    store: S,
    persistence: Box<dyn KeyValueStore>,
    tracking: HashMap<u32, TrackingState>,
    placed: HashMap<u32, PlacedAnchor>,
    zones: KeepOutZones,
    pending_creates: HashMap<RequestId, PendingCreate>,
    pending_loads: HashMap<AnchorId, AnchorRecord>,
    next_request: u64,
    generation: u64,
    phase: ClearPhase,
}

impl<S: AnchorStore> AnchorManager<S> {
    /// Create a manager persisting into a volatile [`MemoryStore`].
    pub fn new(settings: AnchorSettings, store: S) -> Self {
        Self::with_persistence(settings, store, Box::new(MemoryStore::new()))
    }

    /// Create a manager persisting into `persistence`.
    pub fn with_persistence(
        settings: AnchorSettings,
        store: S,
        persistence: Box<dyn KeyValueStore>,
    ) -> Self {
        let zones = KeepOutZones::new(
            settings.keep_out_multiplier,
            settings.keep_out_min_radius,
            settings.keep_out_max_radius,
            secs(settings.keep_out_max_age_secs),
        );
        Self {
            settings,
            store,
            persistence,
            tracking: HashMap::new(),
            placed: HashMap::new(),
            zones,
            pending_creates: HashMap::new(),
            pending_loads: HashMap::new(),
            next_request: 0,
            generation: 0,
            phase: ClearPhase::Idle,
        }
    }

    /// Active settings.
    pub fn settings(&self) -> &AnchorSettings {
        &self.settings
    }

    /// The host store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the host store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Tracking record of a tag.
    pub fn tracking_state(&self, tag_id: u32) -> Option<&TrackingState> {
        self.tracking.get(&tag_id)
    }

    /// Whether an anchor is committed for the tag.
    pub fn is_placed(&self, tag_id: u32) -> bool {
        self.placed.contains_key(&tag_id)
    }

    /// The committed anchor of a tag.
    pub fn placed_anchor(&self, tag_id: u32) -> Option<&PlacedAnchor> {
        self.placed.get(&tag_id)
    }

    /// Every committed anchor, ordered by tag.
    pub fn placed_anchors(&self) -> Vec<PlacedAnchor> {
        let mut anchors: Vec<_> = self.placed.values().copied().collect();
        anchors.sort_by_key(|a| a.tag_id);
        anchors
    }

    /// The keep-out zones.
    pub fn zones(&self) -> &KeepOutZones {
        &self.zones
    }

    /// Whether a bulk clear has been requested and not yet confirmed.
    pub fn is_clearing(&self) -> bool {
        self.phase == ClearPhase::Clearing
    }

    /// Whether a persisted anchor of the tag is still being located.
    pub fn is_loading(&self, tag_id: u32) -> bool {
        self.pending_loads.values().any(|r| r.tag_id == tag_id)
    }

    /// Feed one detection of `tag_id` at world `pose`.
    pub fn observe(
        &mut self,
        tag_id: u32,
        pose: Pose,
        confidence: f32,
        now: Duration,
    ) -> PlacementOutcome {
        match self.phase {
            ClearPhase::Clearing => return PlacementOutcome::Clearing,
            ClearPhase::CoolingDown { until } if now < until => {
                return PlacementOutcome::CoolingDown
            }
            ClearPhase::CoolingDown { .. } => self.phase = ClearPhase::Idle,
            ClearPhase::Idle => {}
        }

        if self.placed.contains_key(&tag_id) {
            if let Some(state) = self.tracking.get_mut(&tag_id) {
                state.last_detection_time = now;
                state.last_confidence = confidence;
            }
            return PlacementOutcome::AlreadyPlaced;
        }

        if self.is_loading(tag_id) {
            return PlacementOutcome::PlacementPending;
        }

        let threshold = self.settings.confidence_threshold;
        let timeout = secs(self.settings.max_detection_timeout_secs);
        let state = self.tracking.entry(tag_id).or_insert_with(|| {
            debug!("tracking tag {tag_id}");
            TrackingState::new(tag_id, now, pose)
        });

        if state.placement_in_progress {
            state.last_detection_time = now;
            return PlacementOutcome::PlacementPending;
        }

        if now.saturating_sub(state.first_detection_time) > timeout {
            info!("tag {tag_id} not placed within {timeout:?}, abandoning");
            self.tracking.remove(&tag_id);
            return PlacementOutcome::Abandoned;
        }

        state.last_detection_time = now;
        state.last_pose = pose;
        state.last_confidence = confidence;
        if confidence >= threshold {
            state.stable_frame_count += 1;
        } else {
            state.stable_frame_count = 0;
        }

        let ready = state.stable_frame_count >= self.settings.required_stable_frames
            && state.last_confidence >= threshold;
        if !ready {
            return PlacementOutcome::Tracking;
        }

        if let Some(zone) = self.zones.blocking(tag_id, pose.position, now) {
            debug!(
                "tag {tag_id} inside keep-out zone of tag {} (r = {})",
                zone.tag_id, zone.radius
            );
            return PlacementOutcome::BlockedByKeepOut;
        }

        let request = RequestId(self.next_request);
        self.next_request += 1;
        state.placement_in_progress = true;
        self.pending_creates.insert(
            request,
            PendingCreate {
                tag_id,
                pose,
                generation: self.generation,
            },
        );
        info!("requesting anchor for tag {tag_id} at {:?}", pose.position);
        self.store.create(request, pose);

        PlacementOutcome::PlacementRequested
    }

    /// Forget the tracking state of a tag no longer reported by the detector.
    ///
    /// Anchors and zones are unaffected. State with a request in flight is kept.
    pub fn mark_lost(&mut self, tag_id: u32) {
        let in_flight = self
            .tracking
            .get(&tag_id)
            .is_some_and(|s| s.placement_in_progress);
        if !in_flight {
            self.tracking.remove(&tag_id);
        }
    }

    /// Process store events, expire zones and prune stale tracking state.
    pub fn update(&mut self, now: Duration) -> Vec<AnchorChange> {
        let mut changes = Vec::new();

        for event in self.store.poll() {
            if let Some(change) = self.handle_event(event, now) {
                changes.push(change);
            }
        }

        let expired = self.zones.expire(now);
        if expired > 0 {
            debug!("{expired} keep-out zone(s) expired");
        }

        let grace = secs(self.settings.stale_grace_secs);
        self.tracking.retain(|tag_id, state| {
            let keep = state.is_placed
                || state.placement_in_progress
                || now.saturating_sub(state.last_detection_time) <= grace;
            if !keep {
                debug!("dropping stale tracking state of tag {tag_id}");
            }
            keep
        });

        if let ClearPhase::CoolingDown { until } = self.phase {
            if now >= until {
                self.phase = ClearPhase::Idle;
            }
        }

        changes
    }

    fn handle_event(&mut self, event: AnchorEvent, now: Duration) -> Option<AnchorChange> {
        match event {
            AnchorEvent::Created { request, result } => {
                let Some(pending) = self.pending_creates.remove(&request) else {
                    warn!("create result for unknown request {request:?}");
                    return None;
                };

                if pending.generation != self.generation {
                    // resolved after a clear: the anchor must not survive it
                    if let Ok(id) = result {
                        debug!("erasing anchor {id} created during clear");
                        self.store.erase(id);
                    }
                    return None;
                }

                match result {
                    Ok(id) if self.placed.contains_key(&pending.tag_id) => {
                        debug!("tag {} already has an anchor, erasing {id}", pending.tag_id);
                        self.store.erase(id);
                        if let Some(state) = self.tracking.get_mut(&pending.tag_id) {
                            state.is_placed = true;
                            state.placement_in_progress = false;
                        }
                        None
                    }
                    Ok(id) => {
                        let anchor = PlacedAnchor {
                            tag_id: pending.tag_id,
                            id,
                            pose: pending.pose,
                        };
                        self.commit(anchor, now);
                        info!("anchor {id} placed for tag {}", pending.tag_id);
                        Some(AnchorChange::Placed(anchor))
                    }
                    Err(reason) => {
                        warn!("anchor creation for tag {} failed: {reason}", pending.tag_id);
                        if let Some(state) = self.tracking.get_mut(&pending.tag_id) {
                            state.placement_in_progress = false;
                            state.stable_frame_count = 0;
                        }
                        Some(AnchorChange::PlacementFailed {
                            tag_id: pending.tag_id,
                            reason,
                        })
                    }
                }
            }
            AnchorEvent::Loaded { id, result } => {
                let record = self.pending_loads.remove(&id)?;
                match result {
                    Ok(_) if self.placed.contains_key(&record.tag_id) => {
                        debug!("tag {} already has an anchor, erasing {id}", record.tag_id);
                        self.store.erase(id);
                        self.persist_logged();
                        None
                    }
                    Ok(pose) => {
                        let anchor = PlacedAnchor {
                            tag_id: record.tag_id,
                            id,
                            pose,
                        };
                        self.placed.insert(record.tag_id, anchor);
                        self.zones
                            .upsert(record.tag_id, pose.position, self.settings.tag_size, now);
                        info!("restored anchor {id} for tag {}", record.tag_id);
                        Some(AnchorChange::Restored(anchor))
                    }
                    Err(reason) => {
                        warn!("could not load anchor {id} of tag {}: {reason}", record.tag_id);
                        None
                    }
                }
            }
            AnchorEvent::Erased { id, result } => {
                if let Err(reason) = result {
                    warn!("could not erase anchor {id}: {reason}");
                }
                None
            }
            AnchorEvent::ErasedAll { result } => {
                if let Err(reason) = result {
                    warn!("bulk erase failed: {reason}");
                }
                if self.phase != ClearPhase::Clearing {
                    return None;
                }
                let cooldown = secs(self.settings.clear_cooldown_secs);
                self.phase = ClearPhase::CoolingDown {
                    until: now.saturating_add(cooldown),
                };
                info!("all anchors cleared, placements resume in {cooldown:?}");
                Some(AnchorChange::Cleared)
            }
        }
    }

    fn commit(&mut self, anchor: PlacedAnchor, now: Duration) {
        self.placed.insert(anchor.tag_id, anchor);
        self.zones.upsert(
            anchor.tag_id,
            anchor.pose.position,
            self.settings.tag_size,
            now,
        );
        if let Some(state) = self.tracking.get_mut(&anchor.tag_id) {
            state.is_placed = true;
            state.placement_in_progress = false;
        }
        self.persist_logged();
    }

    /// Erase the anchor of one tag along with its zone and tracking state.
    ///
    /// Returns `false` when the tag has no anchor.
    pub fn remove_anchor(&mut self, tag_id: u32) -> bool {
        let Some(anchor) = self.placed.remove(&tag_id) else {
            return false;
        };
        self.store.erase(anchor.id);
        self.zones.remove(tag_id);
        self.tracking.remove(&tag_id);
        self.persist_logged();
        info!("removed anchor {} of tag {tag_id}", anchor.id);
        true
    }

    /// Erase every anchor, zone and tracking state.
    ///
    /// Placements stay blocked until the store confirms and the cooldown
    /// elapses. Returns `false` if a clear is already running.
    pub fn clear_all(&mut self) -> bool {
        if self.phase == ClearPhase::Clearing {
            debug!("clear already in progress");
            return false;
        }

        self.phase = ClearPhase::Clearing;
        self.generation += 1;
        self.tracking.clear();
        self.placed.clear();
        self.zones.clear();
        self.pending_loads.clear();
        self.store.erase_all();
        self.persist_logged();
        info!(
            "clearing all anchors ({} create request(s) in flight)",
            self.pending_creates.len()
        );
        true
    }

    /// Load the persisted anchors and ask the store to locate them.
    ///
    /// Returns the number of anchors requested, zero when persistence is off.
    pub fn restore(&mut self) -> Result<usize, AnchorError> {
        if !self.settings.persistence_enabled {
            return Ok(0);
        }
        let Some(json) = self.persistence.get(ANCHORS_KEY)? else {
            return Ok(0);
        };
        let collection = AnchorCollection::from_json(&json)?;

        let ids: Vec<AnchorId> = collection
            .anchors
            .iter()
            .map(|record| AnchorId(record.uuid))
            .collect();
        for record in collection.anchors {
            self.pending_loads.insert(AnchorId(record.uuid), record);
        }
        if !ids.is_empty() {
            self.store.load(&ids);
        }
        info!("restoring {} persisted anchor(s)", ids.len());
        Ok(ids.len())
    }

    /// Write the placed anchors to the key-value store.
    pub fn persist(&mut self) -> Result<(), AnchorError> {
        if !self.settings.persistence_enabled {
            return Ok(());
        }
        // anchors still being located keep their records
        let mut anchors: Vec<AnchorRecord> = self
            .placed
            .values()
            .map(|a| AnchorRecord::new(a.tag_id, a.id.0, &a.pose))
            .chain(self.pending_loads.values().cloned())
            .collect();
        anchors.sort_by_key(|r| (r.tag_id, r.uuid));
        let collection = AnchorCollection { anchors };
        self.persistence.set(ANCHORS_KEY, &collection.to_json()?)
    }

    fn persist_logged(&mut self) {
        if let Err(err) = self.persist() {
            warn!("could not persist anchors: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SimulatedAnchorStore;
    use glam::Vec3;

    fn settings() -> AnchorSettings {
        AnchorSettings {
            confidence_threshold: 0.3,
            required_stable_frames: 3,
            ..Default::default()
        }
    }

    fn at(x: f32) -> Pose {
        Pose::from_translation(Vec3::new(x, 0.0, 2.0))
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_stable_frames_then_single_request() {
        let mut manager = AnchorManager::new(settings(), SimulatedAnchorStore::new());

        assert_eq!(manager.observe(42, at(0.0), 0.9, ms(0)), PlacementOutcome::Tracking);
        assert_eq!(manager.observe(42, at(0.0), 0.9, ms(33)), PlacementOutcome::Tracking);
        assert_eq!(
            manager.observe(42, at(0.0), 0.9, ms(66)),
            PlacementOutcome::PlacementRequested
        );
        assert_eq!(
            manager.observe(42, at(0.0), 0.9, ms(99)),
            PlacementOutcome::PlacementPending
        );

        let changes = manager.update(ms(100));
        assert!(matches!(changes.as_slice(), [AnchorChange::Placed(a)] if a.tag_id == 42));
        assert!(manager.is_placed(42));

        for i in 0..20 {
            assert_eq!(
                manager.observe(42, at(0.0), 0.9, ms(133 + i * 33)),
                PlacementOutcome::AlreadyPlaced
            );
        }
        assert_eq!(manager.store().create_requests(), 1);
        assert_eq!(manager.zones().len(), 1);
    }

    #[test]
    fn test_low_confidence_resets_counter() {
        let mut manager = AnchorManager::new(settings(), SimulatedAnchorStore::new());
        manager.observe(1, at(0.0), 0.9, ms(0));
        manager.observe(1, at(0.0), 0.9, ms(10));
        manager.observe(1, at(0.0), 0.1, ms(20));
        assert_eq!(manager.tracking_state(1).map(|s| s.stable_frame_count), Some(0));
        manager.observe(1, at(0.0), 0.9, ms(30));
        assert_eq!(manager.tracking_state(1).map(|s| s.stable_frame_count), Some(1));
    }

    #[test]
    fn test_below_threshold_never_places() {
        let mut manager = AnchorManager::new(
            AnchorSettings {
                confidence_threshold: 0.3,
                required_stable_frames: 2,
                ..Default::default()
            },
            SimulatedAnchorStore::new(),
        );
        for i in 0..100 {
            let outcome = manager.observe(7, at(0.0), 0.25, ms(i * 20));
            assert_ne!(outcome, PlacementOutcome::PlacementRequested);
            manager.update(ms(i * 20));
        }
        assert_eq!(manager.store().create_requests(), 0);
    }

    #[test]
    fn test_timeout_abandons_and_restarts() {
        let mut manager = AnchorManager::new(
            AnchorSettings {
                required_stable_frames: 1000,
                ..settings()
            },
            SimulatedAnchorStore::new(),
        );
        manager.observe(3, at(0.0), 0.9, Duration::ZERO);
        assert_eq!(
            manager.observe(3, at(0.0), 0.9, Duration::from_secs(11)),
            PlacementOutcome::Abandoned
        );
        assert!(manager.tracking_state(3).is_none());

        // next sighting starts a fresh cycle
        manager.observe(3, at(0.0), 0.9, Duration::from_secs(12));
        assert_eq!(
            manager.tracking_state(3).map(|s| s.first_detection_time),
            Some(Duration::from_secs(12))
        );
    }

    #[test]
    fn test_keep_out_blocks_until_expiry() {
        let mut manager = AnchorManager::new(settings(), SimulatedAnchorStore::new());
        for i in 0..3 {
            manager.observe(1, at(0.0), 0.9, ms(i * 10));
        }
        manager.update(ms(50));
        assert!(manager.is_placed(1));

        // tag 2 seen right next to tag 1
        let mut t = Duration::from_secs(1);
        for _ in 0..3 {
            t += ms(500);
            let outcome = manager.observe(2, at(0.05), 0.9, t);
            manager.update(t);
            if manager.tracking_state(2).map(|s| s.stable_frame_count) >= Some(3) {
                assert_eq!(outcome, PlacementOutcome::BlockedByKeepOut);
            }
        }
        assert!(!manager.is_placed(2));

        // keep observing over the zone lifetime, refreshing the timeout by losing the tag
        let mut blocked = 0;
        let mut t = Duration::from_secs(5);
        while t < Duration::from_secs(300) {
            manager.mark_lost(2);
            for _ in 0..3 {
                if manager.observe(2, at(0.05), 0.9, t) == PlacementOutcome::BlockedByKeepOut {
                    blocked += 1;
                }
                t += ms(100);
            }
            manager.update(t);
            t += Duration::from_secs(5);
        }
        assert!(blocked > 0);
        assert!(!manager.is_placed(2));
        assert_eq!(manager.store().create_requests(), 1);

        // zone expired: a fresh cycle places
        manager.update(Duration::from_secs(400));
        assert!(manager.zones().get(1).is_none());
        manager.mark_lost(2);
        let mut outcome = PlacementOutcome::Tracking;
        for i in 0..3 {
            outcome = manager.observe(2, at(0.05), 0.9, Duration::from_secs(400) + ms(i * 10));
        }
        assert_eq!(outcome, PlacementOutcome::PlacementRequested);
        // anchor of tag 1 remains
        assert!(manager.is_placed(1));
    }

    #[test]
    fn test_failure_clears_in_progress() {
        let mut store = SimulatedAnchorStore::new();
        store.fail_next_creates(1);
        let mut manager = AnchorManager::new(settings(), store);

        for i in 0..3 {
            manager.observe(5, at(0.0), 0.9, ms(i * 10));
        }
        let changes = manager.update(ms(40));
        assert!(matches!(
            changes.as_slice(),
            [AnchorChange::PlacementFailed { tag_id: 5, .. }]
        ));
        let state = manager.tracking_state(5).cloned();
        assert_eq!(state.as_ref().map(|s| s.placement_in_progress), Some(false));
        assert!(!manager.is_placed(5));

        // retry succeeds
        for i in 0..3 {
            manager.observe(5, at(0.0), 0.9, ms(50 + i * 10));
        }
        manager.update(ms(100));
        assert!(manager.is_placed(5));
        assert_eq!(manager.store().create_requests(), 2);
    }

    #[test]
    fn test_clear_cooldown() {
        let mut manager = AnchorManager::new(settings(), SimulatedAnchorStore::new());
        for i in 0..3 {
            manager.observe(42, at(0.0), 0.9, ms(i * 10));
        }
        manager.update(ms(40));
        assert!(manager.is_placed(42));

        assert!(manager.clear_all());
        assert!(!manager.clear_all());
        assert_eq!(manager.observe(42, at(0.0), 0.9, ms(50)), PlacementOutcome::Clearing);

        let changes = manager.update(ms(60));
        assert_eq!(changes, vec![AnchorChange::Cleared]);
        assert!(manager.placed_anchors().is_empty());
        assert!(manager.zones().is_empty());

        // no create until the cooldown elapses
        for i in 0..10 {
            assert_eq!(
                manager.observe(42, at(0.0), 0.9, ms(100 + i * 50)),
                PlacementOutcome::CoolingDown
            );
        }
        assert_eq!(manager.store().create_requests(), 1);

        // afterwards a fresh cycle places
        let mut outcome = PlacementOutcome::Tracking;
        for i in 0..3 {
            outcome = manager.observe(42, at(0.0), 0.9, ms(1100 + i * 10));
        }
        assert_eq!(outcome, PlacementOutcome::PlacementRequested);
        manager.update(ms(1200));
        assert!(manager.is_placed(42));
    }

    #[test]
    fn test_clear_during_inflight_create() {
        let mut manager = AnchorManager::new(settings(), SimulatedAnchorStore::new());
        manager.store_mut().set_paused(true);
        for i in 0..3 {
            manager.observe(9, at(0.0), 0.9, ms(i * 10));
        }
        assert!(manager.clear_all());
        assert!(manager.store().is_empty());

        // the creation resolves after the bulk erase; its anchor is erased again
        manager.store_mut().set_paused(false);
        let changes = manager.update(ms(100));
        assert_eq!(changes, vec![AnchorChange::Cleared]);
        assert!(!manager.is_placed(9));
        assert!(manager.store().is_empty());
        assert!(manager.update(ms(200)).is_empty());
    }

    #[test]
    fn test_persistence_roundtrip() -> Result<(), AnchorError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("anchors.json");

        let mut first = AnchorManager::with_persistence(
            settings(),
            SimulatedAnchorStore::new(),
            Box::new(crate::persistence::JsonFileStore::new(&path)),
        );
        for i in 0..3 {
            first.observe(42, at(1.0), 0.9, ms(i * 10));
        }
        first.update(ms(40));
        let placed = first.placed_anchor(42).copied();
        assert!(placed.is_some());

        // same host store, new session
        let mut store = SimulatedAnchorStore::new();
        std::mem::swap(&mut store, first.store_mut());
        let mut second = AnchorManager::with_persistence(
            settings(),
            store,
            Box::new(crate::persistence::JsonFileStore::new(&path)),
        );
        assert_eq!(second.restore()?, 1);
        let changes = second.update(Duration::ZERO);
        assert!(matches!(changes.as_slice(), [AnchorChange::Restored(_)]));
        assert_eq!(second.placed_anchor(42).map(|a| a.id), placed.map(|a| a.id));
        assert!(second.zones().get(42).is_some());
        assert_eq!(
            second.observe(42, at(1.0), 0.9, ms(10)),
            PlacementOutcome::AlreadyPlaced
        );
        Ok(())
    }

    #[test]
    fn test_remove_anchor_allows_replacement() {
        let mut manager = AnchorManager::new(settings(), SimulatedAnchorStore::new());
        for i in 0..3 {
            manager.observe(4, at(0.0), 0.9, ms(i * 10));
        }
        manager.update(ms(40));
        assert!(manager.remove_anchor(4));
        assert!(!manager.remove_anchor(4));
        manager.update(ms(50));
        assert!(manager.store().is_empty());

        let mut outcome = PlacementOutcome::Tracking;
        for i in 0..3 {
            outcome = manager.observe(4, at(0.0), 0.9, ms(60 + i * 10));
        }
        assert_eq!(outcome, PlacementOutcome::PlacementRequested);
    }

    #[test]
    fn test_stale_state_pruned() {
        let mut manager = AnchorManager::new(settings(), SimulatedAnchorStore::new());
        manager.observe(8, at(0.0), 0.9, Duration::ZERO);
        manager.update(Duration::from_secs(1));
        assert!(manager.tracking_state(8).is_some());
        manager.update(Duration::from_secs(3));
        assert!(manager.tracking_state(8).is_none());
    }

    /// Places tag 42 with a manager persisting to `path`, returning the host store.
    fn first_session(path: &std::path::Path) -> (SimulatedAnchorStore, AnchorId) {
        let mut first = AnchorManager::with_persistence(
            settings(),
            SimulatedAnchorStore::new(),
            Box::new(crate::persistence::JsonFileStore::new(path)),
        );
        for i in 0..3 {
            first.observe(42, at(1.0), 0.9, ms(i * 10));
        }
        first.update(ms(40));
        let id = first.placed_anchor(42).map(|a| a.id).expect("placed");
        let mut store = SimulatedAnchorStore::new();
        std::mem::swap(&mut store, first.store_mut());
        (store, id)
    }

    fn next_session(
        path: &std::path::Path,
        store: SimulatedAnchorStore,
    ) -> AnchorManager<SimulatedAnchorStore> {
        AnchorManager::with_persistence(
            settings(),
            store,
            Box::new(crate::persistence::JsonFileStore::new(path)),
        )
    }

    #[test]
    fn test_detections_wait_for_loading_anchor() -> Result<(), AnchorError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("anchors.json");
        let (mut store, id) = first_session(&path);
        store.set_paused(true);

        let mut second = next_session(&path, store);
        assert_eq!(second.restore()?, 1);
        assert!(second.is_loading(42));
        for i in 0..5 {
            assert_eq!(
                second.observe(42, at(1.0), 0.9, ms(i * 10)),
                PlacementOutcome::PlacementPending
            );
            assert!(second.update(ms(i * 10)).is_empty());
        }

        second.store_mut().set_paused(false);
        let changes = second.update(ms(100));
        assert!(matches!(changes.as_slice(), [AnchorChange::Restored(a)] if a.id == id));
        assert!(!second.is_loading(42));
        assert_eq!(second.store().create_requests(), 1);
        assert_eq!(second.store().len(), 1);
        assert_eq!(
            second.observe(42, at(1.0), 0.9, ms(110)),
            PlacementOutcome::AlreadyPlaced
        );
        Ok(())
    }

    #[test]
    fn test_create_resolving_after_restore_is_erased() -> Result<(), AnchorError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("anchors.json");
        let (mut store, id) = first_session(&path);
        store.set_paused(true);

        // tag committed before the persisted anchors were requested
        let mut second = next_session(&path, store);
        for i in 0..3 {
            second.observe(42, at(1.0), 0.9, ms(i * 10));
        }
        assert_eq!(second.restore()?, 1);

        second.store_mut().set_paused(false);
        let changes = second.update(ms(100));
        assert!(matches!(changes.as_slice(), [AnchorChange::Restored(a)] if a.id == id));
        assert_eq!(second.placed_anchor(42).map(|a| a.id), Some(id));
        assert_eq!(second.store().create_requests(), 2);
        assert_eq!(second.store().len(), 1);
        assert!(second.store().get(&id).is_some());
        assert_eq!(
            second.observe(42, at(1.0), 0.9, ms(110)),
            PlacementOutcome::AlreadyPlaced
        );
        Ok(())
    }

    #[test]
    fn test_persist_keeps_anchors_still_loading() -> Result<(), AnchorError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("anchors.json");
        let (mut store, id) = first_session(&path);
        store.set_paused(true);

        let mut second = next_session(&path, store);
        assert_eq!(second.restore()?, 1);
        second.persist()?;
        let json = crate::persistence::JsonFileStore::new(&path).get(ANCHORS_KEY)?;
        let records = AnchorCollection::from_json(json.as_deref().unwrap_or_default())?;
        assert_eq!(records.anchors.len(), 1);
        assert_eq!(records.anchors[0].uuid, id.0);

        let mut store = SimulatedAnchorStore::new();
        std::mem::swap(&mut store, second.store_mut());
        store.set_paused(false);
        let mut third = next_session(&path, store);
        assert_eq!(third.restore()?, 1);
        let changes = third.update(ms(0));
        assert!(matches!(changes.as_slice(), [AnchorChange::Restored(a)] if a.id == id));
        Ok(())
    }

    #[test]
    fn test_huge_cooldown_saturates() {
        let mut manager = AnchorManager::new(
            AnchorSettings {
                clear_cooldown_secs: f32::MAX,
                ..settings()
            },
            SimulatedAnchorStore::new(),
        );
        assert!(manager.clear_all());
        assert_eq!(manager.update(Duration::from_secs(5)), vec![AnchorChange::Cleared]);
        assert_eq!(
            manager.observe(1, at(0.0), 0.9, Duration::from_secs(3600)),
            PlacementOutcome::CoolingDown
        );
    }
}
