use std::{
    collections::{HashMap, VecDeque},
    fmt,
};

use serde::{Deserialize, Serialize};
use tagsight_3d::Pose;
use uuid::Uuid;

/// Identifier of a persistent anchor, stable across sessions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnchorId(pub Uuid);

impl AnchorId {
    /// Create a new unique anchor ID.
    pub fn new() -> Self {
        AnchorId(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AnchorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AnchorId {
    fn from(uuid: Uuid) -> Self {
        AnchorId(uuid)
    }
}

/// Correlates a create request with its completion event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

/// Completion of an asynchronous store operation.
#[derive(Clone, Debug, PartialEq)]
pub enum AnchorEvent {
    /// A create request finished.
    Created {
        /// The request being answered.
        request: RequestId,
        /// The new anchor, or why it could not be created.
        result: Result<AnchorId, String>,
    },
    /// A previously persisted anchor was located again.
    Loaded {
        /// The anchor being answered.
        id: AnchorId,
        /// Its current world pose, or why it could not be loaded.
        result: Result<Pose, String>,
    },
    /// A single anchor was erased.
    Erased {
        /// The erased anchor.
        id: AnchorId,
        /// Whether the store succeeded.
        result: Result<(), String>,
    },
    /// Every anchor was erased.
    ErasedAll {
        /// Whether the store succeeded.
        result: Result<(), String>,
    },
}

/// Host capability owning persistent spatial anchors.
///
/// Operations only enqueue work; results arrive later through [`AnchorStore::poll`].
pub trait AnchorStore {
    /// Request a new anchor at `pose`.
    fn create(&mut self, request: RequestId, pose: Pose);

    /// Request the poses of previously created anchors.
    fn load(&mut self, ids: &[AnchorId]);

    /// Request removal of one anchor.
    fn erase(&mut self, id: AnchorId);

    /// Request removal of every anchor.
    fn erase_all(&mut self);

    /// Drain the events completed since the last poll.
    fn poll(&mut self) -> Vec<AnchorEvent>;
}

/// In-process anchor store that completes operations on the next poll.
///
/// Creation is the slow operation: it only takes effect when polled, while
/// loads and erases apply immediately and report on the next poll. Anchors
/// survive as long as the value, so moving it into a new manager simulates a
/// later session.
#[derive(Debug, Default)]
pub struct SimulatedAnchorStore {
    anchors: HashMap<AnchorId, Pose>,
    creating: VecDeque<(RequestId, Pose)>,
    queue: VecDeque<AnchorEvent>,
    paused: bool,
    fail_creates: usize,
    create_requests: usize,
}

impl SimulatedAnchorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold completed events back until resumed.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Fail the next `count` create requests.
    pub fn fail_next_creates(&mut self, count: usize) {
        self.fail_creates = count;
    }

    /// Number of create requests received so far.
    pub fn create_requests(&self) -> usize {
        self.create_requests
    }

    /// Number of live anchors.
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Whether the store holds no anchors.
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Pose of a live anchor.
    pub fn get(&self, id: &AnchorId) -> Option<&Pose> {
        self.anchors.get(id)
    }
}

impl AnchorStore for SimulatedAnchorStore {
    fn create(&mut self, request: RequestId, pose: Pose) {
        self.create_requests += 1;
        self.creating.push_back((request, pose));
    }

    fn load(&mut self, ids: &[AnchorId]) {
        for id in ids {
            let result = self
                .anchors
                .get(id)
                .copied()
                .ok_or_else(|| format!("anchor {id} not found"));
            self.queue
                .push_back(AnchorEvent::Loaded { id: *id, result });
        }
    }

    fn erase(&mut self, id: AnchorId) {
        let result = match self.anchors.remove(&id) {
            Some(_) => Ok(()),
            None => Err(format!("anchor {id} not found")),
        };
        self.queue.push_back(AnchorEvent::Erased { id, result });
    }

    fn erase_all(&mut self) {
        self.anchors.clear();
        self.queue
            .push_back(AnchorEvent::ErasedAll { result: Ok(()) });
    }

    fn poll(&mut self) -> Vec<AnchorEvent> {
        if self.paused {
            return Vec::new();
        }
        while let Some((request, pose)) = self.creating.pop_front() {
            let result = if self.fail_creates > 0 {
                self.fail_creates -= 1;
                Err("anchor creation rejected".to_string())
            } else {
                let id = AnchorId::new();
                self.anchors.insert(id, pose);
                Ok(id)
            };
            self.queue.push_back(AnchorEvent::Created { request, result });
        }
        self.queue.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_store_roundtrip() {
        let mut store = SimulatedAnchorStore::new();
        store.create(RequestId(1), Pose::IDENTITY);

        store.set_paused(true);
        assert!(store.poll().is_empty());
        store.set_paused(false);

        let events = store.poll();
        let id = match events.as_slice() {
            [AnchorEvent::Created {
                request: RequestId(1),
                result: Ok(id),
            }] => *id,
            other => panic!("unexpected events {other:?}"),
        };
        assert_eq!(store.len(), 1);

        store.load(&[id, AnchorId::new()]);
        let events = store.poll();
        assert!(matches!(events[0], AnchorEvent::Loaded { result: Ok(_), .. }));
        assert!(matches!(events[1], AnchorEvent::Loaded { result: Err(_), .. }));

        store.fail_next_creates(1);
        store.create(RequestId(2), Pose::IDENTITY);
        assert!(matches!(
            store.poll().as_slice(),
            [AnchorEvent::Created { result: Err(_), .. }]
        ));
        assert_eq!(store.create_requests(), 2);

        store.erase_all();
        assert!(store.is_empty());
    }
}
