use std::collections::BTreeMap;

use log::debug;
use tagsight_3d::Pose;

/// Opaque handle to a tag's visualization entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisualHandle(pub u64);

/// Visualization state of one tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Visual {
    /// Entity handle, stable for the session.
    pub handle: VisualHandle,
    /// Last world transform.
    pub transform: Pose,
    /// Whether the entity is shown.
    pub visible: bool,
}

/// Tag ID to visualization entity map.
///
/// Entities are created on first sight and only hidden while their tag is
/// absent. They are destroyed on explicit teardown alone.
#[derive(Debug, Default)]
pub struct VisualRegistry {
    visuals: BTreeMap<u32, Visual>,
    next_handle: u64,
}

impl VisualRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the entity of `tag_id`, or return the existing one.
    pub fn create(&mut self, tag_id: u32, transform: Pose) -> VisualHandle {
        if let Some(visual) = self.visuals.get(&tag_id) {
            return visual.handle;
        }
        let handle = VisualHandle(self.next_handle);
        self.next_handle += 1;
        debug!("created visual {handle:?} for tag {tag_id}");
        self.visuals.insert(
            tag_id,
            Visual {
                handle,
                transform,
                visible: true,
            },
        );
        handle
    }

    /// Move the entity of `tag_id` to `transform` and show it, creating it if needed.
    ///
    /// Returns true when the entity was hidden or did not exist.
    pub fn show(&mut self, tag_id: u32, transform: Pose) -> bool {
        match self.visuals.get_mut(&tag_id) {
            Some(visual) => {
                let was_hidden = !visual.visible;
                visual.transform = transform;
                visual.visible = true;
                was_hidden
            }
            None => {
                self.create(tag_id, transform);
                true
            }
        }
    }

    /// Hide the entity of `tag_id`. Returns true when it was visible.
    pub fn hide(&mut self, tag_id: u32) -> bool {
        match self.visuals.get_mut(&tag_id) {
            Some(visual) if visual.visible => {
                visual.visible = false;
                true
            }
            _ => false,
        }
    }

    /// Destroy the entity of `tag_id`.
    pub fn destroy(&mut self, tag_id: u32) -> Option<Visual> {
        self.visuals.remove(&tag_id)
    }

    /// Destroy every entity.
    pub fn destroy_all(&mut self) {
        self.visuals.clear();
    }

    /// The entity of `tag_id`.
    pub fn get(&self, tag_id: u32) -> Option<&Visual> {
        self.visuals.get(&tag_id)
    }

    /// IDs of the visible entities, ascending.
    pub fn visible_ids(&self) -> Vec<u32> {
        self.visuals
            .iter()
            .filter(|(_, v)| v.visible)
            .map(|(id, _)| *id)
            .collect()
    }

    /// IDs of every entity, ascending.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.visuals.keys().copied()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    /// Whether no entity exists.
    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_lifecycle() {
        let mut registry = VisualRegistry::new();
        let a = registry.create(3, Pose::IDENTITY);
        assert_eq!(registry.create(3, Pose::IDENTITY), a);

        assert!(registry.hide(3));
        assert!(!registry.hide(3));
        assert!(registry.visible_ids().is_empty());

        let moved = Pose::from_translation(Vec3::X);
        assert!(registry.show(3, moved));
        assert!(!registry.show(3, moved));
        let visual = registry.get(3).copied();
        assert_eq!(visual.map(|v| v.handle), Some(a));
        assert_eq!(visual.map(|v| v.transform), Some(moved));

        assert!(registry.show(5, Pose::IDENTITY));
        assert_ne!(registry.get(5).map(|v| v.handle), Some(a));
        assert_eq!(registry.visible_ids(), vec![3, 5]);

        assert!(registry.destroy(3).is_some());
        registry.destroy_all();
        assert!(registry.is_empty());
    }
}
