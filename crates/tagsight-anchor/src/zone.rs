use std::{collections::HashMap, time::Duration};

use glam::Vec3;

/// Exclusion sphere around a placed anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeepOutZone {
    /// Tag the zone belongs to.
    pub tag_id: u32,
    /// Anchor position.
    pub center: Vec3,
    /// Exclusion radius in meters.
    pub radius: f32,
    /// Session time the zone was created or last refreshed.
    pub created_at: Duration,
}

impl KeepOutZone {
    /// Whether `point` lies strictly inside the zone.
    pub fn contains(&self, point: Vec3) -> bool {
        self.center.distance(point) < self.radius
    }

    /// Age of the zone at `now`.
    pub fn age(&self, now: Duration) -> Duration {
        now.saturating_sub(self.created_at)
    }
}

/// One keep-out zone per tag, expiring independently of the anchors.
#[derive(Debug, Clone)]
pub struct KeepOutZones {
    zones: HashMap<u32, KeepOutZone>,
    multiplier: f32,
    min_radius: f32,
    max_radius: f32,
    max_age: Duration,
}

impl KeepOutZones {
    /// Create an empty set with the radius rule `clamp(tag_size * multiplier, min, max)`.
    pub fn new(multiplier: f32, min_radius: f32, max_radius: f32, max_age: Duration) -> Self {
        Self {
            zones: HashMap::new(),
            multiplier,
            min_radius,
            max_radius,
            max_age,
        }
    }

    /// Radius of a zone around a tag of edge `tag_size`.
    pub fn radius_for(&self, tag_size: f32) -> f32 {
        (tag_size * self.multiplier).clamp(self.min_radius, self.max_radius)
    }

    /// Create or refresh the zone of `tag_id`.
    pub fn upsert(&mut self, tag_id: u32, center: Vec3, tag_size: f32, now: Duration) {
        let radius = self.radius_for(tag_size);
        self.zones.insert(
            tag_id,
            KeepOutZone {
                tag_id,
                center,
                radius,
                created_at: now,
            },
        );
    }

    /// The zone of another tag that `point` falls into, if any.
    pub fn blocking(&self, tag_id: u32, point: Vec3, now: Duration) -> Option<&KeepOutZone> {
        self.zones
            .values()
            .filter(|z| z.tag_id != tag_id && z.age(now) <= self.max_age)
            .find(|z| z.contains(point))
    }

    /// Drop zones older than the maximum age. Returns how many were removed.
    pub fn expire(&mut self, now: Duration) -> usize {
        let before = self.zones.len();
        let max_age = self.max_age;
        self.zones.retain(|_, z| z.age(now) <= max_age);
        before - self.zones.len()
    }

    /// Remove the zone of `tag_id`.
    pub fn remove(&mut self, tag_id: u32) -> Option<KeepOutZone> {
        self.zones.remove(&tag_id)
    }

    /// Remove every zone.
    pub fn clear(&mut self) {
        self.zones.clear();
    }

    /// The zone of `tag_id`.
    pub fn get(&self, tag_id: u32) -> Option<&KeepOutZone> {
        self.zones.get(&tag_id)
    }

    /// Number of zones.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether there are no zones.
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones() -> KeepOutZones {
        KeepOutZones::new(3.0, 0.2, 1.0, Duration::from_secs(300))
    }

    #[test]
    fn test_radius_clamped() {
        let zones = zones();
        assert_eq!(zones.radius_for(0.01), 0.2);
        assert!((zones.radius_for(0.1) - 0.3).abs() < 1e-6);
        assert_eq!(zones.radius_for(2.0), 1.0);
    }

    #[test]
    fn test_blocking_other_tags_until_expiry() {
        let mut zones = zones();
        zones.upsert(1, Vec3::ZERO, 0.1, Duration::ZERO);

        let near = Vec3::new(0.1, 0.0, 0.0);
        assert!(zones.blocking(2, near, Duration::from_secs(10)).is_some());
        // a tag never blocks itself
        assert!(zones.blocking(1, near, Duration::from_secs(10)).is_none());
        // outside the radius
        assert!(zones
            .blocking(2, Vec3::new(0.5, 0.0, 0.0), Duration::from_secs(10))
            .is_none());

        assert_eq!(zones.expire(Duration::from_secs(300)), 0);
        assert!(zones.blocking(2, near, Duration::from_secs(301)).is_none());
        assert_eq!(zones.expire(Duration::from_secs(301)), 1);
        assert!(zones.is_empty());
    }
}
