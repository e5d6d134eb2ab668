//! Distance relevancy and the interest set.

use rustc_hash::FxHashSet;

use crate::registry::EntityHandle;
use crate::request::Vec3;
use crate::settings::ReplicationSettings;

/// Whether an entity at `entity` is relevant to a viewer at `viewer`.
///
/// With relevancy disabled every entity is relevant. Otherwise the entity
/// must lie within `max_replication_distance` (inclusive). Squared distances
/// are compared to avoid the square root.
pub fn is_relevant(settings: &ReplicationSettings, entity: &Vec3, viewer: &Vec3) -> bool {
    if !settings.enable_relevancy {
        return true;
    }
    let radius = settings.max_replication_distance as f64;
    entity.distance_squared(viewer) <= radius * radius
}

/// Entities the local process has flagged as points of interest.
#[derive(Debug, Default)]
pub struct InterestSet {
    members: FxHashSet<EntityHandle>,
}

impl InterestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handle`. Null and duplicate handles are ignored.
    pub fn add(&mut self, handle: EntityHandle) -> bool {
        if !handle.is_valid() {
            return false;
        }
        let added = self.members.insert(handle);
        if added {
            tracing::info!("Added interest entity {handle}");
        }
        added
    }

    /// Removes `handle` if present.
    pub fn remove(&mut self, handle: EntityHandle) -> bool {
        let removed = self.members.remove(&handle);
        if removed {
            tracing::info!("Removed interest entity {handle}");
        }
        removed
    }

    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.members.contains(&handle)
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_distance_is_relevant() {
        let settings = ReplicationSettings {
            max_replication_distance: 100.0,
            ..Default::default()
        };
        let viewer = Vec3::ZERO;
        assert!(is_relevant(&settings, &Vec3::new(60.0, 80.0, 0.0), &viewer));
        assert!(!is_relevant(&settings, &Vec3::new(60.0, 80.1, 0.0), &viewer));
    }

    #[test]
    fn test_relevancy_disabled_always_relevant() {
        let settings = ReplicationSettings {
            max_replication_distance: 1.0,
            enable_relevancy: false,
            ..Default::default()
        };
        assert!(is_relevant(
            &settings,
            &Vec3::new(1.0e6, 0.0, 0.0),
            &Vec3::ZERO
        ));
    }

    #[test]
    fn test_interest_set_ignores_null_and_duplicates() {
        let mut set = InterestSet::new();
        assert!(!set.add(EntityHandle::NULL));
        assert!(set.add(EntityHandle(3)));
        assert!(!set.add(EntityHandle(3)));
        assert_eq!(set.count(), 1);
        assert!(!set.remove(EntityHandle(9)));
        assert!(set.remove(EntityHandle(3)));
        assert_eq!(set.count(), 0);
    }
}
