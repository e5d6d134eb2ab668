//! Registry of replicated entities.
//!
//! Tracks which entities are live in this process together with their
//! per-entity replication stats. Registration is idempotent and removal of
//! an unknown handle is a no-op; neither is an error.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a replicated entity. `0` is the null handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityHandle(pub u64);

impl EntityHandle {
    /// The null handle. Never registered.
    pub const NULL: Self = Self(0);

    /// Whether this handle may be registered.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Per-entity replication stats.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityRecord {
    /// Accepted requests whose source was this entity.
    pub replications: u64,
    /// Dispatcher time of the last accepted request, in seconds.
    pub last_replication_time: Option<f64>,
}

/// Set of live replicated entities.
#[derive(Debug, Default)]
pub struct Registry {
    entries: FxHashMap<EntityHandle, EntityRecord>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handle`. Re-registering is a no-op; the null handle is refused
    /// with a warning. Returns `true` if the handle was newly added.
    pub fn register(&mut self, handle: EntityHandle) -> bool {
        if !handle.is_valid() {
            tracing::warn!("Attempted to register null entity handle");
            return false;
        }
        if self.entries.contains_key(&handle) {
            return false;
        }
        self.entries.insert(handle, EntityRecord::default());
        tracing::info!("Registered replicated entity {handle}");
        true
    }

    /// Removes `handle`. Unknown handles are ignored. Returns `true` if the
    /// handle was present.
    pub fn unregister(&mut self, handle: EntityHandle) -> bool {
        if self.entries.remove(&handle).is_some() {
            tracing::info!("Unregistered replicated entity {handle}");
            true
        } else {
            tracing::debug!("Unregister of unknown entity {handle} ignored");
            false
        }
    }

    /// Number of registered entities.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Whether `handle` is registered.
    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Stats for `handle`, if registered.
    pub fn record(&self, handle: EntityHandle) -> Option<&EntityRecord> {
        self.entries.get(&handle)
    }

    /// Iterates registered entities in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &EntityRecord)> {
        self.entries.iter().map(|(h, r)| (*h, r))
    }

    /// Sum of per-entity replication counts.
    pub fn total_replications(&self) -> u64 {
        self.entries.values().map(|r| r.replications).sum()
    }

    /// Credits an accepted request to `handle` if it is registered.
    pub(crate) fn note_replication(&mut self, handle: EntityHandle, time: f64) {
        if let Some(record) = self.entries.get_mut(&handle) {
            record.replications += 1;
            record.last_replication_time = Some(time);
        }
    }

    /// Zeroes every entity's stats, keeping membership.
    pub fn reset_stats(&mut self) {
        for record in self.entries.values_mut() {
            *record = EntityRecord::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let mut reg = Registry::new();
        let h = EntityHandle(7);
        assert!(reg.register(h));
        let before = reg.count();
        assert!(!reg.register(h));
        assert_eq!(reg.count(), before);
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let mut reg = Registry::new();
        reg.register(EntityHandle(1));
        assert!(!reg.unregister(EntityHandle(99)));
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn test_null_handle_refused() {
        let mut reg = Registry::new();
        assert!(!reg.register(EntityHandle::NULL));
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn test_unregister_removes() {
        let mut reg = Registry::new();
        reg.register(EntityHandle(1));
        reg.register(EntityHandle(2));
        assert!(reg.unregister(EntityHandle(1)));
        assert!(!reg.contains(EntityHandle(1)));
        assert!(reg.contains(EntityHandle(2)));
    }

    #[test]
    fn test_stats_credit_only_registered() {
        let mut reg = Registry::new();
        reg.register(EntityHandle(1));
        reg.note_replication(EntityHandle(1), 2.5);
        reg.note_replication(EntityHandle(1), 3.0);
        reg.note_replication(EntityHandle(2), 3.0);

        let rec = reg.record(EntityHandle(1)).unwrap();
        assert_eq!(rec.replications, 2);
        assert_eq!(rec.last_replication_time, Some(3.0));
        assert_eq!(reg.total_replications(), 2);
    }

    #[test]
    fn test_reset_stats_keeps_membership() {
        let mut reg = Registry::new();
        reg.register(EntityHandle(1));
        reg.note_replication(EntityHandle(1), 1.0);
        reg.reset_stats();
        assert_eq!(reg.count(), 1);
        assert_eq!(reg.record(EntityHandle(1)), Some(&EntityRecord::default()));
    }
}
