//! # Authoritative Store Interface
//!
//! The cache never owns the world. Whoever does implements
//! [`AuthoritativeStore`] so the scheduler can enumerate it once per cycle.
//!
//! ```text
//! Store owner implements:          Scheduler calls (and nothing else does):
//! ┌──────────────────────────┐     ┌──────────────────────────────────────┐
//! │ impl AuthoritativeStore  │ ←── │ map_ids / enumerate_entities         │
//! │   for MyWorld            │     │ to_snapshot (pure conversion)        │
//! └──────────────────────────┘     └──────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::snapshot::{EntityId, EntityKind, EntitySnapshot, MapId};

/// Visitor handed to [`AuthoritativeStore::enumerate_entities`].
///
/// Returning `Break` asks the store to stop early (the build already failed).
pub type EntityVisitor<'v, E> = dyn FnMut(&E) -> ControlFlow<()> + 'v;

/// Source of truth the scheduler snapshots from.
///
/// Implementations hold their own native lock for the duration of one
/// `enumerate_entities` call and must not call back into the cache.
pub trait AuthoritativeStore: Send + Sync {
    /// The live entity type the store hands out during enumeration.
    type Entity;

    /// Maps currently loaded.
    fn map_ids(&self) -> Vec<MapId>;

    /// Visits every live entity of `kind` on `map`.
    ///
    /// # Errors
    ///
    /// Any [`StoreError`]; the scheduler then abandons the whole cycle.
    fn enumerate_entities(
        &self,
        map: MapId,
        kind: EntityKind,
        visitor: &mut EntityVisitor<'_, Self::Entity>,
    ) -> Result<(), StoreError>;

    /// Pure, side-effect-free conversion of a live entity into a snapshot.
    ///
    /// `None` skips the entity (e.g. mid-despawn).
    fn to_snapshot(entity: &Self::Entity) -> Option<EntitySnapshot>;
}

/// Store that already holds snapshot values, behind one coarse lock.
///
/// Useful as a stand-in world for tests, benches and tools.
#[derive(Debug, Default)]
pub struct MemoryStore {
    maps: RwLock<BTreeMap<MapId, BTreeMap<EntityId, EntitySnapshot>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entity (keyed by map and id).
    pub fn upsert(&self, snapshot: EntitySnapshot) {
        self.maps.write().entry(snapshot.map).or_default().insert(snapshot.id, snapshot);
    }

    /// Removes an entity. Returns whether it existed.
    pub fn remove(&self, map: MapId, id: EntityId) -> bool {
        self.maps.write().get_mut(&map).is_some_and(|entities| entities.remove(&id).is_some())
    }

    /// Applies `f` to one entity in place. Returns whether it existed.
    pub fn update(&self, map: MapId, id: EntityId, f: impl FnOnce(&mut EntitySnapshot)) -> bool {
        let mut maps = self.maps.write();
        match maps.get_mut(&map).and_then(|entities| entities.get_mut(&id)) {
            Some(entity) => {
                f(entity);
                true
            }
            None => false,
        }
    }

    /// Number of entities across all maps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.read().values().map(BTreeMap::len).sum()
    }

    /// True if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuthoritativeStore for MemoryStore {
    type Entity = EntitySnapshot;

    fn map_ids(&self) -> Vec<MapId> {
        self.maps.read().keys().copied().collect()
    }

    fn enumerate_entities(
        &self,
        map: MapId,
        kind: EntityKind,
        visitor: &mut EntityVisitor<'_, Self::Entity>,
    ) -> Result<(), StoreError> {
        let maps = self.maps.read();
        let entities = maps.get(&map).ok_or(StoreError::MapUnavailable(map))?;
        for entity in entities.values().filter(|e| e.kind() == kind) {
            if visitor(entity).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn to_snapshot(entity: &Self::Entity) -> Option<EntitySnapshot> {
        Some(*entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farsight_shared::Position;

    #[test]
    fn test_memory_store_enumerates_by_kind() {
        let store = MemoryStore::new();
        store.upsert(EntitySnapshot::actor(EntityId(1), MapId(1), Position::ORIGIN));
        store.upsert(EntitySnapshot::trigger(EntityId(2), MapId(1), Position::ORIGIN, 4.0));
        store.upsert(EntitySnapshot::actor(EntityId(3), MapId(2), Position::ORIGIN));

        let mut seen = Vec::new();
        store
            .enumerate_entities(MapId(1), EntityKind::Actor, &mut |e| {
                seen.push(e.id);
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(seen, vec![EntityId(1)]);
        assert_eq!(store.map_ids(), vec![MapId(1), MapId(2)]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_memory_store_unknown_map() {
        let store = MemoryStore::new();
        let result = store.enumerate_entities(MapId(9), EntityKind::Actor, &mut |_| ControlFlow::Continue(()));
        assert_eq!(result, Err(StoreError::MapUnavailable(MapId(9))));
    }

    #[test]
    fn test_memory_store_update_and_remove() {
        let store = MemoryStore::new();
        store.upsert(EntitySnapshot::actor(EntityId(1), MapId(1), Position::ORIGIN));

        assert!(store.update(MapId(1), EntityId(1), |e| e.health = 50));
        assert!(!store.update(MapId(1), EntityId(2), |e| e.health = 50));
        assert!(store.remove(MapId(1), EntityId(1)));
        assert!(!store.remove(MapId(1), EntityId(1)));
        assert!(store.is_empty());
    }
}
