//! # Query Service
//!
//! What worker tasks call. Every method pins the active generation, runs
//! one read-only traversal and hands back owned values; nothing here can
//! fail, block, or reach the authoritative store.
//!
//! Before the first publish, and for maps the cache doesn't know, every
//! query simply comes back empty.

use std::sync::Arc;
use std::time::{Duration, Instant};

use farsight_shared::Position;

use crate::config::CacheConfig;
use crate::generation::{GenerationBuffer, GenerationId};
use crate::grid::{RadiusQuery, ResultLimit};
use crate::snapshot::{EntityId, EntitySnapshot, KindSet, MapId};
use crate::sync::DoubleBufferedSnapshots;

/// Cheap, cloneable read handle onto the cache.
#[derive(Debug, Clone)]
pub struct QueryService {
    buffers: Arc<DoubleBufferedSnapshots>,
    default_radius: f32,
}

impl QueryService {
    /// Creates a query handle over shared buffers.
    #[must_use]
    pub fn new(buffers: Arc<DoubleBufferedSnapshots>, config: &CacheConfig) -> Self {
        Self {
            buffers,
            default_radius: config.default_search_radius,
        }
    }

    /// Radius used by [`find_nearest`](Self::find_nearest).
    #[inline]
    #[must_use]
    pub const fn default_radius(&self) -> f32 {
        self.default_radius
    }

    /// Generation queries currently see.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Option<GenerationId> {
        self.buffers.generation()
    }

    /// Age of the active generation at `now`.
    #[must_use]
    pub fn staleness(&self, now: Instant) -> Option<Duration> {
        self.read(|view| view.built_at().map(|built| now.saturating_duration_since(built)))
            .flatten()
    }

    /// Runs `f` against one pinned generation.
    ///
    /// Every query made through `view` sees the same data. Keep `f` short:
    /// the scheduler can't reuse this buffer until it returns.
    pub fn read<R>(&self, f: impl FnOnce(&GenerationBuffer) -> R) -> Option<R> {
        self.buffers.read_handle().map(|view| f(&view))
    }

    /// Snapshot of one entity.
    #[must_use]
    pub fn find_by_id(&self, map: MapId, id: EntityId) -> Option<EntitySnapshot> {
        self.read(|view| view.query_by_id(map, id).copied()).flatten()
    }

    /// Whether the entity was alive as of the active generation.
    ///
    /// Unknown entities count as not alive.
    #[must_use]
    pub fn is_alive(&self, map: MapId, id: EntityId) -> bool {
        self.find_by_id(map, id).is_some_and(|s| s.alive)
    }

    /// Every snapshot of the given kinds within `radius` of `position`
    /// that passes `predicate`, capped by `limit`.
    pub fn find_nearby<P>(
        &self,
        map: MapId,
        position: Position,
        radius: f32,
        kinds: KindSet,
        predicate: P,
        limit: ResultLimit,
    ) -> Vec<EntitySnapshot>
    where
        P: FnMut(&EntitySnapshot) -> bool,
    {
        let query = RadiusQuery::new(position, radius);
        self.read(|view| view.query_radius(map, &query, kinds, limit, predicate))
            .unwrap_or_default()
    }

    /// Closest match within the configured default search radius.
    pub fn find_nearest<P>(
        &self,
        map: MapId,
        position: Position,
        kinds: KindSet,
        predicate: P,
    ) -> Option<EntitySnapshot>
    where
        P: FnMut(&EntitySnapshot) -> bool,
    {
        self.find_nearest_within(map, position, self.default_radius, kinds, predicate)
    }

    /// Closest match within `radius`. Ties go to the lower id.
    pub fn find_nearest_within<P>(
        &self,
        map: MapId,
        position: Position,
        radius: f32,
        kinds: KindSet,
        predicate: P,
    ) -> Option<EntitySnapshot>
    where
        P: FnMut(&EntitySnapshot) -> bool,
    {
        self.find_nearby(map, position, radius, kinds, predicate, ResultLimit::Nearest(1))
            .into_iter()
            .next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{EntityKind, FactionTag};
    use farsight_shared::DistanceMetric;

    fn service_with(snapshots: &[EntitySnapshot]) -> (Arc<DoubleBufferedSnapshots>, QueryService) {
        let buffers = DoubleBufferedSnapshots::new(64.0, DistanceMetric::Spatial);
        let mut staging = buffers.begin_build().unwrap();
        for s in snapshots {
            staging.insert(*s).unwrap();
        }
        staging.publish(Instant::now());
        let service = QueryService::new(Arc::clone(&buffers), &CacheConfig::default());
        (buffers, service)
    }

    fn actor(id: u64, x: f32, y: f32) -> EntitySnapshot {
        EntitySnapshot::actor(EntityId(id), MapId(1), Position::new(x, y, 0.0))
    }

    #[test]
    fn test_unpublished_is_empty() {
        let buffers = DoubleBufferedSnapshots::new(64.0, DistanceMetric::Spatial);
        let service = QueryService::new(buffers, &CacheConfig::default());

        assert!(service.generation().is_none());
        assert!(service.staleness(Instant::now()).is_none());
        assert!(service.find_by_id(MapId(1), EntityId(1)).is_none());
        assert!(!service.is_alive(MapId(1), EntityId(1)));
        assert!(service
            .find_nearby(MapId(1), Position::ORIGIN, 1000.0, KindSet::ALL, |_| true, ResultLimit::Unlimited)
            .is_empty());
        assert!(service.find_nearest(MapId(1), Position::ORIGIN, KindSet::ALL, |_| true).is_none());
    }

    #[test]
    fn test_find_nearby_example() {
        let (_buffers, service) = service_with(&[actor(1, 0.0, 0.0), actor(2, 10.0, 0.0), actor(3, 100.0, 100.0)]);

        let mut ids: Vec<_> = service
            .find_nearby(MapId(1), Position::ORIGIN, 15.0, KindSet::ALL, |_| true, ResultLimit::Unlimited)
            .into_iter()
            .map(|s| s.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![EntityId(1), EntityId(2)]);

        assert!(service
            .find_nearby(MapId(2), Position::ORIGIN, 15.0, KindSet::ALL, |_| true, ResultLimit::Unlimited)
            .is_empty());
    }

    #[test]
    fn test_find_nearest_respects_predicate_and_radius() {
        let enemy = FactionTag(2);
        let (_buffers, service) = service_with(&[
            actor(1, 5.0, 0.0),
            actor(2, 20.0, 0.0).with_faction(enemy),
            actor(3, 150.0, 0.0).with_faction(enemy),
        ]);

        let hostile = |s: &EntitySnapshot| s.is_hostile_to(FactionTag(1));
        let nearest = service.find_nearest(MapId(1), Position::ORIGIN, KindSet::ALL, hostile).unwrap();
        assert_eq!(nearest.id, EntityId(2));

        // Default radius (100) doesn't reach #3 on its own.
        let far_only = |s: &EntitySnapshot| s.id == EntityId(3);
        assert!(service.find_nearest(MapId(1), Position::ORIGIN, KindSet::ALL, far_only).is_none());
        assert!(service
            .find_nearest_within(MapId(1), Position::ORIGIN, 200.0, KindSet::ALL, far_only)
            .is_some());
    }

    #[test]
    fn test_kind_filter() {
        let (_buffers, service) = service_with(&[
            actor(1, 0.0, 0.0),
            EntitySnapshot::trigger(EntityId(2), MapId(1), Position::ORIGIN, 5.0),
        ]);

        let triggers = service.find_nearby(
            MapId(1),
            Position::ORIGIN,
            1.0,
            KindSet::only(EntityKind::Trigger),
            |_| true,
            ResultLimit::Unlimited,
        );
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].kind(), EntityKind::Trigger);
    }

    #[test]
    fn test_read_pins_one_generation() {
        let (buffers, service) = service_with(&[actor(1, 0.0, 0.0)]);

        let seen = service
            .read(|view| {
                // A build starting now works on the other slot.
                let staging = buffers.begin_build().unwrap();
                staging.publish(Instant::now());
                (view.generation(), view.query_by_id(MapId(1), EntityId(1)).is_some())
            })
            .unwrap();

        assert_eq!(seen, (GenerationId(1), true));
        assert_eq!(service.generation(), Some(GenerationId(2)));
        assert!(service.find_by_id(MapId(1), EntityId(1)).is_none());
    }

    #[test]
    fn test_is_alive() {
        let (_buffers, service) = service_with(&[actor(1, 0.0, 0.0), actor(2, 1.0, 0.0).dead()]);
        assert!(service.is_alive(MapId(1), EntityId(1)));
        assert!(!service.is_alive(MapId(1), EntityId(2)));
    }
}
