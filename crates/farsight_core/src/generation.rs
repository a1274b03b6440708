//! # Generation Buffers
//!
//! One complete copy of the observed world: a [`SpatialGrid`] per map and
//! per kind, tagged with a monotonic [`GenerationId`].
//!
//! A buffer is either being filled by the scheduler (`Staging`) or frozen
//! and visible to readers (`Published`). Nothing ever edits a published
//! buffer; the next cycle fills the *other* buffer instead.

use std::collections::HashMap;
use std::fmt;
use std::ops::ControlFlow;
use std::time::Instant;

use farsight_shared::DistanceMetric;

use crate::error::{CacheError, CacheResult};
use crate::grid::{RadiusQuery, ResultLimit, SpatialGrid};
use crate::snapshot::{EntityId, EntityKind, EntitySnapshot, KindSet, MapId};

/// Monotonic id of a published generation. The first publish is generation 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenerationId(pub u64);

impl GenerationId {
    /// The id following this one.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Lifecycle state of one buffer instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferState {
    /// Owned by the scheduler, possibly half written.
    Staging,
    /// Complete and frozen.
    Published,
}

/// The grids of one map, indexed by [`EntityKind::index`].
#[derive(Clone, Debug)]
pub struct MapLayer {
    grids: [SpatialGrid; EntityKind::COUNT],
}

impl MapLayer {
    fn new(cell_size: f32) -> Self {
        Self {
            grids: std::array::from_fn(|_| SpatialGrid::new(cell_size)),
        }
    }

    /// Grid for one kind.
    #[inline]
    #[must_use]
    pub fn grid(&self, kind: EntityKind) -> &SpatialGrid {
        &self.grids[kind.index()]
    }

    /// Snapshots on this map, all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grids.iter().map(SpatialGrid::len).sum()
    }

    /// True if the map holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grids.iter().all(SpatialGrid::is_empty)
    }

    fn get(&self, id: EntityId) -> Option<&EntitySnapshot> {
        self.grids.iter().find_map(|grid| grid.get(id))
    }

    fn clear(&mut self) {
        for grid in &mut self.grids {
            grid.clear();
        }
    }
}

/// One generation of the world.
#[derive(Clone, Debug)]
pub struct GenerationBuffer {
    maps: HashMap<MapId, MapLayer>,
    generation: GenerationId,
    built_at: Option<Instant>,
    state: BufferState,
    cell_size: f32,
    metric: DistanceMetric,
    entity_count: usize,
}

impl GenerationBuffer {
    /// Creates an empty staging buffer.
    ///
    /// # Panics
    ///
    /// Panics if `cell_size` is not a positive finite number.
    #[must_use]
    pub fn new(cell_size: f32, metric: DistanceMetric) -> Self {
        assert!(
            cell_size.is_finite() && cell_size > 0.0,
            "Cell size must be positive and finite"
        );
        Self {
            maps: HashMap::new(),
            generation: GenerationId::default(),
            built_at: None,
            state: BufferState::Staging,
            cell_size,
            metric,
            entity_count: 0,
        }
    }

    /// Generation this buffer was published as (0 if never).
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> GenerationId {
        self.generation
    }

    /// Host timestamp handed to the publishing tick.
    #[inline]
    #[must_use]
    pub const fn built_at(&self) -> Option<Instant> {
        self.built_at
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> BufferState {
        self.state
    }

    /// Distance metric used by radius queries.
    #[inline]
    #[must_use]
    pub const fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Total snapshots across all maps.
    #[inline]
    #[must_use]
    pub const fn entity_count(&self) -> usize {
        self.entity_count
    }

    /// Whether the map was populated in this generation.
    #[must_use]
    pub fn contains_map(&self, map: MapId) -> bool {
        self.maps.get(&map).is_some_and(|layer| !layer.is_empty())
    }

    /// Populated maps, sorted.
    #[must_use]
    pub fn map_ids(&self) -> Vec<MapId> {
        let mut ids: Vec<MapId> = self
            .maps
            .iter()
            .filter(|(_, layer)| !layer.is_empty())
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Grids of one map.
    #[must_use]
    pub fn layer(&self, map: MapId) -> Option<&MapLayer> {
        self.maps.get(&map)
    }

    /// Empties the buffer and returns it to `Staging`, keeping allocations.
    ///
    /// Layers of maps that were absent from the previous build are released.
    pub fn reset(&mut self) {
        self.maps.retain(|_, layer| {
            let keep = !layer.is_empty();
            layer.clear();
            keep
        });
        self.entity_count = 0;
        self.state = BufferState::Staging;
    }

    /// Inserts a snapshot into the grid for its map and kind.
    ///
    /// # Errors
    ///
    /// [`CacheError::DuplicateInsert`] if
    /// the id already exists on that map under any kind.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is published.
    pub fn insert(&mut self, snapshot: EntitySnapshot) -> CacheResult<()> {
        assert_eq!(self.state, BufferState::Staging, "Published generations are immutable!");

        let cell_size = self.cell_size;
        let layer = self.maps.entry(snapshot.map).or_insert_with(|| MapLayer::new(cell_size));
        if layer.get(snapshot.id).is_some() {
            return Err(CacheError::DuplicateInsert {
                map: snapshot.map,
                id: snapshot.id,
            });
        }
        layer.grids[snapshot.kind().index()].insert(snapshot)?;
        self.entity_count += 1;
        Ok(())
    }

    /// Freezes the buffer under a generation id.
    pub(crate) fn seal(&mut self, generation: GenerationId, built_at: Instant) {
        self.generation = generation;
        self.built_at = Some(built_at);
        self.state = BufferState::Published;
    }

    /// Identity lookup. Unknown map or id gives `None`.
    #[must_use]
    pub fn query_by_id(&self, map: MapId, id: EntityId) -> Option<&EntitySnapshot> {
        self.maps.get(&map)?.get(id)
    }

    /// Radius query over the selected kinds of one map.
    ///
    /// `filter` runs after the distance test and before the limit, so a
    /// limit counts only entities the caller actually wants.
    #[must_use]
    pub fn query_radius<F>(
        &self,
        map: MapId,
        query: &RadiusQuery,
        kinds: KindSet,
        limit: ResultLimit,
        mut filter: F,
    ) -> Vec<EntitySnapshot>
    where
        F: FnMut(&EntitySnapshot) -> bool,
    {
        let Some(layer) = self.maps.get(&map) else {
            return Vec::new();
        };

        match limit {
            ResultLimit::First(0) | ResultLimit::Nearest(0) => Vec::new(),
            ResultLimit::Unlimited => {
                let mut out = Vec::new();
                for kind in kinds.iter() {
                    let _ = layer.grid(kind).for_each_within(query, self.metric, |s, _| {
                        if filter(s) {
                            out.push(*s);
                        }
                        ControlFlow::Continue(())
                    });
                }
                out
            }
            ResultLimit::First(n) => {
                let mut out = Vec::with_capacity(n.min(64));
                for kind in kinds.iter() {
                    let flow = layer.grid(kind).for_each_within(query, self.metric, |s, _| {
                        if filter(s) {
                            out.push(*s);
                            if out.len() >= n {
                                return ControlFlow::Break(());
                            }
                        }
                        ControlFlow::Continue(())
                    });
                    if flow.is_break() {
                        break;
                    }
                }
                out
            }
            ResultLimit::Nearest(n) => {
                let mut scored: Vec<(f32, EntitySnapshot)> = Vec::new();
                for kind in kinds.iter() {
                    let _ = layer.grid(kind).for_each_within(query, self.metric, |s, dist_sq| {
                        if filter(s) {
                            scored.push((dist_sq, *s));
                        }
                        ControlFlow::Continue(())
                    });
                }
                scored.sort_unstable_by(|(da, a), (db, b)| da.total_cmp(db).then_with(|| a.id.cmp(&b.id)));
                scored.truncate(n);
                scored.into_iter().map(|(_, s)| s).collect()
            }
        }
    }
}
